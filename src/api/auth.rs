use chrono::Utc;
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use super::{SessionPolicy, Success};
use crate::auth::{Permission, SESSION_COOKIE, User, UserSession, request_token};
use crate::db::{
    authenticate_user, change_user_password, create_user_session, invalidate_session,
    update_user_profile,
};
use crate::error::AppError;
use crate::validation::ValidatedJson;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[validate(length(max = 100))]
    pub job_title: Option<String>,
    #[validate(length(max = 100))]
    pub location: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    policy: &State<SessionPolicy>,
) -> Result<Json<LoginResponse>, AppError> {
    let login = login.validated()?;

    let Some(user) = authenticate_user(db, &login.username, &login.password).await? else {
        return Err(AppError::Authentication(
            "Invalid username or password".to_string(),
        ));
    };

    let token = UserSession::generate_token();
    let expires_at = Utc::now() + policy.ttl;
    create_user_session(db, user.id, &token, expires_at.naive_utc()).await?;

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .same_site(SameSite::Lax)
        .http_only(true)
        .max_age(rocket::time::Duration::seconds(policy.ttl.num_seconds()));
    cookies.add_private(cookie);

    info!(username = %user.username, "User logged in");
    Ok(Json(LoginResponse {
        success: true,
        token,
        user,
    }))
}

#[post("/logout")]
pub async fn api_logout(
    _user: User,
    request_token: RequestToken,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Success>, AppError> {
    invalidate_session(db, &request_token.0).await?;
    cookies.remove_private(SESSION_COOKIE);
    Ok(Json(Success::ok()))
}

#[get("/me")]
pub async fn api_me(user: User) -> Result<Json<User>, AppError> {
    user.require_permission(Permission::ViewOwnProfile)?;
    Ok(Json(user))
}

#[put("/profile", data = "<profile>")]
pub async fn api_update_profile(
    profile: Json<ProfileUpdate>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<User>, AppError> {
    user.require_permission(Permission::EditOwnProfile)?;
    let profile = profile.validated()?;

    let updated = update_user_profile(
        db,
        user.id,
        profile.first_name.as_deref(),
        profile.last_name.as_deref(),
        profile.job_title.as_deref(),
        profile.location.as_deref(),
    )
    .await?;
    Ok(Json(updated))
}

#[post("/change-password", data = "<request>")]
pub async fn api_change_password(
    request: Json<ChangePasswordRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Success>, AppError> {
    user.require_permission(Permission::EditOwnProfile)?;
    let request = request.validated()?;
    change_user_password(db, user.id, &request.current_password, &request.new_password).await?;
    Ok(Json(Success::ok()))
}

/// The raw session token of the current request.
pub struct RequestToken(pub String);

#[rocket::async_trait]
impl<'r> rocket::request::FromRequest<'r> for RequestToken {
    type Error = ();

    async fn from_request(
        request: &'r rocket::Request<'_>,
    ) -> rocket::request::Outcome<Self, Self::Error> {
        match request_token(request) {
            Some(token) => rocket::request::Outcome::Success(RequestToken(token)),
            None => rocket::request::Outcome::Error((rocket::http::Status::Unauthorized, ())),
        }
    }
}
