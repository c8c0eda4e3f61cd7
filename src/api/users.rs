use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Permission, Role, User};
use crate::db::{
    NewUser, create_user, get_all_users, get_user, get_user_assignments, get_user_endorsements,
    get_user_skills, update_user_admin,
};
use crate::error::AppError;
use crate::models::{Endorsement, ProjectResource, UserSkill};
use crate::validation::ValidatedJson;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: String,
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub job_title: Option<String>,
    pub location: Option<String>,
}

fn default_role() -> Role {
    Role::User
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdminUserUpdate {
    #[validate(email(message = "A valid email address is required"))]
    pub email: Option<String>,
    pub role: Option<Role>,
    pub job_title: Option<String>,
    pub location: Option<String>,
}

#[get("/users")]
pub async fn api_get_users(user: User, db: &State<Pool<Sqlite>>) -> Result<Json<Vec<User>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_all_users(db).await?))
}

#[get("/users/<id>")]
pub async fn api_get_user(id: i64, user: User, db: &State<Pool<Sqlite>>) -> Result<Json<User>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_user(db, id).await?))
}

#[get("/users/<id>/skills")]
pub async fn api_get_user_skills(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserSkill>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    get_user(db, id).await?;
    Ok(Json(get_user_skills(db, id).await?))
}

#[get("/users/<id>/endorsements")]
pub async fn api_get_user_endorsements(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Endorsement>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    get_user(db, id).await?;
    Ok(Json(get_user_endorsements(db, id).await?))
}

#[get("/users/<id>/projects")]
pub async fn api_get_user_projects(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ProjectResource>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    get_user(db, id).await?;
    Ok(Json(get_user_assignments(db, id).await?))
}

/// Admins register plain users; only super admins hand out admin roles.
#[post("/admin/users", data = "<request>")]
pub async fn api_register_user(
    request: Json<RegisterUserRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<User>>, AppError> {
    user.require_permission(Permission::RegisterUsers)?;
    let request = request.validated()?;
    if request.role != Role::User {
        user.require_permission(Permission::EditUserRoles)?;
    }

    let id = create_user(
        db,
        NewUser {
            username: &request.username,
            email: &request.email,
            password: &request.password,
            role: request.role,
            first_name: request.first_name.as_deref(),
            last_name: request.last_name.as_deref(),
            job_title: request.job_title.as_deref(),
            location: request.location.as_deref(),
        },
    )
    .await?;

    Ok(Custom(Status::Created, Json(get_user(db, id).await?)))
}

#[put("/admin/users/<id>", data = "<request>")]
pub async fn api_update_user(
    id: i64,
    request: Json<AdminUserUpdate>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<User>, AppError> {
    user.require_permission(Permission::RegisterUsers)?;
    let request = request.validated()?;
    if request.role.is_some() || request.email.is_some() {
        user.require_all_permissions(&[Permission::EditUserRoles, Permission::EditUserCredentials])?;
    }

    let updated = update_user_admin(
        db,
        id,
        request.email.as_deref(),
        request.role,
        request.job_title.as_deref(),
        request.location.as_deref(),
    )
    .await?;
    Ok(Json(updated))
}
