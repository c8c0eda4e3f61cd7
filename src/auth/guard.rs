use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::serde::json::Json;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tracing::{info, info_span, warn};

use crate::db::{get_session_by_token, get_user};

use super::User;

pub const SESSION_COOKIE: &str = "session_token";

/// Token from `Authorization: Bearer ...`, falling back to the private
/// session cookie.
pub fn request_token(request: &Request<'_>) -> Option<String> {
    let bearer = request
        .headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    bearer.or_else(|| {
        request
            .cookies()
            .get_private(SESSION_COOKIE)
            .map(|c| c.value().to_string())
    })
}

/// Resolves a session token to its user, or `None` when the token is unknown
/// or expired.
pub async fn user_for_token(pool: &SqlitePool, token: &str) -> Result<Option<User>, Status> {
    let session = match get_session_by_token(pool, token).await {
        Ok(session) => session,
        Err(_) => return Ok(None),
    };

    if !session.is_valid() {
        warn!(user_id = session.user_id, "Session token expired");
        return Ok(None);
    }

    // A live session whose user cannot be read is a server fault, not a 401.
    get_user(pool, session.user_id)
        .await
        .map(Some)
        .map_err(Status::from)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = info_span!("user_auth_guard");
        let _guard = auth_span.enter();

        let Some(token) = request_token(request) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let Some(db) = request.rocket().state::<SqlitePool>() else {
            tracing::error!("Database pool not found in managed state");
            return Outcome::Error((Status::InternalServerError, ()));
        };

        match user_for_token(db, &token).await {
            Ok(Some(user)) => {
                info!(username = %user.username, role = %user.role, "User authenticated");
                Outcome::Success(user)
            }
            Ok(None) => Outcome::Error((Status::Unauthorized, ())),
            Err(status) => Outcome::Error((status, ())),
        }
    }
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> (Status, Json<Value>) {
    warn!("Unauthorized access attempt");
    (
        Status::Unauthorized,
        Json(json!({
            "error": "Unauthorized",
            "message": "Authentication required"
        })),
    )
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> (Status, Json<Value>) {
    (
        Status::Forbidden,
        Json(json!({
            "error": "Forbidden",
            "message": "You don't have permission to perform this action"
        })),
    )
}

#[catch(404)]
pub fn not_found_api(_req: &Request) -> (Status, Json<Value>) {
    (
        Status::NotFound,
        Json(json!({
            "error": "NotFound",
            "message": "Resource not found"
        })),
    )
}

#[catch(422)]
pub fn unprocessable_api(_req: &Request) -> (Status, Json<Value>) {
    (
        Status::UnprocessableEntity,
        Json(json!({
            "error": "UnprocessableEntity",
            "message": "Request body could not be parsed"
        })),
    )
}
