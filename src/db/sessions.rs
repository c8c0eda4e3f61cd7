use chrono::{NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument};

use crate::auth::{DbUserSession, UserSession};
use crate::error::AppError;

/// Stores a freshly issued token; returns the session row id.
#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    let id = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?
        .last_insert_rowid();

    info!(session_id = id, %expires_at, "Session issued");
    Ok(id)
}

/// Looks a token up regardless of expiry; callers check `is_valid`.
#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at
         FROM user_sessions
         WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?
    .map(UserSession::from)
    .ok_or_else(|| AppError::Authentication("Unknown session token".to_string()))
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    let removed = sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?
        .rows_affected();

    debug!(removed, "Session invalidated");
    Ok(())
}

/// Run hourly from the server's cleanup task.
#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    let purged = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(Utc::now().naive_utc())
        .execute(pool)
        .await?
        .rows_affected();

    if purged > 0 {
        info!(purged, "Expired sessions removed");
    }
    Ok(purged)
}
