use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Notification;

const NOTIFICATION_COLUMNS: &str = "SELECT id, user_id, type, content, is_read,
        related_user_skill_id, related_user_id, created_at
     FROM notifications";

pub const ACHIEVEMENT: &str = "achievement";
pub const ENDORSEMENT: &str = "endorsement";
pub const LEVEL_UP: &str = "level_up";
pub const SKILL_APPROVED: &str = "skill_approved";
pub const SKILL_REJECTED: &str = "skill_rejected";

#[derive(Debug, Clone)]
pub struct NewNotification<'a> {
    pub user_id: i64,
    pub kind: &'a str,
    pub content: &'a str,
    pub related_user_skill_id: Option<i64>,
    pub related_user_id: Option<i64>,
}

/// Inserts on the caller's connection so it can join a wider transaction.
pub async fn insert_notification(
    conn: &mut SqliteConnection,
    new: &NewNotification<'_>,
) -> Result<Notification, AppError> {
    let res = sqlx::query(
        "INSERT INTO notifications (user_id, type, content, related_user_skill_id, related_user_id)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new.user_id)
    .bind(new.kind)
    .bind(new.content)
    .bind(new.related_user_skill_id)
    .bind(new.related_user_id)
    .execute(&mut *conn)
    .await?;

    let notification =
        sqlx::query_as::<_, Notification>(&format!("{} WHERE id = ?", NOTIFICATION_COLUMNS))
            .bind(res.last_insert_rowid())
            .fetch_one(&mut *conn)
            .await?;

    Ok(notification)
}

#[instrument(skip(pool, new), fields(user_id = new.user_id, kind = new.kind))]
pub async fn create_notification(
    pool: &Pool<Sqlite>,
    new: &NewNotification<'_>,
) -> Result<Notification, AppError> {
    info!("Creating notification");
    let mut conn = pool.acquire().await?;
    insert_notification(&mut conn, new).await
}

#[instrument(skip(pool))]
pub async fn get_notifications(
    pool: &Pool<Sqlite>,
    user_id: i64,
    unread_only: bool,
) -> Result<Vec<Notification>, AppError> {
    info!("Listing notifications");
    let rows = sqlx::query_as::<_, Notification>(&format!(
        "{} WHERE user_id = ? AND (? = 0 OR is_read = 0) ORDER BY created_at DESC, id DESC",
        NOTIFICATION_COLUMNS
    ))
    .bind(user_id)
    .bind(unread_only)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn unread_notification_count(pool: &Pool<Sqlite>, user_id: i64) -> Result<i64, AppError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Only the owner can mark a notification; anyone else gets NotFound.
#[instrument(skip(pool))]
pub async fn mark_notification_read(
    pool: &Pool<Sqlite>,
    user_id: i64,
    notification_id: i64,
) -> Result<(), AppError> {
    info!("Marking notification read");
    let res = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Notification with id {} not found",
            notification_id
        )));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn mark_all_notifications_read(pool: &Pool<Sqlite>, user_id: i64) -> Result<u64, AppError> {
    info!("Marking all notifications read");
    let res = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
