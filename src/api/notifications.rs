use rocket::State;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};

use super::Success;
use crate::auth::User;
use crate::db::{
    get_notifications, mark_all_notifications_read, mark_notification_read,
    unread_notification_count,
};
use crate::error::AppError;
use crate::models::Notification;

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkedRead {
    pub updated: u64,
}

#[get("/notifications?<unread>")]
pub async fn api_get_notifications(
    unread: Option<bool>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(
        get_notifications(db, user.id, unread.unwrap_or(false)).await?,
    ))
}

#[get("/notifications/unread-count")]
pub async fn api_unread_count(user: User, db: &State<Pool<Sqlite>>) -> Result<Json<UnreadCount>, AppError> {
    let count = unread_notification_count(db, user.id).await?;
    Ok(Json(UnreadCount { count }))
}

#[put("/notifications/<id>/read")]
pub async fn api_mark_notification_read(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Success>, AppError> {
    mark_notification_read(db, user.id, id).await?;
    Ok(Json(Success::ok()))
}

#[put("/notifications/read-all")]
pub async fn api_mark_all_read(user: User, db: &State<Pool<Sqlite>>) -> Result<Json<MarkedRead>, AppError> {
    let updated = mark_all_notifications_read(db, user.id).await?;
    Ok(Json(MarkedRead { updated }))
}
