use rocket::State;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, User};
use crate::db::{SearchResults, SkillAnalytics, UserSkillSummary, get_skill_analytics, get_user_skill_summary, search};
use crate::error::AppError;

const DEFAULT_TOP_SKILLS: i64 = 10;

#[get("/analytics/skills?<top>")]
pub async fn api_skill_analytics(
    top: Option<i64>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SkillAnalytics>, AppError> {
    user.require_permission(Permission::ViewAnalytics)?;
    let top = top.unwrap_or(DEFAULT_TOP_SKILLS).clamp(1, 100);
    Ok(Json(get_skill_analytics(db, top).await?))
}

/// Users may always see their own summary; anyone else's needs analytics access.
#[get("/analytics/users/<id>")]
pub async fn api_user_analytics(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserSkillSummary>, AppError> {
    if id != user.id {
        user.require_permission(Permission::ViewAnalytics)?;
    }
    Ok(Json(get_user_skill_summary(db, id).await?))
}

#[get("/search?<q>")]
pub async fn api_search(
    q: Option<&str>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SearchResults>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(search(db, q.unwrap_or_default()).await?))
}
