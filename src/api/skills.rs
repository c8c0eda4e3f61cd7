use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use super::Success;
use crate::auth::{Permission, User};
use crate::db::{
    SkillSubmission, create_category, create_subcategory, delete_user_skill, endorse_skill,
    get_all_categories, get_skill_endorsements, get_skill_template, get_skill_templates,
    get_subcategories, get_template_holders, get_user_pending_updates, get_user_skill,
    get_user_skills, submit_skill_update,
};
use crate::error::AppError;
use crate::models::{
    Endorsement, PendingSkillUpdate, SkillCategory, SkillSubcategory, SkillTemplate, UserSkill,
};
use crate::realtime::NotificationHub;
use crate::validation::{ValidatedJson, validate_skill_level};

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(max = 20))]
    pub color: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubcategoryRequest {
    pub category_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SkillUpdateRequest {
    pub skill_template_id: i64,
    #[validate(custom(function = "validate_skill_level"))]
    pub level: String,
    #[validate(length(max = 200))]
    pub certification: Option<String>,
    #[validate(url(message = "Credly link must be a URL"))]
    pub credly_link: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EndorsementRequest {
    #[validate(length(max = 500))]
    pub comment: Option<String>,
}

#[get("/skill-categories")]
pub async fn api_get_categories(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<SkillCategory>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_all_categories(db).await?))
}

#[post("/admin/skill-categories", data = "<request>")]
pub async fn api_create_category(
    request: Json<CategoryRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<SkillCategory>>, AppError> {
    user.require_permission(Permission::ManageCategories)?;
    let request = request.validated()?;
    let category = create_category(
        db,
        &request.name,
        request.description.as_deref(),
        request.color.as_deref(),
    )
    .await?;
    Ok(Custom(Status::Created, Json(category)))
}

#[get("/skill-subcategories?<category_id>")]
pub async fn api_get_subcategories(
    category_id: Option<i64>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<SkillSubcategory>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_subcategories(db, category_id).await?))
}

#[post("/admin/skill-subcategories", data = "<request>")]
pub async fn api_create_subcategory(
    request: Json<SubcategoryRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<SkillSubcategory>>, AppError> {
    user.require_permission(Permission::ManageCategories)?;
    let request = request.validated()?;
    let subcategory = create_subcategory(
        db,
        request.category_id,
        &request.name,
        request.description.as_deref(),
    )
    .await?;
    Ok(Custom(Status::Created, Json(subcategory)))
}

#[get("/skill-templates?<category>")]
pub async fn api_get_skill_templates(
    category: Option<&str>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<SkillTemplate>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_skill_templates(db, category).await?))
}

#[get("/skill-templates/<id>")]
pub async fn api_get_skill_template(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SkillTemplate>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_skill_template(db, id).await?))
}

#[get("/skill-templates/<id>/holders")]
pub async fn api_get_template_holders(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserSkill>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    get_skill_template(db, id).await?;
    Ok(Json(get_template_holders(db, id).await?))
}

#[get("/user-skills")]
pub async fn api_get_my_skills(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserSkill>>, AppError> {
    user.require_permission(Permission::ManageOwnSkills)?;
    Ok(Json(get_user_skills(db, user.id).await?))
}

#[get("/user-skills/<id>")]
pub async fn api_get_user_skill(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserSkill>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_user_skill(db, id).await?))
}

#[delete("/user-skills/<id>")]
pub async fn api_delete_user_skill(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Success>, AppError> {
    user.require_permission(Permission::ManageOwnSkills)?;
    delete_user_skill(db, user.id, id).await?;
    Ok(Json(Success::ok()))
}

/// Skill changes never touch `user_skills` directly; they wait for review.
#[post("/skill-updates", data = "<request>")]
pub async fn api_submit_skill_update(
    request: Json<SkillUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<PendingSkillUpdate>>, AppError> {
    user.require_permission(Permission::ManageOwnSkills)?;
    let request = request.validated()?;

    let pending = submit_skill_update(
        db,
        user.id,
        &SkillSubmission {
            skill_template_id: request.skill_template_id,
            level: request.level,
            certification: request.certification,
            credly_link: request.credly_link,
            notes: request.notes,
        },
    )
    .await?;
    Ok(Custom(Status::Accepted, Json(pending)))
}

#[get("/skill-updates/mine")]
pub async fn api_get_my_skill_updates(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<PendingSkillUpdate>>, AppError> {
    user.require_permission(Permission::ManageOwnSkills)?;
    Ok(Json(get_user_pending_updates(db, user.id).await?))
}

#[get("/user-skills/<id>/endorsements")]
pub async fn api_get_endorsements(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Endorsement>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_skill_endorsements(db, id).await?))
}

#[post("/user-skills/<id>/endorsements", data = "<request>")]
pub async fn api_endorse_skill(
    id: i64,
    request: Json<EndorsementRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
    hub: &State<NotificationHub>,
) -> Result<Custom<Json<Endorsement>>, AppError> {
    user.require_permission(Permission::EndorseSkills)?;
    let request = request.validated()?;

    let (endorsement, notification) =
        endorse_skill(db, user.id, &user.display_name(), id, request.comment.as_deref()).await?;
    hub.publish(notification);

    Ok(Custom(Status::Created, Json(endorsement)))
}
