use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::auth::{Permission, User};
use crate::db::{
    OrphanReport, ReviewOutcome, TemplateDeletion, TemplateFields, approve_skill_update,
    audit_orphans, create_skill_template, delete_skill_template, delete_unused_skill_template,
    get_pending_update, get_pending_updates, purge_orphans, reject_skill_update,
    update_skill_template,
};
use crate::error::AppError;
use crate::models::{ApprovalStatus, PendingSkillUpdate, SkillTemplate};
use crate::realtime::NotificationHub;
use crate::validation::{ValidatedJson, validate_skill_level};

#[derive(Debug, Deserialize, Validate)]
pub struct TemplateRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "Category is required"))]
    pub category: String,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub description: Option<String>,
    #[serde(default)]
    pub is_recommended: bool,
    #[validate(custom(function = "validate_skill_level"))]
    pub target_level: Option<String>,
}

impl From<TemplateRequest> for TemplateFields {
    fn from(request: TemplateRequest) -> Self {
        Self {
            name: request.name,
            category: request.category,
            category_id: request.category_id,
            subcategory_id: request.subcategory_id,
            description: request.description,
            is_recommended: request.is_recommended,
            target_level: request.target_level,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[post("/admin/skill-templates", data = "<request>")]
pub async fn api_create_skill_template(
    request: Json<TemplateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<SkillTemplate>>, AppError> {
    user.require_permission(Permission::ManageSkillTemplates)?;
    let fields = TemplateFields::from(request.validated()?);
    let template = create_skill_template(db, &fields).await?;
    Ok(Custom(Status::Created, Json(template)))
}

#[put("/admin/skill-templates/<id>", data = "<request>")]
pub async fn api_update_skill_template(
    id: i64,
    request: Json<TemplateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SkillTemplate>, AppError> {
    user.require_permission(Permission::ManageSkillTemplates)?;
    let fields = TemplateFields::from(request.validated()?);
    Ok(Json(update_skill_template(db, id, &fields).await?))
}

/// Refuses while anyone holds or requires the skill.
#[delete("/admin/skill-templates/<id>")]
pub async fn api_delete_skill_template(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<TemplateDeletion>, AppError> {
    user.require_permission(Permission::ManageSkillTemplates)?;
    Ok(Json(delete_unused_skill_template(db, id).await?))
}

/// Removes the template and everything that references it.
#[delete("/super-admin/skill-templates/<id>")]
pub async fn api_purge_skill_template(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<TemplateDeletion>, AppError> {
    user.require_permission(Permission::PurgeSkillTemplates)?;
    let report = delete_skill_template(db, id).await?;
    info!(
        template_id = id,
        removed_by = %user.username,
        user_skills_removed = report.user_skills_removed,
        "Skill template purged"
    );
    Ok(Json(report))
}

#[get("/super-admin/orphans")]
pub async fn api_audit_orphans(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<OrphanReport>, AppError> {
    user.require_permission(Permission::PurgeSkillTemplates)?;
    Ok(Json(audit_orphans(db).await?))
}

#[post("/super-admin/orphans/purge")]
pub async fn api_purge_orphans(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<OrphanReport>, AppError> {
    user.require_permission(Permission::PurgeSkillTemplates)?;
    Ok(Json(purge_orphans(db).await?))
}

#[get("/admin/skill-updates?<status>")]
pub async fn api_get_pending_updates(
    status: Option<&str>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<PendingSkillUpdate>>, AppError> {
    user.require_permission(Permission::ReviewSkillUpdates)?;
    let status = match status {
        None | Some("pending") => Some(ApprovalStatus::Pending),
        Some("approved") => Some(ApprovalStatus::Approved),
        Some("rejected") => Some(ApprovalStatus::Rejected),
        Some("all") => None,
        Some(other) => {
            return Err(AppError::Validation(format!("Unknown status: {}", other)));
        }
    };
    Ok(Json(get_pending_updates(db, status).await?))
}

#[get("/admin/skill-updates/<id>")]
pub async fn api_get_pending_update(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<PendingSkillUpdate>, AppError> {
    user.require_permission(Permission::ReviewSkillUpdates)?;
    Ok(Json(get_pending_update(db, id).await?))
}

#[post("/admin/skill-updates/<id>/approve", data = "<request>")]
pub async fn api_approve_skill_update(
    id: i64,
    request: Option<Json<ReviewRequest>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    hub: &State<NotificationHub>,
) -> Result<Json<ReviewOutcome>, AppError> {
    user.require_permission(Permission::ReviewSkillUpdates)?;
    let notes = match request {
        Some(request) => request.validated()?.notes,
        None => None,
    };

    let outcome = approve_skill_update(db, id, user.id, notes.as_deref()).await?;
    hub.publish(outcome.notification.clone());
    Ok(Json(outcome))
}

#[post("/admin/skill-updates/<id>/reject", data = "<request>")]
pub async fn api_reject_skill_update(
    id: i64,
    request: Option<Json<ReviewRequest>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    hub: &State<NotificationHub>,
) -> Result<Json<ReviewOutcome>, AppError> {
    user.require_permission(Permission::ReviewSkillUpdates)?;
    let notes = match request {
        Some(request) => request.validated()?.notes,
        None => None,
    };

    let outcome = reject_skill_update(db, id, user.id, notes.as_deref()).await?;
    hub.publish(outcome.notification.clone());
    Ok(Json(outcome))
}
