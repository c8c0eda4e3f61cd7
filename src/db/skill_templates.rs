use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::SkillTemplate;

const TEMPLATE_COLUMNS: &str = "SELECT id, name, category, category_id, subcategory_id, description,
        is_recommended, target_level, created_at, updated_at
     FROM skill_templates";

/// Writable fields of a skill template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateFields {
    pub name: String,
    pub category: String,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub description: Option<String>,
    #[serde(default)]
    pub is_recommended: bool,
    pub target_level: Option<String>,
}

/// How many rows currently reference a template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateUsage {
    pub user_skills: i64,
    pub project_skills: i64,
    pub pending_updates: i64,
}

impl TemplateUsage {
    pub fn in_use(&self) -> bool {
        self.user_skills > 0 || self.project_skills > 0
    }
}

#[instrument(skip(pool))]
pub async fn get_skill_templates(
    pool: &Pool<Sqlite>,
    category: Option<&str>,
) -> Result<Vec<SkillTemplate>, AppError> {
    info!("Listing skill templates");
    let rows = sqlx::query_as::<_, SkillTemplate>(&format!(
        "{} WHERE ? IS NULL OR category = ? ORDER BY category, name",
        TEMPLATE_COLUMNS
    ))
    .bind(category)
    .bind(category)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_skill_template(pool: &Pool<Sqlite>, id: i64) -> Result<SkillTemplate, AppError> {
    info!("Getting skill template");
    sqlx::query_as::<_, SkillTemplate>(&format!("{} WHERE id = ?", TEMPLATE_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Skill template with id {} not found", id)))
}

async fn ensure_unique_name(
    pool: &Pool<Sqlite>,
    name: &str,
    except_id: Option<i64>,
) -> Result<(), AppError> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM skill_templates WHERE name = ? AND id IS NOT ?")
            .bind(name)
            .bind(except_id)
            .fetch_optional(pool)
            .await?;

    match existing {
        Some(_) => Err(AppError::Conflict(format!(
            "Skill template '{}' already exists",
            name
        ))),
        None => Ok(()),
    }
}

#[instrument(skip(pool, fields), fields(name = %fields.name))]
pub async fn create_skill_template(
    pool: &Pool<Sqlite>,
    fields: &TemplateFields,
) -> Result<SkillTemplate, AppError> {
    info!("Creating skill template");
    ensure_unique_name(pool, &fields.name, None).await?;

    let res = sqlx::query(
        "INSERT INTO skill_templates
            (name, category, category_id, subcategory_id, description, is_recommended, target_level)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&fields.name)
    .bind(&fields.category)
    .bind(fields.category_id)
    .bind(fields.subcategory_id)
    .bind(&fields.description)
    .bind(fields.is_recommended)
    .bind(&fields.target_level)
    .execute(pool)
    .await?;

    get_skill_template(pool, res.last_insert_rowid()).await
}

#[instrument(skip(pool, fields), fields(name = %fields.name))]
pub async fn update_skill_template(
    pool: &Pool<Sqlite>,
    id: i64,
    fields: &TemplateFields,
) -> Result<SkillTemplate, AppError> {
    info!("Updating skill template");
    get_skill_template(pool, id).await?;
    ensure_unique_name(pool, &fields.name, Some(id)).await?;

    sqlx::query(
        "UPDATE skill_templates
         SET name = ?, category = ?, category_id = ?, subcategory_id = ?, description = ?,
             is_recommended = ?, target_level = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(&fields.name)
    .bind(&fields.category)
    .bind(fields.category_id)
    .bind(fields.subcategory_id)
    .bind(&fields.description)
    .bind(fields.is_recommended)
    .bind(&fields.target_level)
    .bind(id)
    .execute(pool)
    .await?;

    get_skill_template(pool, id).await
}

#[instrument(skip(executor))]
pub async fn get_template_usage<'e, E>(executor: E, id: i64) -> Result<TemplateUsage, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (user_skills, project_skills, pending_updates): (i64, i64, i64) = sqlx::query_as(
        "SELECT
            (SELECT COUNT(*) FROM user_skills WHERE skill_template_id = ?1),
            (SELECT COUNT(*) FROM project_skills WHERE skill_template_id = ?1),
            (SELECT COUNT(*) FROM pending_skill_updates WHERE skill_template_id = ?1 AND status = 'pending')",
    )
    .bind(id)
    .fetch_one(executor)
    .await?;

    Ok(TemplateUsage {
        user_skills,
        project_skills,
        pending_updates,
    })
}
