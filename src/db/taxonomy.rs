use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{SkillCategory, SkillSubcategory};

#[instrument(skip(pool))]
pub async fn get_all_categories(pool: &Pool<Sqlite>) -> Result<Vec<SkillCategory>, AppError> {
    info!("Getting all skill categories");
    let rows = sqlx::query_as::<_, SkillCategory>(
        "SELECT id, name, description, color FROM skill_categories ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn create_category(
    pool: &Pool<Sqlite>,
    name: &str,
    description: Option<&str>,
    color: Option<&str>,
) -> Result<SkillCategory, AppError> {
    info!("Creating skill category");

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM skill_categories WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Category '{}' already exists",
            name
        )));
    }

    let res = sqlx::query("INSERT INTO skill_categories (name, description, color) VALUES (?, ?, ?)")
        .bind(name)
        .bind(description)
        .bind(color)
        .execute(pool)
        .await?;

    Ok(SkillCategory {
        id: res.last_insert_rowid(),
        name: name.to_string(),
        description: description.map(String::from),
        color: color.map(String::from),
    })
}

#[instrument(skip(pool))]
pub async fn get_category(pool: &Pool<Sqlite>, id: i64) -> Result<SkillCategory, AppError> {
    sqlx::query_as::<_, SkillCategory>(
        "SELECT id, name, description, color FROM skill_categories WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Category with id {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn get_subcategories(
    pool: &Pool<Sqlite>,
    category_id: Option<i64>,
) -> Result<Vec<SkillSubcategory>, AppError> {
    info!("Getting skill subcategories");
    let rows = sqlx::query_as::<_, SkillSubcategory>(
        "SELECT id, category_id, name, description FROM skill_subcategories
         WHERE ? IS NULL OR category_id = ?
         ORDER BY name",
    )
    .bind(category_id)
    .bind(category_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn create_subcategory(
    pool: &Pool<Sqlite>,
    category_id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<SkillSubcategory, AppError> {
    info!("Creating skill subcategory");
    get_category(pool, category_id).await?;

    let res = sqlx::query(
        "INSERT INTO skill_subcategories (category_id, name, description) VALUES (?, ?, ?)",
    )
    .bind(category_id)
    .bind(name)
    .bind(description)
    .execute(pool)
    .await?;

    Ok(SkillSubcategory {
        id: res.last_insert_rowid(),
        category_id,
        name: name.to_string(),
        description: description.map(String::from),
    })
}
