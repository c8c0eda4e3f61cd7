use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{PROJECT_STATUSES, Project, ProjectSkill, validate_choice};

const PROJECT_COLUMNS: &str = "SELECT p.id, p.name, p.description, p.client_id,
        c.name AS client_name, p.start_date, p.end_date, p.location, p.confluence_link, p.status
     FROM projects p
     LEFT JOIN clients c ON c.id = p.client_id";

const PROJECT_SKILL_COLUMNS: &str = "SELECT ps.id, ps.project_id, ps.skill_template_id,
        st.name AS skill_name, st.category, ps.required_level, ps.importance
     FROM project_skills ps
     JOIN skill_templates st ON st.id = ps.skill_template_id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFields {
    pub name: String,
    pub description: Option<String>,
    pub client_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub confluence_link: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "planning".to_string()
}

impl ProjectFields {
    fn check(&self) -> Result<(), AppError> {
        validate_choice("status", &self.status, &PROJECT_STATUSES)?;
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(AppError::Validation(
                    "end_date must not be before start_date".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[instrument(skip(pool))]
pub async fn get_projects(
    pool: &Pool<Sqlite>,
    status: Option<&str>,
) -> Result<Vec<Project>, AppError> {
    info!("Listing projects");
    let rows = sqlx::query_as::<_, Project>(&format!(
        "{} WHERE ? IS NULL OR p.status = ? ORDER BY p.name",
        PROJECT_COLUMNS
    ))
    .bind(status)
    .bind(status)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_project(pool: &Pool<Sqlite>, id: i64) -> Result<Project, AppError> {
    sqlx::query_as::<_, Project>(&format!("{} WHERE p.id = ?", PROJECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project with id {} not found", id)))
}

#[instrument(skip(pool, fields), fields(name = %fields.name))]
pub async fn create_project(pool: &Pool<Sqlite>, fields: &ProjectFields) -> Result<Project, AppError> {
    info!("Creating project");
    fields.check()?;
    if let Some(client_id) = fields.client_id {
        super::clients::get_client(pool, client_id).await?;
    }

    let res = sqlx::query(
        "INSERT INTO projects (name, description, client_id, start_date, end_date, location, confluence_link, status)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(fields.client_id)
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(&fields.location)
    .bind(&fields.confluence_link)
    .bind(&fields.status)
    .execute(pool)
    .await?;

    get_project(pool, res.last_insert_rowid()).await
}

#[instrument(skip(pool, fields), fields(name = %fields.name))]
pub async fn update_project(
    pool: &Pool<Sqlite>,
    id: i64,
    fields: &ProjectFields,
) -> Result<Project, AppError> {
    info!("Updating project");
    fields.check()?;
    get_project(pool, id).await?;
    if let Some(client_id) = fields.client_id {
        super::clients::get_client(pool, client_id).await?;
    }

    sqlx::query(
        "UPDATE projects
         SET name = ?, description = ?, client_id = ?, start_date = ?, end_date = ?,
             location = ?, confluence_link = ?, status = ?
         WHERE id = ?",
    )
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(fields.client_id)
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(&fields.location)
    .bind(&fields.confluence_link)
    .bind(&fields.status)
    .bind(id)
    .execute(pool)
    .await?;

    get_project(pool, id).await
}

/// Skills, resources and history go with the project (ON DELETE CASCADE).
#[instrument(skip(pool))]
pub async fn delete_project(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting project");
    let res = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Project with id {} not found", id)));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_project_skills(
    pool: &Pool<Sqlite>,
    project_id: i64,
) -> Result<Vec<ProjectSkill>, AppError> {
    let rows = sqlx::query_as::<_, ProjectSkill>(&format!(
        "{} WHERE ps.project_id = ? ORDER BY st.name",
        PROJECT_SKILL_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn add_project_skill(
    pool: &Pool<Sqlite>,
    project_id: i64,
    skill_template_id: i64,
    required_level: &str,
    importance: &str,
) -> Result<ProjectSkill, AppError> {
    info!("Adding skill requirement to project");
    get_project(pool, project_id).await?;
    super::skill_templates::get_skill_template(pool, skill_template_id).await?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO project_skills (project_id, skill_template_id, required_level, importance)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (project_id, skill_template_id) DO UPDATE SET
            required_level = excluded.required_level,
            importance = excluded.importance
         RETURNING id",
    )
    .bind(project_id)
    .bind(skill_template_id)
    .bind(required_level)
    .bind(importance)
    .fetch_one(pool)
    .await?;

    let skill = sqlx::query_as::<_, ProjectSkill>(&format!("{} WHERE ps.id = ?", PROJECT_SKILL_COLUMNS))
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(skill)
}

#[instrument(skip(pool))]
pub async fn remove_project_skill(
    pool: &Pool<Sqlite>,
    project_id: i64,
    project_skill_id: i64,
) -> Result<(), AppError> {
    info!("Removing skill requirement from project");
    let res = sqlx::query("DELETE FROM project_skills WHERE id = ? AND project_id = ?")
        .bind(project_skill_id)
        .bind(project_id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Project skill with id {} not found",
            project_skill_id
        )));
    }
    Ok(())
}
