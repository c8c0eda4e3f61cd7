use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{ProjectResource, ProjectResourceHistory};

const RESOURCE_COLUMNS: &str = "SELECT pr.id, pr.project_id, pr.user_id, u.username, pr.role,
        pr.allocation, pr.start_date, pr.end_date, pr.notes
     FROM project_resources pr
     JOIN users u ON u.id = pr.user_id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceFields {
    pub user_id: i64,
    pub role: String,
    #[serde(default = "full_allocation")]
    pub allocation: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

fn full_allocation() -> i64 {
    100
}

pub fn check_allocation(allocation: i64) -> Result<(), AppError> {
    if (0..=100).contains(&allocation) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "allocation must be between 0 and 100".to_string(),
        ))
    }
}

struct HistoryEntry<'a> {
    project_id: i64,
    user_id: i64,
    action: &'a str,
    previous_role: Option<&'a str>,
    new_role: Option<&'a str>,
    previous_allocation: Option<i64>,
    new_allocation: Option<i64>,
    performed_by: i64,
    note: Option<&'a str>,
}

async fn record_history(conn: &mut SqliteConnection, entry: HistoryEntry<'_>) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO project_resource_histories
            (project_id, user_id, action, previous_role, new_role, previous_allocation,
             new_allocation, performed_by, note)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.project_id)
    .bind(entry.user_id)
    .bind(entry.action)
    .bind(entry.previous_role)
    .bind(entry.new_role)
    .bind(entry.previous_allocation)
    .bind(entry.new_allocation)
    .bind(entry.performed_by)
    .bind(entry.note)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_resource(
    conn: &mut SqliteConnection,
    project_id: i64,
    user_id: i64,
) -> Result<Option<ProjectResource>, AppError> {
    let row = sqlx::query_as::<_, ProjectResource>(&format!(
        "{} WHERE pr.project_id = ? AND pr.user_id = ?",
        RESOURCE_COLUMNS
    ))
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

#[instrument(skip(pool))]
pub async fn get_project_resources(
    pool: &Pool<Sqlite>,
    project_id: i64,
) -> Result<Vec<ProjectResource>, AppError> {
    let rows = sqlx::query_as::<_, ProjectResource>(&format!(
        "{} WHERE pr.project_id = ? ORDER BY u.username",
        RESOURCE_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_user_assignments(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<ProjectResource>, AppError> {
    let rows = sqlx::query_as::<_, ProjectResource>(&format!(
        "{} WHERE pr.user_id = ? ORDER BY pr.start_date",
        RESOURCE_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_resource_history(
    pool: &Pool<Sqlite>,
    project_id: i64,
) -> Result<Vec<ProjectResourceHistory>, AppError> {
    let rows = sqlx::query_as::<_, ProjectResourceHistory>(
        "SELECT id, project_id, user_id, action, previous_role, new_role, previous_allocation,
                new_allocation, performed_by, note, date
         FROM project_resource_histories
         WHERE project_id = ?
         ORDER BY date DESC, id DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip(pool, fields), fields(user_id = fields.user_id))]
pub async fn add_project_resource(
    pool: &Pool<Sqlite>,
    project_id: i64,
    fields: &ResourceFields,
    performed_by: i64,
) -> Result<ProjectResource, AppError> {
    info!("Assigning resource to project");
    check_allocation(fields.allocation)?;
    super::projects::get_project(pool, project_id).await?;
    super::users::get_user(pool, fields.user_id).await?;

    let mut tx = pool.begin().await?;
    if fetch_resource(&mut tx, project_id, fields.user_id).await?.is_some() {
        return Err(AppError::Conflict(
            "User is already assigned to this project".to_string(),
        ));
    }

    sqlx::query(
        "INSERT INTO project_resources (project_id, user_id, role, allocation, start_date, end_date, notes)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id)
    .bind(fields.user_id)
    .bind(&fields.role)
    .bind(fields.allocation)
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(&fields.notes)
    .execute(&mut *tx)
    .await?;

    record_history(
        &mut tx,
        HistoryEntry {
            project_id,
            user_id: fields.user_id,
            action: "added",
            previous_role: None,
            new_role: Some(&fields.role),
            previous_allocation: None,
            new_allocation: Some(fields.allocation),
            performed_by,
            note: fields.notes.as_deref(),
        },
    )
    .await?;

    let resource = fetch_resource(&mut tx, project_id, fields.user_id)
        .await?
        .ok_or_else(|| AppError::Internal("Inserted resource not found".to_string()))?;
    tx.commit().await?;
    Ok(resource)
}

#[instrument(skip(pool, fields), fields(user_id = fields.user_id))]
pub async fn update_project_resource(
    pool: &Pool<Sqlite>,
    project_id: i64,
    fields: &ResourceFields,
    performed_by: i64,
) -> Result<ProjectResource, AppError> {
    info!("Updating project resource");
    check_allocation(fields.allocation)?;

    let mut tx = pool.begin().await?;
    let Some(previous) = fetch_resource(&mut tx, project_id, fields.user_id).await? else {
        return Err(AppError::NotFound(
            "User is not assigned to this project".to_string(),
        ));
    };

    sqlx::query(
        "UPDATE project_resources
         SET role = ?, allocation = ?, start_date = ?, end_date = ?, notes = ?
         WHERE id = ?",
    )
    .bind(&fields.role)
    .bind(fields.allocation)
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(&fields.notes)
    .bind(previous.id)
    .execute(&mut *tx)
    .await?;

    record_history(
        &mut tx,
        HistoryEntry {
            project_id,
            user_id: fields.user_id,
            action: "updated",
            previous_role: Some(&previous.role),
            new_role: Some(&fields.role),
            previous_allocation: Some(previous.allocation),
            new_allocation: Some(fields.allocation),
            performed_by,
            note: fields.notes.as_deref(),
        },
    )
    .await?;

    let resource = fetch_resource(&mut tx, project_id, fields.user_id)
        .await?
        .ok_or_else(|| AppError::Internal("Updated resource not found".to_string()))?;
    tx.commit().await?;
    Ok(resource)
}

#[instrument(skip(pool))]
pub async fn remove_project_resource(
    pool: &Pool<Sqlite>,
    project_id: i64,
    user_id: i64,
    performed_by: i64,
) -> Result<(), AppError> {
    info!("Removing resource from project");
    let mut tx = pool.begin().await?;
    let Some(previous) = fetch_resource(&mut tx, project_id, user_id).await? else {
        return Err(AppError::NotFound(
            "User is not assigned to this project".to_string(),
        ));
    };

    sqlx::query("DELETE FROM project_resources WHERE id = ?")
        .bind(previous.id)
        .execute(&mut *tx)
        .await?;

    record_history(
        &mut tx,
        HistoryEntry {
            project_id,
            user_id,
            action: "removed",
            previous_role: Some(&previous.role),
            new_role: None,
            previous_allocation: Some(previous.allocation),
            new_allocation: None,
            performed_by,
            note: None,
        },
    )
    .await?;

    tx.commit().await?;
    Ok(())
}
