use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Client;

const CLIENT_COLUMNS: &str =
    "SELECT id, name, industry, contact_name, contact_email, website, notes FROM clients";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientFields {
    pub name: String,
    pub industry: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub website: Option<String>,
    pub notes: Option<String>,
}

#[instrument(skip(pool))]
pub async fn get_clients(pool: &Pool<Sqlite>) -> Result<Vec<Client>, AppError> {
    info!("Listing clients");
    let rows = sqlx::query_as::<_, Client>(&format!("{} ORDER BY name", CLIENT_COLUMNS))
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_client(pool: &Pool<Sqlite>, id: i64) -> Result<Client, AppError> {
    sqlx::query_as::<_, Client>(&format!("{} WHERE id = ?", CLIENT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Client with id {} not found", id)))
}

async fn ensure_unique_client(
    pool: &Pool<Sqlite>,
    name: &str,
    except_id: Option<i64>,
) -> Result<(), AppError> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM clients WHERE name = ? AND id IS NOT ?")
        .bind(name)
        .bind(except_id)
        .fetch_optional(pool)
        .await?;
    match existing {
        Some(_) => Err(AppError::Conflict(format!("Client '{}' already exists", name))),
        None => Ok(()),
    }
}

#[instrument(skip(pool, fields), fields(name = %fields.name))]
pub async fn create_client(pool: &Pool<Sqlite>, fields: &ClientFields) -> Result<Client, AppError> {
    info!("Creating client");
    ensure_unique_client(pool, &fields.name, None).await?;

    let res = sqlx::query(
        "INSERT INTO clients (name, industry, contact_name, contact_email, website, notes)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&fields.name)
    .bind(&fields.industry)
    .bind(&fields.contact_name)
    .bind(&fields.contact_email)
    .bind(&fields.website)
    .bind(&fields.notes)
    .execute(pool)
    .await?;

    get_client(pool, res.last_insert_rowid()).await
}

#[instrument(skip(pool, fields), fields(name = %fields.name))]
pub async fn update_client(
    pool: &Pool<Sqlite>,
    id: i64,
    fields: &ClientFields,
) -> Result<Client, AppError> {
    info!("Updating client");
    get_client(pool, id).await?;
    ensure_unique_client(pool, &fields.name, Some(id)).await?;

    sqlx::query(
        "UPDATE clients
         SET name = ?, industry = ?, contact_name = ?, contact_email = ?, website = ?, notes = ?
         WHERE id = ?",
    )
    .bind(&fields.name)
    .bind(&fields.industry)
    .bind(&fields.contact_name)
    .bind(&fields.contact_email)
    .bind(&fields.website)
    .bind(&fields.notes)
    .bind(id)
    .execute(pool)
    .await?;

    get_client(pool, id).await
}

/// Projects of a deleted client are kept and detached.
#[instrument(skip(pool))]
pub async fn delete_client(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting client");
    let res = sqlx::query("DELETE FROM clients WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Client with id {} not found", id)));
    }
    Ok(())
}
