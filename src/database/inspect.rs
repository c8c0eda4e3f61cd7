//! Catalogue introspection over `sqlite_master` and the table-valued pragmas.
//!
//! Everything here takes a generic executor so the same checks run against a
//! pool, a single connection or an open transaction.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::{Row, Sqlite, SqliteConnection};
use tracing::instrument;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// 1-based position within the primary key, 0 when not part of it.
    pub primary_key: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ForeignKeyInfo {
    pub column: String,
    pub references_table: String,
    pub references_column: Option<String>,
    pub on_delete: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
    /// `None` for automatic indexes backing UNIQUE / PRIMARY KEY constraints.
    pub sql: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub sql: String,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub indexes: BTreeMap<String, IndexInfo>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> Vec<String> {
        let mut pk: Vec<&ColumnInfo> = self.columns.iter().filter(|c| c.primary_key > 0).collect();
        pk.sort_by_key(|c| c.primary_key);
        pk.into_iter().map(|c| c.name.clone()).collect()
    }
}

/// Full structural picture of one database.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaSnapshot {
    pub tables: BTreeMap<String, TableInfo>,
    pub user_version: i64,
}

impl SchemaSnapshot {
    #[instrument(skip_all)]
    pub async fn capture(conn: &mut SqliteConnection) -> Result<Self, AppError> {
        let mut tables = BTreeMap::new();
        for (name, sql) in list_tables(&mut *conn).await? {
            let columns = table_columns(&mut *conn, &name).await?;
            let foreign_keys = foreign_keys(&mut *conn, &name).await?;
            let indexes = table_indexes(&mut *conn, &name).await?;
            tables.insert(
                name.clone(),
                TableInfo {
                    name,
                    sql,
                    columns,
                    foreign_keys,
                    indexes,
                },
            );
        }

        let user_version = sqlx::query("PRAGMA user_version")
            .fetch_one(&mut *conn)
            .await?
            .get::<i64, _>(0);

        Ok(Self {
            tables,
            user_version,
        })
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    /// Named (explicitly created) indexes across all tables.
    pub fn named_indexes(&self) -> BTreeMap<String, &IndexInfo> {
        self.tables
            .values()
            .flat_map(|t| t.indexes.values())
            .filter(|i| i.sql.is_some())
            .map(|i| (i.name.clone(), i))
            .collect()
    }
}

pub async fn list_tables<'e, E>(executor: E) -> Result<Vec<(String, String)>, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT name, sql FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>(0), row.get::<String, _>(1)))
        .collect())
}

pub async fn table_columns<'e, E>(executor: E, table: &str) -> Result<Vec<ColumnInfo>, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid",
    )
    .bind(table)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ColumnInfo {
            name: row.get(0),
            data_type: row.get::<String, _>(1).to_uppercase(),
            not_null: row.get::<i64, _>(2) != 0,
            default_value: row.get(3),
            primary_key: row.get(4),
        })
        .collect())
}

pub async fn foreign_keys<'e, E>(executor: E, table: &str) -> Result<Vec<ForeignKeyInfo>, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT \"from\", \"table\", \"to\", on_delete FROM pragma_foreign_key_list(?) ORDER BY id, seq",
    )
    .bind(table)
    .fetch_all(executor)
    .await?;

    let mut keys: Vec<ForeignKeyInfo> = rows
        .into_iter()
        .map(|row| ForeignKeyInfo {
            column: row.get(0),
            references_table: row.get(1),
            references_column: row.get(2),
            on_delete: row.get(3),
        })
        .collect();
    keys.sort();
    Ok(keys)
}

pub async fn table_indexes(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<BTreeMap<String, IndexInfo>, AppError> {
    let rows = sqlx::query(
        "SELECT il.name, il.\"unique\", m.sql
         FROM pragma_index_list(?) il
         LEFT JOIN sqlite_master m ON m.type = 'index' AND m.name = il.name",
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    let mut indexes = BTreeMap::new();
    for row in rows {
        let name: String = row.get(0);
        let columns = sqlx::query("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
            .bind(&name)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .filter_map(|r| r.get::<Option<String>, _>(0))
            .collect();

        indexes.insert(
            name.clone(),
            IndexInfo {
                name,
                unique: row.get::<i64, _>(1) != 0,
                columns,
                sql: row.get(2),
            },
        );
    }
    Ok(indexes)
}

pub async fn has_table<'e, E>(executor: E, table: &str) -> Result<bool, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(executor)
            .await?;
    Ok(count > 0)
}

/// False when either the table or the column is missing.
pub async fn has_column<'e, E>(executor: E, table: &str, column: &str) -> Result<bool, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ? COLLATE NOCASE",
    )
    .bind(table)
    .bind(column)
    .fetch_one(executor)
    .await?;
    Ok(count > 0)
}

/// Identifiers are interpolated into DDL, so only plain names are accepted.
pub fn ensure_identifier(name: &str) -> Result<&str, AppError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(name)
    } else {
        Err(AppError::Validation(format!("Invalid identifier: {}", name)))
    }
}
