//! Read-only structural comparison of two databases.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use std::str::FromStr;
use tracing::{info, instrument};

use crate::database::inspect::{ForeignKeyInfo, IndexInfo, SchemaSnapshot, TableInfo};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnChange {
    pub column: String,
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableDiff {
    pub table: String,
    pub columns_only_in_left: Vec<String>,
    pub columns_only_in_right: Vec<String>,
    pub type_changes: Vec<ColumnChange>,
    pub nullability_changes: Vec<ColumnChange>,
    pub primary_key: Option<(Vec<String>, Vec<String>)>,
    pub foreign_keys_only_in_left: Vec<ForeignKeyInfo>,
    pub foreign_keys_only_in_right: Vec<ForeignKeyInfo>,
    pub indexes_only_in_left: Vec<String>,
    pub indexes_only_in_right: Vec<String>,
    pub indexes_changed: Vec<String>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.columns_only_in_left.is_empty()
            && self.columns_only_in_right.is_empty()
            && self.type_changes.is_empty()
            && self.nullability_changes.is_empty()
            && self.primary_key.is_none()
            && self.foreign_keys_only_in_left.is_empty()
            && self.foreign_keys_only_in_right.is_empty()
            && self.indexes_only_in_left.is_empty()
            && self.indexes_only_in_right.is_empty()
            && self.indexes_changed.is_empty()
    }
}

/// Differences going from `left` (e.g. legacy) to `right` (e.g. current).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaDiff {
    pub left_label: String,
    pub right_label: String,
    pub tables_only_in_left: Vec<String>,
    pub tables_only_in_right: Vec<String>,
    pub table_diffs: Vec<TableDiff>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.tables_only_in_left.is_empty()
            && self.tables_only_in_right.is_empty()
            && self.table_diffs.is_empty()
    }

    /// True when moving from left to right loses tables, columns or indexes.
    pub fn is_destructive(&self) -> bool {
        !self.tables_only_in_left.is_empty()
            || self
                .table_diffs
                .iter()
                .any(|t| !t.columns_only_in_left.is_empty() || !t.indexes_only_in_left.is_empty())
    }
}

pub fn compare_snapshots(
    left_label: &str,
    left: &SchemaSnapshot,
    right_label: &str,
    right: &SchemaSnapshot,
) -> SchemaDiff {
    let left_names: BTreeSet<&String> = left.tables.keys().collect();
    let right_names: BTreeSet<&String> = right.tables.keys().collect();

    let table_diffs = left_names
        .intersection(&right_names)
        .map(|name| compare_tables(&left.tables[*name], &right.tables[*name]))
        .filter(|diff| !diff.is_empty())
        .collect();

    SchemaDiff {
        left_label: left_label.to_string(),
        right_label: right_label.to_string(),
        tables_only_in_left: left_names
            .difference(&right_names)
            .map(|s| s.to_string())
            .collect(),
        tables_only_in_right: right_names
            .difference(&left_names)
            .map(|s| s.to_string())
            .collect(),
        table_diffs,
    }
}

fn compare_tables(left: &TableInfo, right: &TableInfo) -> TableDiff {
    let mut diff = TableDiff {
        table: left.name.clone(),
        ..Default::default()
    };

    for column in &left.columns {
        match right.column(&column.name) {
            None => diff.columns_only_in_left.push(column.name.clone()),
            Some(other) => {
                if column.data_type != other.data_type {
                    diff.type_changes.push(ColumnChange {
                        column: column.name.clone(),
                        left: column.data_type.clone(),
                        right: other.data_type.clone(),
                    });
                }
                if column.not_null != other.not_null {
                    diff.nullability_changes.push(ColumnChange {
                        column: column.name.clone(),
                        left: nullability(column.not_null).to_string(),
                        right: nullability(other.not_null).to_string(),
                    });
                }
            }
        }
    }
    diff.columns_only_in_right = right
        .columns
        .iter()
        .filter(|c| left.column(&c.name).is_none())
        .map(|c| c.name.clone())
        .collect();

    let (left_pk, right_pk) = (left.primary_key(), right.primary_key());
    if left_pk != right_pk {
        diff.primary_key = Some((left_pk, right_pk));
    }

    diff.foreign_keys_only_in_left = left
        .foreign_keys
        .iter()
        .filter(|fk| !right.foreign_keys.contains(fk))
        .cloned()
        .collect();
    diff.foreign_keys_only_in_right = right
        .foreign_keys
        .iter()
        .filter(|fk| !left.foreign_keys.contains(fk))
        .cloned()
        .collect();

    // Automatic indexes (UNIQUE / PRIMARY KEY constraints) get generated
    // names, so they are matched by shape instead of by name.
    let (left_named, left_auto): (Vec<&IndexInfo>, Vec<&IndexInfo>) =
        left.indexes.values().partition(|i| i.sql.is_some());
    let (right_named, right_auto): (Vec<&IndexInfo>, Vec<&IndexInfo>) =
        right.indexes.values().partition(|i| i.sql.is_some());

    for index in &left_named {
        match right_named.iter().find(|o| o.name == index.name) {
            None => diff.indexes_only_in_left.push(describe_index(index)),
            Some(other) if !same_shape(index, other) => {
                diff.indexes_changed.push(index.name.clone())
            }
            Some(_) => {}
        }
    }
    for index in &right_named {
        if !left_named.iter().any(|o| o.name == index.name) {
            diff.indexes_only_in_right.push(describe_index(index));
        }
    }
    for index in &left_auto {
        if !right_auto.iter().any(|o| same_shape(o, index)) {
            diff.indexes_only_in_left.push(describe_index(index));
        }
    }
    for index in &right_auto {
        if !left_auto.iter().any(|o| same_shape(o, index)) {
            diff.indexes_only_in_right.push(describe_index(index));
        }
    }

    diff
}

fn same_shape(a: &IndexInfo, b: &IndexInfo) -> bool {
    a.columns == b.columns && a.unique == b.unique
}

fn describe_index(index: &IndexInfo) -> String {
    if index.sql.is_some() {
        index.name.clone()
    } else {
        format!(
            "{}({})",
            if index.unique { "UNIQUE" } else { "INDEX" },
            index.columns.join(", ")
        )
    }
}

fn nullability(not_null: bool) -> &'static str {
    if not_null { "NOT NULL" } else { "NULL" }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Schema comparison: {} -> {}",
            self.left_label, self.right_label
        )?;

        if self.is_empty() {
            return writeln!(f, "  Schemas are identical");
        }

        for table in &self.tables_only_in_left {
            writeln!(f, "  Table only in {}: {}", self.left_label, table)?;
        }
        for table in &self.tables_only_in_right {
            writeln!(f, "  Table only in {}: {}", self.right_label, table)?;
        }

        for diff in &self.table_diffs {
            writeln!(f, "  Table {}:", diff.table)?;
            for column in &diff.columns_only_in_left {
                writeln!(f, "    Column only in {}: {}", self.left_label, column)?;
            }
            for column in &diff.columns_only_in_right {
                writeln!(f, "    Column only in {}: {}", self.right_label, column)?;
            }
            for change in &diff.type_changes {
                writeln!(
                    f,
                    "    Column {} type: {} -> {}",
                    change.column, change.left, change.right
                )?;
            }
            for change in &diff.nullability_changes {
                writeln!(
                    f,
                    "    Column {} nullability: {} -> {}",
                    change.column, change.left, change.right
                )?;
            }
            if let Some((left, right)) = &diff.primary_key {
                writeln!(
                    f,
                    "    Primary key: ({}) -> ({})",
                    left.join(", "),
                    right.join(", ")
                )?;
            }
            for fk in &diff.foreign_keys_only_in_left {
                writeln!(f, "    Foreign key only in {}: {}", self.left_label, describe_fk(fk))?;
            }
            for fk in &diff.foreign_keys_only_in_right {
                writeln!(f, "    Foreign key only in {}: {}", self.right_label, describe_fk(fk))?;
            }
            for index in &diff.indexes_only_in_left {
                writeln!(f, "    Index only in {}: {}", self.left_label, index)?;
            }
            for index in &diff.indexes_only_in_right {
                writeln!(f, "    Index only in {}: {}", self.right_label, index)?;
            }
            for index in &diff.indexes_changed {
                writeln!(f, "    Index changed: {}", index)?;
            }
        }
        Ok(())
    }
}

fn describe_fk(fk: &ForeignKeyInfo) -> String {
    format!(
        "{} -> {}({}) ON DELETE {}",
        fk.column,
        fk.references_table,
        fk.references_column.as_deref().unwrap_or("<pk>"),
        fk.on_delete
    )
}

/// Opens `url` read-only and captures its schema.
#[instrument]
pub async fn snapshot_database(url: &str) -> Result<SchemaSnapshot, AppError> {
    let options = SqliteConnectOptions::from_str(url)?.read_only(true);
    let mut conn = options.connect().await?;
    let snapshot = SchemaSnapshot::capture(&mut conn).await?;
    conn.close().await?;
    info!(tables = snapshot.tables.len(), "Captured schema snapshot");
    Ok(snapshot)
}

/// Materialises `schema_sql` in memory and captures it.
#[instrument(skip(schema_sql))]
pub async fn snapshot_schema_sql(schema_sql: &str) -> Result<SchemaSnapshot, AppError> {
    let mut conn = SqliteConnection::connect("sqlite::memory:").await?;
    sqlx::raw_sql(schema_sql).execute(&mut conn).await?;
    let snapshot = SchemaSnapshot::capture(&mut conn).await?;
    conn.close().await?;
    Ok(snapshot)
}
