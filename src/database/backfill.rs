//! Idempotent "add column, then fill it" upgrades for databases created before
//! the v2 skill schema.

use serde::Serialize;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use crate::database::inspect::{ensure_identifier, has_column, has_table};
use crate::error::AppError;

/// Where a newly added column gets its initial values from.
#[derive(Debug, Clone)]
pub enum BackfillSource {
    /// Copy from another column of the same table.
    Column(&'static str),
    /// Arbitrary statement. It must only touch rows where the target column
    /// is still NULL so that repeated runs are no-ops.
    Statement(&'static str),
}

#[derive(Debug, Clone)]
pub struct ColumnBackfill {
    pub table: &'static str,
    pub column: &'static str,
    /// Column definition as it appears after `ADD COLUMN <name>`.
    pub definition: &'static str,
    pub source: Option<BackfillSource>,
    /// Table and column the source statement reads; the fill is skipped
    /// when they are absent.
    pub requires: Option<(&'static str, &'static str)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillOutcome {
    pub table: String,
    pub column: String,
    pub added: bool,
    pub rows_backfilled: u64,
    pub skipped: Option<String>,
}

impl ColumnBackfill {
    pub const fn new(table: &'static str, column: &'static str, definition: &'static str) -> Self {
        Self {
            table,
            column,
            definition,
            source: None,
            requires: None,
        }
    }

    pub fn from_column(mut self, legacy: &'static str) -> Self {
        self.source = Some(BackfillSource::Column(legacy));
        self
    }

    pub fn from_statement(mut self, sql: &'static str) -> Self {
        self.source = Some(BackfillSource::Statement(sql));
        self
    }

    pub fn requires(mut self, table: &'static str, column: &'static str) -> Self {
        self.requires = Some((table, column));
        self
    }

    fn outcome(&self) -> BackfillOutcome {
        BackfillOutcome {
            table: self.table.to_string(),
            column: self.column.to_string(),
            added: false,
            rows_backfilled: 0,
            skipped: None,
        }
    }

    /// Runs the backfill in its own transaction.
    #[instrument(skip(pool), fields(table = self.table, column = self.column))]
    pub async fn apply(&self, pool: &Pool<Sqlite>) -> Result<BackfillOutcome, AppError> {
        let mut tx = pool.begin().await?;
        match self.apply_in(&mut tx).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, "Backfill failed, rolling back");
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    pub async fn apply_in(&self, tx: &mut SqliteConnection) -> Result<BackfillOutcome, AppError> {
        let table = ensure_identifier(self.table)?;
        let column = ensure_identifier(self.column)?;
        let mut outcome = self.outcome();

        if !has_table(&mut *tx, table).await? {
            info!("Table {} does not exist, skipping", table);
            outcome.skipped = Some(format!("table {} does not exist", table));
            return Ok(outcome);
        }

        if !has_column(&mut *tx, table, column).await? {
            let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, self.definition);
            info!("Adding column with SQL: {}", sql);
            sqlx::query(&sql).execute(&mut *tx).await?;
            outcome.added = true;
        }

        if let Some((req_table, req_column)) = self.requires {
            if !has_column(&mut *tx, req_table, req_column).await? {
                outcome.skipped = Some(format!("{}.{} does not exist", req_table, req_column));
                return Ok(outcome);
            }
        }

        match &self.source {
            None => {}
            Some(BackfillSource::Column(legacy)) => {
                let legacy = ensure_identifier(legacy)?;
                if has_column(&mut *tx, table, legacy).await? {
                    let sql = format!(
                        "UPDATE {table} SET {column} = {legacy} WHERE {column} IS NULL AND {legacy} IS NOT NULL"
                    );
                    outcome.rows_backfilled = sqlx::query(&sql).execute(&mut *tx).await?.rows_affected();
                } else {
                    outcome.skipped = Some(format!("source column {} does not exist", legacy));
                }
            }
            Some(BackfillSource::Statement(sql)) => {
                outcome.rows_backfilled = sqlx::query(sql).execute(&mut *tx).await?.rows_affected();
            }
        }

        info!(
            added = outcome.added,
            rows = outcome.rows_backfilled,
            "Backfill finished"
        );
        Ok(outcome)
    }
}

/// Upgrades that fold legacy columns into the v2 skill schema.
pub fn legacy_backfills() -> Vec<ColumnBackfill> {
    vec![
        ColumnBackfill::new("skill_templates", "category_id", "INTEGER").from_statement(
            "UPDATE skill_templates SET category_id = (
                 SELECT c.id FROM skill_categories c WHERE c.name = skill_templates.category
             )
             WHERE category_id IS NULL
               AND category IN (SELECT name FROM skill_categories)",
        )
        .requires("skill_categories", "name"),
        ColumnBackfill::new("skill_templates", "subcategory_id", "INTEGER"),
        ColumnBackfill::new(
            "skill_templates",
            "is_recommended",
            "BOOLEAN NOT NULL DEFAULT FALSE",
        ),
        ColumnBackfill::new("skill_templates", "target_level", "TEXT"),
        ColumnBackfill::new("user_skills", "description", "TEXT").from_column("notes"),
        ColumnBackfill::new("pending_skill_updates", "skill_template_id", "INTEGER")
            .from_column("skill_id"),
        ColumnBackfill::new("pending_skill_updates", "user_skill_id", "INTEGER").from_statement(
            "UPDATE pending_skill_updates SET user_skill_id = (
                 SELECT us.id FROM user_skills us
                 WHERE us.user_id = pending_skill_updates.user_id
                   AND us.skill_template_id = pending_skill_updates.skill_template_id
             )
             WHERE user_skill_id IS NULL
               AND EXISTS (
                 SELECT 1 FROM user_skills us
                 WHERE us.user_id = pending_skill_updates.user_id
                   AND us.skill_template_id = pending_skill_updates.skill_template_id
               )",
        )
        .requires("user_skills", "skill_template_id"),
        ColumnBackfill::new("endorsements", "user_skill_id", "INTEGER"),
        ColumnBackfill::new("notifications", "related_user_skill_id", "INTEGER"),
        ColumnBackfill::new("project_skills", "skill_template_id", "INTEGER")
            .from_column("skill_id"),
        ColumnBackfill::new("report_settings", "recipients", "TEXT")
            .from_column("recipient_email"),
        ColumnBackfill::new("report_settings", "is_active", "BOOLEAN").from_column("active"),
    ]
}

/// Applies each backfill in order, one transaction per backfill.
#[instrument(skip_all)]
pub async fn run_backfills(
    pool: &Pool<Sqlite>,
    backfills: &[ColumnBackfill],
) -> Result<Vec<BackfillOutcome>, AppError> {
    let mut outcomes = Vec::with_capacity(backfills.len());
    for backfill in backfills {
        outcomes.push(backfill.apply(pool).await?);
    }
    Ok(outcomes)
}
