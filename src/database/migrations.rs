use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{Connection, Pool, Row, Sqlite, SqliteConnection};
use tracing::{debug, info, instrument, warn};

use crate::database::inspect::{SchemaSnapshot, table_columns};
use crate::error::AppError;

/// A table whose `CREATE` statement differs from the target and has to be
/// recreated.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TableRebuild {
    pub table: String,
    pub added_columns: Vec<String>,
    pub dropped_columns: Vec<String>,
}

/// What convergence would do to a database.
#[derive(Default, Debug, Clone)]
pub struct ConvergencePlan {
    pub create_tables: Vec<String>,
    pub drop_tables: Vec<String>,
    pub rebuild_tables: Vec<TableRebuild>,
    pub create_indexes: Vec<String>,
    pub drop_indexes: Vec<String>,
    pub changed_indexes: Vec<String>,
    pub user_version: Option<i64>,
}

impl ConvergencePlan {
    pub fn is_empty(&self) -> bool {
        self.create_tables.is_empty()
            && self.drop_tables.is_empty()
            && self.rebuild_tables.is_empty()
            && self.create_indexes.is_empty()
            && self.drop_indexes.is_empty()
            && self.changed_indexes.is_empty()
            && self.user_version.is_none()
    }

    pub fn is_destructive(&self) -> bool {
        !self.drop_tables.is_empty()
            || !self.drop_indexes.is_empty()
            || self.rebuild_tables.iter().any(|t| !t.dropped_columns.is_empty())
    }

    fn check_deletions_allowed(&self, allowed: bool) -> Result<(), AppError> {
        if allowed || !self.is_destructive() {
            return Ok(());
        }

        let mut refused = Vec::new();
        if !self.drop_tables.is_empty() {
            refused.push(format!("tables {:?}", self.drop_tables));
        }
        for rebuild in self.rebuild_tables.iter().filter(|t| !t.dropped_columns.is_empty()) {
            refused.push(format!("columns {:?} of {}", rebuild.dropped_columns, rebuild.table));
        }
        if !self.drop_indexes.is_empty() {
            refused.push(format!("indexes {:?}", self.drop_indexes));
        }

        Err(AppError::Internal(format!(
            "Schema change would remove {}; set ALLOW_DESTRUCTIVE_MIGRATIONS=true to allow it",
            refused.join(", ")
        )))
    }
}

/// Converges a live database onto a schema given as plain `CREATE`
/// statements. The target is materialised in a scratch in-memory database and
/// the two are diffed through [`SchemaSnapshot`].
pub struct SchemaConverger {
    pool: Pool<Sqlite>,
    schema_sql: String,
    allow_deletions: bool,
    applied: Vec<String>,
}

impl SchemaConverger {
    pub fn new(pool: Pool<Sqlite>, schema_sql: &str, allow_deletions: bool) -> Self {
        Self {
            pool,
            schema_sql: schema_sql.to_string(),
            allow_deletions,
            applied: Vec::new(),
        }
    }

    /// Descriptions of the statements run by the last `converge`.
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    async fn target_snapshot(&self) -> Result<SchemaSnapshot, AppError> {
        let mut scratch = SqliteConnection::connect("sqlite::memory:").await?;
        if !self.schema_sql.trim().is_empty() {
            sqlx::Executor::execute(&mut scratch, sqlx::raw_sql(&self.schema_sql))
                .await
                .map_err(|e| AppError::Internal(format!("Target schema does not load: {}", e)))?;
        }
        let snapshot = SchemaSnapshot::capture(&mut scratch).await?;
        scratch.close().await?;
        Ok(snapshot)
    }

    /// Diffs without writing anything.
    #[instrument(skip(self))]
    pub async fn plan(&self) -> Result<ConvergencePlan, AppError> {
        let target = self.target_snapshot().await?;
        let mut conn = self.pool.acquire().await?;
        let live = SchemaSnapshot::capture(&mut *conn).await?;
        Ok(plan_convergence(&live, &target))
    }

    /// Returns whether anything was changed.
    #[instrument(skip(self))]
    pub async fn converge(&mut self) -> Result<bool, AppError> {
        self.applied.clear();
        let target = self.target_snapshot().await?;

        // Dropping a table during a rebuild must not cascade into its
        // children; integrity is checked with foreign_key_check instead.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await?;
        let outcome = self.converge_in_transaction(&mut conn, &target).await;
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut *conn)
            .await?;

        let changed = outcome?;
        info!(statements = self.applied.len(), changed, "Schema convergence finished");
        Ok(changed)
    }

    async fn converge_in_transaction(
        &mut self,
        conn: &mut SqliteConnection,
        target: &SchemaSnapshot,
    ) -> Result<bool, AppError> {
        let mut tx = conn.begin().await?;

        let live = SchemaSnapshot::capture(&mut *tx).await?;
        let plan = plan_convergence(&live, target);
        if plan.is_empty() {
            tx.commit().await?;
            return Ok(false);
        }
        plan.check_deletions_allowed(self.allow_deletions)?;

        if let Err(e) = self.apply(&mut tx, target, &plan).await {
            tx.rollback().await?;
            return Err(e);
        }

        let violations = sqlx::query("PRAGMA foreign_key_check")
            .fetch_all(&mut *tx)
            .await?;
        if !violations.is_empty() {
            let tables: BTreeSet<String> = violations.iter().map(|r| r.get::<String, _>(0)).collect();
            tx.rollback().await?;
            return Err(AppError::Internal(format!(
                "Converged schema has foreign key violations in {:?}",
                tables
            )));
        }

        tx.commit().await?;
        Ok(!self.applied.is_empty())
    }

    #[instrument(skip_all)]
    async fn apply(
        &mut self,
        tx: &mut SqliteConnection,
        target: &SchemaSnapshot,
        plan: &ConvergencePlan,
    ) -> Result<(), AppError> {
        for name in &plan.create_tables {
            if let Some(table) = target.table(name) {
                self.run(tx, format!("create table {}", name), &table.sql).await?;
            }
        }

        for rebuild in &plan.rebuild_tables {
            if let Some(table) = target.table(&rebuild.table) {
                self.rebuild(tx, &rebuild.table, &table.sql, target).await?;
            }
        }

        for name in &plan.drop_tables {
            self.run(tx, format!("drop table {}", name), &format!("DROP TABLE {}", name))
                .await?;
        }

        // Rebuilds discard indexes, so reconcile against what exists now.
        let live = SchemaSnapshot::capture(&mut *tx).await?;
        let live_indexes = live.named_indexes();
        let target_indexes = target.named_indexes();

        for (name, index) in &live_indexes {
            let wanted = target_indexes
                .get(name)
                .is_some_and(|t| same_sql(t.sql.as_deref(), index.sql.as_deref()));
            if !wanted {
                self.run(tx, format!("drop index {}", name), &format!("DROP INDEX {}", name))
                    .await?;
            }
        }

        for (name, index) in &target_indexes {
            let present = live_indexes
                .get(name)
                .is_some_and(|l| same_sql(l.sql.as_deref(), index.sql.as_deref()));
            if let (false, Some(sql)) = (present, &index.sql) {
                self.run(tx, format!("create index {}", name), sql).await?;
            }
        }

        if let Some(version) = plan.user_version {
            self.run(
                tx,
                format!("user_version {}", version),
                &format!("PRAGMA user_version = {}", version),
            )
            .await?;
        }

        Ok(())
    }

    /// Create `<table>_migration_new`, copy the shared columns, swap it in.
    async fn rebuild(
        &mut self,
        tx: &mut SqliteConnection,
        table: &str,
        create_sql: &str,
        target: &SchemaSnapshot,
    ) -> Result<(), AppError> {
        let staging = format!("{}_migration_new", table);
        self.run(
            tx,
            format!("stage {}", table),
            &retarget_create_table(create_sql, table, &staging),
        )
        .await?;

        let wanted: HashSet<&str> = target
            .table(table)
            .map(|t| t.columns.iter().map(|c| c.name.as_str()).collect())
            .unwrap_or_default();
        let shared: Vec<String> = table_columns(&mut *tx, table)
            .await?
            .into_iter()
            .map(|c| c.name)
            .filter(|name| wanted.contains(name.as_str()))
            .collect();

        if !shared.is_empty() {
            let list = shared.join(", ");
            self.run(
                tx,
                format!("copy rows of {}", table),
                &format!("INSERT INTO {staging} ({list}) SELECT {list} FROM {table}"),
            )
            .await?;
        }

        self.run(tx, format!("retire old {}", table), &format!("DROP TABLE {}", table))
            .await?;
        self.run(
            tx,
            format!("swap in {}", table),
            &format!("ALTER TABLE {} RENAME TO {}", staging, table),
        )
        .await
    }

    async fn run(
        &mut self,
        tx: &mut SqliteConnection,
        step: String,
        sql: &str,
    ) -> Result<(), AppError> {
        debug!(step = %step, sql, "Applying schema statement");
        sqlx::query(sql).execute(&mut *tx).await?;
        info!(step = %step, "Schema statement applied");
        self.applied.push(step);
        Ok(())
    }
}

fn same_sql(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => normalize_sql(a) == normalize_sql(b),
        (None, None) => true,
        _ => false,
    }
}

fn retarget_create_table(sql: &str, from: &str, to: &str) -> String {
    let header = Regex::new(&format!(
        r#"(?i)^\s*CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?["`\[]?{}["`\]]?"#,
        regex::escape(from)
    ));
    match header {
        Ok(re) => re.replace(sql, format!("CREATE TABLE {}", to).as_str()).into_owned(),
        Err(_) => sql.replacen(from, to, 1),
    }
}

fn names_only_in<'a>(a: &BTreeSet<&'a str>, b: &BTreeSet<&'a str>) -> Vec<String> {
    a.difference(b).map(|s| s.to_string()).collect()
}

pub fn plan_convergence(live: &SchemaSnapshot, target: &SchemaSnapshot) -> ConvergencePlan {
    let live_tables: BTreeSet<&str> = live.tables.keys().map(String::as_str).collect();
    let target_tables: BTreeSet<&str> = target.tables.keys().map(String::as_str).collect();

    let rebuild_tables = live_tables
        .intersection(&target_tables)
        .filter_map(|name| {
            let (now, then) = (&live.tables[*name], &target.tables[*name]);
            if normalize_sql(&now.sql) == normalize_sql(&then.sql) {
                return None;
            }
            let now_cols: BTreeSet<&str> = now.columns.iter().map(|c| c.name.as_str()).collect();
            let then_cols: BTreeSet<&str> = then.columns.iter().map(|c| c.name.as_str()).collect();
            Some(TableRebuild {
                table: name.to_string(),
                added_columns: names_only_in(&then_cols, &now_cols),
                dropped_columns: names_only_in(&now_cols, &then_cols),
            })
        })
        .collect();

    let live_indexes = live.named_indexes();
    let target_indexes = target.named_indexes();
    let mut create_indexes = Vec::new();
    let mut changed_indexes = Vec::new();
    for (name, index) in &target_indexes {
        match live_indexes.get(name) {
            None => create_indexes.push(name.clone()),
            Some(existing) if !same_sql(existing.sql.as_deref(), index.sql.as_deref()) => {
                changed_indexes.push(name.clone())
            }
            Some(_) => {}
        }
    }
    let drop_indexes = live_indexes
        .keys()
        .filter(|name| !target_indexes.contains_key(*name))
        .cloned()
        .collect();

    ConvergencePlan {
        create_tables: names_only_in(&target_tables, &live_tables),
        drop_tables: names_only_in(&live_tables, &target_tables),
        rebuild_tables,
        create_indexes,
        drop_indexes,
        changed_indexes,
        user_version: (target.user_version != 0 && live.user_version != target.user_version)
            .then_some(target.user_version),
    }
}

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*(\n|$)").unwrap());
static RUNS_OF_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SPACE_AROUND_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r" *([(),]) *").unwrap());
static DOUBLE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""(\w+)""#).unwrap());
static IF_NOT_EXISTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)IF NOT EXISTS ").unwrap());

/// Canonical form used to decide whether two `CREATE` statements differ.
pub fn normalize_sql(sql: &str) -> String {
    let sql = LINE_COMMENT.replace_all(sql, " ");
    let sql = RUNS_OF_SPACE.replace_all(&sql, " ");
    let sql = SPACE_AROUND_PUNCT.replace_all(&sql, "$1");
    let sql = DOUBLE_QUOTED.replace_all(&sql, "$1");
    let sql = IF_NOT_EXISTS.replace_all(&sql, "");
    sql.trim().trim_end_matches(';').trim().to_string()
}

#[instrument(skip(pool, schema_sql))]
pub async fn converge_schema(
    pool: Pool<Sqlite>,
    schema_sql: &str,
    allow_deletions: bool,
) -> Result<bool, AppError> {
    let mut converger = SchemaConverger::new(pool, schema_sql, allow_deletions);
    let changed = converger.converge().await?;
    if changed && allow_deletions {
        warn!("Destructive schema changes were permitted for this run");
    }
    Ok(changed)
}
