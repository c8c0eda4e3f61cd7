//! Removal of a skill template together with everything that points at it,
//! plus an audit for rows left dangling by older deletions.
//!
//! Databases in the field come in several shapes (v1 `skill_id` columns,
//! a parallel `pending_skill_updates_v2` table, tables that were never
//! created), so every step checks the catalogue before touching a table.

use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{error, info, instrument, warn};

use crate::database::inspect::{has_column, has_table};
use crate::db::get_template_usage;
use crate::error::AppError;

/// Rows removed per table by [`delete_skill_template`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDeletion {
    pub template_id: i64,
    pub template_name: String,
    pub notifications_removed: u64,
    pub endorsements_removed: u64,
    pub pending_updates_removed: u64,
    pub user_skills_removed: u64,
    pub project_skills_removed: u64,
    pub template_removed: bool,
    /// `table.column` references that were absent and therefore skipped.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Counter {
    Notifications,
    Endorsements,
    PendingUpdates,
    UserSkills,
    ProjectSkills,
}

/// How a dependent row is matched against the template being removed.
#[derive(Debug, Clone, Copy)]
enum Match {
    /// The column holds the template id.
    Template,
    /// The column holds the id of a user skill built on the template.
    UserSkill,
}

struct Step {
    table: &'static str,
    column: &'static str,
    matches: Match,
    counter: Counter,
}

const fn step(table: &'static str, column: &'static str, matches: Match, counter: Counter) -> Step {
    Step {
        table,
        column,
        matches,
        counter,
    }
}

/// Dependents first, the template row last.
const DELETION_ORDER: &[Step] = &[
    step("notifications", "related_user_skill_id", Match::UserSkill, Counter::Notifications),
    step("endorsements", "user_skill_id", Match::UserSkill, Counter::Endorsements),
    step("pending_skill_updates", "user_skill_id", Match::UserSkill, Counter::PendingUpdates),
    step("pending_skill_updates", "skill_template_id", Match::Template, Counter::PendingUpdates),
    step("pending_skill_updates", "skill_id", Match::Template, Counter::PendingUpdates),
    step("pending_skill_updates_v2", "user_skill_id", Match::UserSkill, Counter::PendingUpdates),
    step("pending_skill_updates_v2", "skill_template_id", Match::Template, Counter::PendingUpdates),
    step("pending_skill_updates_v2", "skill_id", Match::Template, Counter::PendingUpdates),
    step("user_skills", "skill_template_id", Match::Template, Counter::UserSkills),
    step("project_skills", "skill_template_id", Match::Template, Counter::ProjectSkills),
    step("project_skills", "skill_id", Match::Template, Counter::ProjectSkills),
];

impl TemplateDeletion {
    fn add(&mut self, counter: Counter, rows: u64) {
        match counter {
            Counter::Notifications => self.notifications_removed += rows,
            Counter::Endorsements => self.endorsements_removed += rows,
            Counter::PendingUpdates => self.pending_updates_removed += rows,
            Counter::UserSkills => self.user_skills_removed += rows,
            Counter::ProjectSkills => self.project_skills_removed += rows,
        }
    }

    pub fn dependents_removed(&self) -> u64 {
        self.notifications_removed
            + self.endorsements_removed
            + self.pending_updates_removed
            + self.user_skills_removed
            + self.project_skills_removed
    }
}

/// Deletes a template and every row that depends on it in one transaction.
/// Any failure rolls the whole sequence back.
#[instrument(skip(pool))]
pub async fn delete_skill_template(
    pool: &Pool<Sqlite>,
    template_id: i64,
) -> Result<TemplateDeletion, AppError> {
    info!("Deleting skill template with cascade");
    delete_in_transaction(pool, template_id, false).await
}

/// Like [`delete_skill_template`], but refuses with a conflict when a user
/// skill or project skill still uses the template. The check runs in the
/// same transaction as the deletes.
#[instrument(skip(pool))]
pub async fn delete_unused_skill_template(
    pool: &Pool<Sqlite>,
    template_id: i64,
) -> Result<TemplateDeletion, AppError> {
    info!("Deleting unused skill template");
    delete_in_transaction(pool, template_id, true).await
}

async fn delete_in_transaction(
    pool: &Pool<Sqlite>,
    template_id: i64,
    refuse_in_use: bool,
) -> Result<TemplateDeletion, AppError> {
    let mut tx = pool.begin().await?;

    match delete_in(&mut tx, template_id, refuse_in_use).await {
        Ok(report) => {
            tx.commit().await?;
            info!(
                user_skills_removed = report.user_skills_removed,
                project_skills_removed = report.project_skills_removed,
                pending_updates_removed = report.pending_updates_removed,
                "Skill template deleted"
            );
            Ok(report)
        }
        Err(e) => {
            if !matches!(e, AppError::NotFound(_) | AppError::Conflict(_)) {
                error!(error = %e, "Template deletion failed, rolling back");
            }
            tx.rollback().await?;
            Err(e)
        }
    }
}

async fn delete_in(
    conn: &mut SqliteConnection,
    template_id: i64,
    refuse_in_use: bool,
) -> Result<TemplateDeletion, AppError> {
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM skill_templates WHERE id = ?")
        .bind(template_id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(template_name) = name else {
        return Err(AppError::NotFound(format!(
            "Skill template with id {} not found",
            template_id
        )));
    };

    if refuse_in_use {
        let usage = get_template_usage(&mut *conn, template_id).await?;
        if usage.in_use() {
            warn!(template_id, ?usage, "Refusing to delete template in use");
            return Err(AppError::Conflict(format!(
                "Skill template is in use by {} user skill(s) and {} project(s)",
                usage.user_skills, usage.project_skills
            )));
        }
    }

    let mut report = TemplateDeletion {
        template_id,
        template_name,
        ..Default::default()
    };

    // Rows matched through user skills need user_skills to carry the template
    // reference; otherwise there is nothing to resolve them through.
    let user_skills_linked = has_column(&mut *conn, "user_skills", "skill_template_id").await?;

    for step in DELETION_ORDER {
        let reference = format!("{}.{}", step.table, step.column);

        if !has_table(&mut *conn, step.table).await? {
            info!("Table {} does not exist, skipping", step.table);
            report.skipped.push(reference);
            continue;
        }
        if !has_column(&mut *conn, step.table, step.column).await? {
            info!("Column {} does not exist, skipping", reference);
            report.skipped.push(reference);
            continue;
        }

        let sql = match step.matches {
            Match::Template => format!("DELETE FROM {} WHERE {} = ?", step.table, step.column),
            Match::UserSkill if user_skills_linked => format!(
                "DELETE FROM {} WHERE {} IN (SELECT id FROM user_skills WHERE skill_template_id = ?)",
                step.table, step.column
            ),
            Match::UserSkill => {
                warn!("user_skills has no skill_template_id, skipping {}", reference);
                report.skipped.push(reference);
                continue;
            }
        };

        let rows = sqlx::query(&sql)
            .bind(template_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        info!(rows, "Deleted from {}", reference);
        report.add(step.counter, rows);
    }

    let res = sqlx::query("DELETE FROM skill_templates WHERE id = ?")
        .bind(template_id)
        .execute(&mut *conn)
        .await?;
    report.template_removed = res.rows_affected() == 1;

    Ok(report)
}

/// Rows referencing a template that no longer exists, per dependent table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanReport {
    pub notifications: u64,
    pub endorsements: u64,
    pub pending_skill_updates: u64,
    pub user_skills: u64,
    pub project_skills: u64,
    /// `table.column` checks that this database cannot run.
    #[serde(default)]
    pub skipped: Vec<String>,
}

impl OrphanReport {
    pub fn total(&self) -> u64 {
        self.notifications
            + self.endorsements
            + self.pending_skill_updates
            + self.user_skills
            + self.project_skills
    }

    fn slot(&mut self, table: &str) -> Option<&mut u64> {
        match table {
            "notifications" => Some(&mut self.notifications),
            "endorsements" => Some(&mut self.endorsements),
            "pending_skill_updates" => Some(&mut self.pending_skill_updates),
            "user_skills" => Some(&mut self.user_skills),
            "project_skills" => Some(&mut self.project_skills),
            _ => None,
        }
    }
}

const LIVE_TEMPLATES: &str = "SELECT id FROM skill_templates";
const LIVE_USER_SKILLS: &str =
    "SELECT id FROM user_skills WHERE skill_template_id IN (SELECT id FROM skill_templates)";

/// (table, column, set of ids the column may legitimately hold). Purged in
/// this order so nothing is deleted out from under a dependent.
const ORPHAN_CHECKS: &[(&str, &str, &str)] = &[
    ("notifications", "related_user_skill_id", LIVE_USER_SKILLS),
    ("endorsements", "user_skill_id", LIVE_USER_SKILLS),
    ("pending_skill_updates", "user_skill_id", LIVE_USER_SKILLS),
    ("pending_skill_updates", "skill_template_id", LIVE_TEMPLATES),
    ("user_skills", "skill_template_id", LIVE_TEMPLATES),
    ("project_skills", "skill_template_id", LIVE_TEMPLATES),
];

/// Checks that can run against this database. A user-skill check needs
/// `user_skills.skill_template_id` to resolve which user skills are live.
async fn runnable_orphan_checks(
    conn: &mut SqliteConnection,
    report: &mut OrphanReport,
) -> Result<Vec<(&'static str, &'static str, &'static str)>, AppError> {
    let user_skills_linked = has_column(&mut *conn, "user_skills", "skill_template_id").await?;

    let mut runnable = Vec::new();
    for &(table, column, live) in ORPHAN_CHECKS {
        let reference = format!("{}.{}", table, column);
        if !has_column(&mut *conn, table, column).await? {
            report.skipped.push(reference);
            continue;
        }
        if live == LIVE_USER_SKILLS && !user_skills_linked {
            warn!("user_skills has no skill_template_id, skipping {}", reference);
            report.skipped.push(reference);
            continue;
        }
        runnable.push((table, column, live));
    }
    Ok(runnable)
}

fn orphan_filter(column: &str, live: &str) -> String {
    format!("{} IS NOT NULL AND {} NOT IN ({})", column, column, live)
}

async fn run_orphan_checks(conn: &mut SqliteConnection, purge: bool) -> Result<OrphanReport, AppError> {
    let mut report = OrphanReport::default();
    let checks = runnable_orphan_checks(&mut *conn, &mut report).await?;

    for (index, &(table, column, live)) in checks.iter().enumerate() {
        let filter = orphan_filter(column, live);

        let rows = if purge {
            sqlx::query(&format!("DELETE FROM {} WHERE {}", table, filter))
                .execute(&mut *conn)
                .await?
                .rows_affected()
        } else {
            // Avoid double counting rows that fail more than one check.
            let already: String = checks[..index]
                .iter()
                .filter(|(t, _, _)| *t == table)
                .map(|(_, c, l)| format!(" AND NOT ({})", orphan_filter(c, l)))
                .collect();
            let count: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM {} WHERE {}{}",
                table, filter, already
            ))
            .fetch_one(&mut *conn)
            .await?;
            count as u64
        };

        if let Some(slot) = report.slot(table) {
            *slot += rows;
        }
    }

    Ok(report)
}

#[instrument(skip(pool))]
pub async fn audit_orphans(pool: &Pool<Sqlite>) -> Result<OrphanReport, AppError> {
    info!("Auditing rows that reference missing skill templates");
    let mut conn = pool.acquire().await?;
    let report = run_orphan_checks(&mut conn, false).await?;
    if report.total() > 0 {
        warn!(total = report.total(), "Found orphaned skill references");
    }
    Ok(report)
}

#[instrument(skip(pool))]
pub async fn purge_orphans(pool: &Pool<Sqlite>) -> Result<OrphanReport, AppError> {
    info!("Purging orphaned skill references");
    let mut tx = pool.begin().await?;
    match run_orphan_checks(&mut tx, true).await {
        Ok(report) => {
            tx.commit().await?;
            Ok(report)
        }
        Err(e) => {
            error!(error = %e, "Orphan purge failed, rolling back");
            tx.rollback().await?;
            Err(e)
        }
    }
}
