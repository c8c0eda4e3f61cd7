use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use super::notifications::{NewNotification, SKILL_APPROVED, SKILL_REJECTED, insert_notification};
use super::user_skills::{SkillValues, upsert_user_skill};
use crate::error::AppError;
use crate::models::{ApprovalStatus, Notification, PendingSkillUpdate};

const PENDING_COLUMNS: &str = "SELECT p.id, p.user_id, u.username, p.user_skill_id,
        p.skill_template_id, st.name AS skill_name, p.level, p.certification, p.credly_link,
        p.notes, p.status, p.is_update, p.submitted_at, p.reviewed_at, p.reviewed_by,
        p.review_notes
     FROM pending_skill_updates p
     JOIN users u ON u.id = p.user_id
     JOIN skill_templates st ON st.id = p.skill_template_id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSubmission {
    pub skill_template_id: i64,
    pub level: String,
    pub certification: Option<String>,
    pub credly_link: Option<String>,
    pub notes: Option<String>,
}

/// A reviewed update together with the notification sent to its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub update: PendingSkillUpdate,
    pub notification: Notification,
    pub user_skill_id: Option<i64>,
}

async fn fetch_pending(conn: &mut SqliteConnection, id: i64) -> Result<PendingSkillUpdate, AppError> {
    sqlx::query_as::<_, PendingSkillUpdate>(&format!("{} WHERE p.id = ?", PENDING_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Pending skill update with id {} not found", id)))
}

/// Queues a new skill or a change to an existing one for admin review.
#[instrument(skip(pool, submission), fields(template_id = submission.skill_template_id))]
pub async fn submit_skill_update(
    pool: &Pool<Sqlite>,
    user_id: i64,
    submission: &SkillSubmission,
) -> Result<PendingSkillUpdate, AppError> {
    info!("Submitting skill update for review");
    let mut conn = pool.acquire().await?;

    let template: Option<i64> = sqlx::query_scalar("SELECT id FROM skill_templates WHERE id = ?")
        .bind(submission.skill_template_id)
        .fetch_optional(&mut *conn)
        .await?;
    if template.is_none() {
        return Err(AppError::NotFound(format!(
            "Skill template with id {} not found",
            submission.skill_template_id
        )));
    }

    let already_pending: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM pending_skill_updates
         WHERE user_id = ? AND skill_template_id = ? AND status = 'pending'",
    )
    .bind(user_id)
    .bind(submission.skill_template_id)
    .fetch_optional(&mut *conn)
    .await?;
    if already_pending.is_some() {
        return Err(AppError::Conflict(
            "An update for this skill is already awaiting review".to_string(),
        ));
    }

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM user_skills WHERE user_id = ? AND skill_template_id = ?",
    )
    .bind(user_id)
    .bind(submission.skill_template_id)
    .fetch_optional(&mut *conn)
    .await?;

    let res = sqlx::query(
        "INSERT INTO pending_skill_updates
            (user_id, user_skill_id, skill_template_id, level, certification, credly_link, notes, is_update)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(existing)
    .bind(submission.skill_template_id)
    .bind(&submission.level)
    .bind(&submission.certification)
    .bind(&submission.credly_link)
    .bind(&submission.notes)
    .bind(existing.is_some())
    .execute(&mut *conn)
    .await?;

    fetch_pending(&mut conn, res.last_insert_rowid()).await
}

#[instrument(skip(pool))]
pub async fn get_pending_updates(
    pool: &Pool<Sqlite>,
    status: Option<ApprovalStatus>,
) -> Result<Vec<PendingSkillUpdate>, AppError> {
    info!("Listing skill updates");
    let status = status.map(|s| s.as_str());
    let rows = sqlx::query_as::<_, PendingSkillUpdate>(&format!(
        "{} WHERE ? IS NULL OR p.status = ? ORDER BY p.submitted_at, p.id",
        PENDING_COLUMNS
    ))
    .bind(status)
    .bind(status)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_user_pending_updates(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<PendingSkillUpdate>, AppError> {
    let rows = sqlx::query_as::<_, PendingSkillUpdate>(&format!(
        "{} WHERE p.user_id = ? ORDER BY p.submitted_at DESC, p.id DESC",
        PENDING_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_pending_update(pool: &Pool<Sqlite>, id: i64) -> Result<PendingSkillUpdate, AppError> {
    let mut conn = pool.acquire().await?;
    fetch_pending(&mut conn, id).await
}

async fn mark_reviewed(
    conn: &mut SqliteConnection,
    id: i64,
    status: ApprovalStatus,
    reviewer_id: i64,
    review_notes: Option<&str>,
    user_skill_id: Option<i64>,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE pending_skill_updates
         SET status = ?, reviewed_at = CURRENT_TIMESTAMP, reviewed_by = ?, review_notes = ?,
             user_skill_id = COALESCE(?, user_skill_id)
         WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(reviewer_id)
    .bind(review_notes)
    .bind(user_skill_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn review_in(
    conn: &mut SqliteConnection,
    id: i64,
    reviewer_id: i64,
    decision: ApprovalStatus,
    review_notes: Option<&str>,
) -> Result<ReviewOutcome, AppError> {
    let pending = fetch_pending(&mut *conn, id).await?;
    if pending.status != ApprovalStatus::Pending.as_str() {
        warn!(status = %pending.status, "Skill update already reviewed");
        return Err(AppError::Conflict(format!(
            "Skill update {} has already been {}",
            id, pending.status
        )));
    }

    let (user_skill_id, kind, content) = match decision {
        ApprovalStatus::Approved => {
            let user_skill_id = upsert_user_skill(
                &mut *conn,
                pending.user_id,
                pending.skill_template_id,
                &SkillValues {
                    level: &pending.level,
                    certification: pending.certification.as_deref(),
                    credly_link: pending.credly_link.as_deref(),
                    notes: pending.notes.as_deref(),
                },
            )
            .await?;
            (
                Some(user_skill_id),
                SKILL_APPROVED,
                format!(
                    "Your {} skill ({}) was approved",
                    pending.skill_name, pending.level
                ),
            )
        }
        _ => (
            pending.user_skill_id,
            SKILL_REJECTED,
            match review_notes {
                Some(notes) => format!(
                    "Your {} skill update was rejected: {}",
                    pending.skill_name, notes
                ),
                None => format!("Your {} skill update was rejected", pending.skill_name),
            },
        ),
    };

    mark_reviewed(&mut *conn, id, decision, reviewer_id, review_notes, user_skill_id).await?;

    let notification = insert_notification(
        &mut *conn,
        &NewNotification {
            user_id: pending.user_id,
            kind,
            content: &content,
            related_user_skill_id: user_skill_id,
            related_user_id: Some(reviewer_id),
        },
    )
    .await?;

    let update = fetch_pending(&mut *conn, id).await?;
    Ok(ReviewOutcome {
        update,
        notification,
        user_skill_id,
    })
}

async fn review(
    pool: &Pool<Sqlite>,
    id: i64,
    reviewer_id: i64,
    decision: ApprovalStatus,
    review_notes: Option<&str>,
) -> Result<ReviewOutcome, AppError> {
    let mut tx = pool.begin().await?;
    let outcome = review_in(&mut tx, id, reviewer_id, decision, review_notes).await?;
    tx.commit().await?;
    Ok(outcome)
}

/// Applies the update to `user_skills` and notifies the owner.
#[instrument(skip(pool))]
pub async fn approve_skill_update(
    pool: &Pool<Sqlite>,
    id: i64,
    reviewer_id: i64,
    review_notes: Option<&str>,
) -> Result<ReviewOutcome, AppError> {
    info!("Approving skill update");
    review(pool, id, reviewer_id, ApprovalStatus::Approved, review_notes).await
}

#[instrument(skip(pool))]
pub async fn reject_skill_update(
    pool: &Pool<Sqlite>,
    id: i64,
    reviewer_id: i64,
    review_notes: Option<&str>,
) -> Result<ReviewOutcome, AppError> {
    info!("Rejecting skill update");
    review(pool, id, reviewer_id, ApprovalStatus::Rejected, review_notes).await
}
