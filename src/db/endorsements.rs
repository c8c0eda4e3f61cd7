use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use super::notifications::{ENDORSEMENT, NewNotification, insert_notification};
use crate::error::AppError;
use crate::models::{Endorsement, Notification};

const ENDORSEMENT_COLUMNS: &str = "SELECT e.id, e.user_skill_id, e.endorser_id,
        u.username AS endorser_name, e.endorsee_id, e.comment, e.created_at
     FROM endorsements e
     JOIN users u ON u.id = e.endorser_id";

#[instrument(skip(pool))]
pub async fn get_skill_endorsements(
    pool: &Pool<Sqlite>,
    user_skill_id: i64,
) -> Result<Vec<Endorsement>, AppError> {
    let rows = sqlx::query_as::<_, Endorsement>(&format!(
        "{} WHERE e.user_skill_id = ? ORDER BY e.created_at DESC",
        ENDORSEMENT_COLUMNS
    ))
    .bind(user_skill_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_user_endorsements(
    pool: &Pool<Sqlite>,
    endorsee_id: i64,
) -> Result<Vec<Endorsement>, AppError> {
    let rows = sqlx::query_as::<_, Endorsement>(&format!(
        "{} WHERE e.endorsee_id = ? ORDER BY e.created_at DESC",
        ENDORSEMENT_COLUMNS
    ))
    .bind(endorsee_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Records an endorsement and notifies the skill's owner. Users cannot
/// endorse themselves or the same skill twice.
#[instrument(skip(pool, comment))]
pub async fn endorse_skill(
    pool: &Pool<Sqlite>,
    endorser_id: i64,
    endorser_name: &str,
    user_skill_id: i64,
    comment: Option<&str>,
) -> Result<(Endorsement, Notification), AppError> {
    info!("Endorsing skill");
    let mut tx = pool.begin().await?;

    let skill: Option<(i64, String)> = sqlx::query_as(
        "SELECT us.user_id, st.name FROM user_skills us
         JOIN skill_templates st ON st.id = us.skill_template_id
         WHERE us.id = ?",
    )
    .bind(user_skill_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((endorsee_id, skill_name)) = skill else {
        return Err(AppError::NotFound(format!(
            "User skill with id {} not found",
            user_skill_id
        )));
    };

    if endorsee_id == endorser_id {
        return Err(AppError::Validation(
            "You cannot endorse your own skill".to_string(),
        ));
    }

    let duplicate: Option<i64> =
        sqlx::query_scalar("SELECT id FROM endorsements WHERE user_skill_id = ? AND endorser_id = ?")
            .bind(user_skill_id)
            .bind(endorser_id)
            .fetch_optional(&mut *tx)
            .await?;
    if duplicate.is_some() {
        return Err(AppError::Conflict(
            "You have already endorsed this skill".to_string(),
        ));
    }

    let res = sqlx::query(
        "INSERT INTO endorsements (user_skill_id, endorser_id, endorsee_id, comment) VALUES (?, ?, ?, ?)",
    )
    .bind(user_skill_id)
    .bind(endorser_id)
    .bind(endorsee_id)
    .bind(comment)
    .execute(&mut *tx)
    .await?;

    let endorsement = sqlx::query_as::<_, Endorsement>(&format!("{} WHERE e.id = ?", ENDORSEMENT_COLUMNS))
        .bind(res.last_insert_rowid())
        .fetch_one(&mut *tx)
        .await?;

    let content = format!("{} endorsed your {} skill", endorser_name, skill_name);
    let notification = insert_notification(
        &mut tx,
        &NewNotification {
            user_id: endorsee_id,
            kind: ENDORSEMENT,
            content: &content,
            related_user_skill_id: Some(user_skill_id),
            related_user_id: Some(endorser_id),
        },
    )
    .await?;

    tx.commit().await?;
    Ok((endorsement, notification))
}
