use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::UserSkill;

pub(crate) const USER_SKILL_COLUMNS: &str = "SELECT us.id, us.user_id, us.skill_template_id,
        st.name, st.category, us.level, us.certification, us.credly_link, us.notes,
        us.description, us.created_at, us.updated_at
     FROM user_skills us
     JOIN skill_templates st ON st.id = us.skill_template_id";

#[instrument(skip(pool))]
pub async fn get_user_skills(pool: &Pool<Sqlite>, user_id: i64) -> Result<Vec<UserSkill>, AppError> {
    info!("Listing user skills");
    let rows = sqlx::query_as::<_, UserSkill>(&format!(
        "{} WHERE us.user_id = ? ORDER BY st.category, st.name",
        USER_SKILL_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_user_skill(pool: &Pool<Sqlite>, id: i64) -> Result<UserSkill, AppError> {
    sqlx::query_as::<_, UserSkill>(&format!("{} WHERE us.id = ?", USER_SKILL_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User skill with id {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn get_template_holders(
    pool: &Pool<Sqlite>,
    template_id: i64,
) -> Result<Vec<UserSkill>, AppError> {
    let rows = sqlx::query_as::<_, UserSkill>(&format!(
        "{} WHERE us.skill_template_id = ? ORDER BY us.level DESC",
        USER_SKILL_COLUMNS
    ))
    .bind(template_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fields written into `user_skills` when an update is applied.
#[derive(Debug, Clone)]
pub struct SkillValues<'a> {
    pub level: &'a str,
    pub certification: Option<&'a str>,
    pub credly_link: Option<&'a str>,
    pub notes: Option<&'a str>,
}

/// Inserts or updates the user's skill for a template and returns its id.
pub async fn upsert_user_skill(
    conn: &mut SqliteConnection,
    user_id: i64,
    template_id: i64,
    values: &SkillValues<'_>,
) -> Result<i64, AppError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO user_skills (user_id, skill_template_id, level, certification, credly_link, notes)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (user_id, skill_template_id) DO UPDATE SET
            level = excluded.level,
            certification = excluded.certification,
            credly_link = excluded.credly_link,
            notes = excluded.notes,
            updated_at = CURRENT_TIMESTAMP
         RETURNING id",
    )
    .bind(user_id)
    .bind(template_id)
    .bind(values.level)
    .bind(values.certification)
    .bind(values.credly_link)
    .bind(values.notes)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

/// Removes one of the user's own skills along with its endorsements,
/// notifications and review history.
#[instrument(skip(pool))]
pub async fn delete_user_skill(
    pool: &Pool<Sqlite>,
    user_id: i64,
    user_skill_id: i64,
) -> Result<(), AppError> {
    info!("Deleting user skill");
    let mut tx = pool.begin().await?;

    let owner: Option<i64> = sqlx::query_scalar("SELECT user_id FROM user_skills WHERE id = ?")
        .bind(user_skill_id)
        .fetch_optional(&mut *tx)
        .await?;

    match owner {
        Some(owner) if owner == user_id => {}
        Some(_) => {
            return Err(AppError::Authorization(
                "You can only delete your own skills".to_string(),
            ));
        }
        None => {
            return Err(AppError::NotFound(format!(
                "User skill with id {} not found",
                user_skill_id
            )));
        }
    }

    for sql in [
        "DELETE FROM notifications WHERE related_user_skill_id = ?",
        "DELETE FROM endorsements WHERE user_skill_id = ?",
        "DELETE FROM pending_skill_updates WHERE user_skill_id = ?",
        "DELETE FROM user_skills WHERE id = ?",
    ] {
        sqlx::query(sql).bind(user_skill_id).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}
