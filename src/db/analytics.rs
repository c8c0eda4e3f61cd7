use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TemplateHolders {
    pub skill_template_id: i64,
    pub name: String,
    pub category: String,
    pub holders: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillAnalytics {
    pub total_user_skills: i64,
    pub certifications: i64,
    pub by_category: Vec<LabelCount>,
    pub by_level: Vec<LabelCount>,
    pub top_skills: Vec<TemplateHolders>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSkillSummary {
    pub user_id: i64,
    pub total: i64,
    pub certifications: i64,
    pub by_level: Vec<LabelCount>,
    pub endorsements_received: i64,
}

#[instrument(skip(pool))]
pub async fn get_skill_analytics(
    pool: &Pool<Sqlite>,
    top: i64,
) -> Result<SkillAnalytics, AppError> {
    info!("Computing skill analytics");

    let (total_user_skills, certifications): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN certification IS NOT NULL AND certification != '' THEN 1 ELSE 0 END), 0)
         FROM user_skills",
    )
    .fetch_one(pool)
    .await?;

    let by_category = sqlx::query_as::<_, LabelCount>(
        "SELECT st.category AS label, COUNT(*) AS count
         FROM user_skills us JOIN skill_templates st ON st.id = us.skill_template_id
         GROUP BY st.category
         ORDER BY count DESC, label",
    )
    .fetch_all(pool)
    .await?;

    let by_level = sqlx::query_as::<_, LabelCount>(
        "SELECT level AS label, COUNT(*) AS count FROM user_skills GROUP BY level ORDER BY label",
    )
    .fetch_all(pool)
    .await?;

    let top_skills = sqlx::query_as::<_, TemplateHolders>(
        "SELECT st.id AS skill_template_id, st.name, st.category, COUNT(us.id) AS holders
         FROM skill_templates st JOIN user_skills us ON us.skill_template_id = st.id
         GROUP BY st.id
         ORDER BY holders DESC, st.name
         LIMIT ?",
    )
    .bind(top)
    .fetch_all(pool)
    .await?;

    Ok(SkillAnalytics {
        total_user_skills,
        certifications,
        by_category,
        by_level,
        top_skills,
    })
}

#[instrument(skip(pool))]
pub async fn get_user_skill_summary(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<UserSkillSummary, AppError> {
    info!("Computing user skill summary");
    super::users::get_user(pool, user_id).await?;

    let by_level = sqlx::query_as::<_, LabelCount>(
        "SELECT level AS label, COUNT(*) AS count FROM user_skills WHERE user_id = ?
         GROUP BY level ORDER BY label",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let (certifications, endorsements_received): (i64, i64) = sqlx::query_as(
        "SELECT
            (SELECT COUNT(*) FROM user_skills
             WHERE user_id = ?1 AND certification IS NOT NULL AND certification != ''),
            (SELECT COUNT(*) FROM endorsements WHERE endorsee_id = ?1)",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(UserSkillSummary {
        user_id,
        total: by_level.iter().map(|l| l.count).sum(),
        certifications,
        by_level,
        endorsements_received,
    })
}
