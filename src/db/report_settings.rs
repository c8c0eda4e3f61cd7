use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{ReportFrequency, ReportSetting};

const SETTING_COLUMNS: &str = "SELECT id, name, frequency, day_of_week, day_of_month, recipients,
        base_url, is_active, last_sent_at, next_scheduled_at
     FROM report_settings";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettingFields {
    pub name: String,
    pub frequency: ReportFrequency,
    pub day_of_week: Option<i64>,
    pub day_of_month: Option<i64>,
    #[serde(default)]
    pub recipients: String,
    pub base_url: Option<String>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

impl ReportSettingFields {
    fn check(&self) -> Result<(), AppError> {
        if let Some(day) = self.day_of_week {
            if !(0..=6).contains(&day) {
                return Err(AppError::Validation(
                    "day_of_week must be between 0 and 6".to_string(),
                ));
            }
        }
        if let Some(day) = self.day_of_month {
            if !(1..=31).contains(&day) {
                return Err(AppError::Validation(
                    "day_of_month must be between 1 and 31".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn next_run(&self, from: NaiveDateTime) -> NaiveDateTime {
        self.frequency.next_run(from, self.day_of_week, self.day_of_month)
    }

    /// Whether an edit invalidates the stored `next_scheduled_at`.
    fn reschedules(&self, current: &ReportSetting) -> bool {
        self.frequency.as_str() != current.frequency
            || self.day_of_week != current.day_of_week
            || self.day_of_month != current.day_of_month
            || (self.is_active && !current.is_active)
    }
}

#[instrument(skip(pool))]
pub async fn get_report_settings(pool: &Pool<Sqlite>) -> Result<Vec<ReportSetting>, AppError> {
    info!("Listing report settings");
    let rows = sqlx::query_as::<_, ReportSetting>(&format!("{} ORDER BY name", SETTING_COLUMNS))
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_report_setting(pool: &Pool<Sqlite>, id: i64) -> Result<ReportSetting, AppError> {
    sqlx::query_as::<_, ReportSetting>(&format!("{} WHERE id = ?", SETTING_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Report setting with id {} not found", id)))
}

/// Active settings whose next run is at or before `now`.
#[instrument(skip(pool))]
pub async fn get_due_report_settings(
    pool: &Pool<Sqlite>,
    now: NaiveDateTime,
) -> Result<Vec<ReportSetting>, AppError> {
    let rows = sqlx::query_as::<_, ReportSetting>(&format!(
        "{} WHERE is_active = 1 AND next_scheduled_at IS NOT NULL AND next_scheduled_at <= ?
         ORDER BY next_scheduled_at",
        SETTING_COLUMNS
    ))
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip(pool, fields), fields(name = %fields.name))]
pub async fn create_report_setting(
    pool: &Pool<Sqlite>,
    fields: &ReportSettingFields,
    now: NaiveDateTime,
) -> Result<ReportSetting, AppError> {
    info!("Creating report setting");
    fields.check()?;

    let res = sqlx::query(
        "INSERT INTO report_settings
            (name, frequency, day_of_week, day_of_month, recipients, base_url, is_active, next_scheduled_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&fields.name)
    .bind(fields.frequency.as_str())
    .bind(fields.day_of_week)
    .bind(fields.day_of_month)
    .bind(&fields.recipients)
    .bind(&fields.base_url)
    .bind(fields.is_active)
    .bind(fields.next_run(now))
    .execute(pool)
    .await?;

    get_report_setting(pool, res.last_insert_rowid()).await
}

/// Changing the schedule, or switching a setting back on, plans the next run
/// from `now` instead of keeping the stale one.
#[instrument(skip(pool, fields), fields(name = %fields.name))]
pub async fn update_report_setting(
    pool: &Pool<Sqlite>,
    id: i64,
    fields: &ReportSettingFields,
    now: NaiveDateTime,
) -> Result<ReportSetting, AppError> {
    info!("Updating report setting");
    fields.check()?;
    let current = get_report_setting(pool, id).await?;

    let next_scheduled_at = if fields.reschedules(&current) {
        Some(fields.next_run(now))
    } else {
        current.next_scheduled_at
    };

    sqlx::query(
        "UPDATE report_settings
         SET name = ?, frequency = ?, day_of_week = ?, day_of_month = ?, recipients = ?,
             base_url = ?, is_active = ?, next_scheduled_at = ?
         WHERE id = ?",
    )
    .bind(&fields.name)
    .bind(fields.frequency.as_str())
    .bind(fields.day_of_week)
    .bind(fields.day_of_month)
    .bind(&fields.recipients)
    .bind(&fields.base_url)
    .bind(fields.is_active)
    .bind(next_scheduled_at)
    .bind(id)
    .execute(pool)
    .await?;

    get_report_setting(pool, id).await
}

#[instrument(skip(pool))]
pub async fn delete_report_setting(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting report setting");
    let res = sqlx::query("DELETE FROM report_settings WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Report setting with id {} not found",
            id
        )));
    }
    Ok(())
}

/// Stamps a successful send and schedules the next one.
#[instrument(skip(pool))]
pub async fn mark_report_sent(
    pool: &Pool<Sqlite>,
    id: i64,
    sent_at: NaiveDateTime,
    next: NaiveDateTime,
) -> Result<(), AppError> {
    sqlx::query("UPDATE report_settings SET last_sent_at = ?, next_scheduled_at = ? WHERE id = ?")
        .bind(sent_at)
        .bind(next)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
