use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const SKILL_LEVELS: [&str; 3] = ["beginner", "intermediate", "expert"];
pub const IMPORTANCE_LEVELS: [&str; 3] = ["low", "medium", "high"];
pub const PROJECT_STATUSES: [&str; 4] = ["planning", "active", "completed", "on_hold"];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SkillCategory {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SkillSubcategory {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SkillTemplate {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub description: Option<String>,
    pub is_recommended: bool,
    pub target_level: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// A user's recorded proficiency, joined with its template.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSkill {
    pub id: i64,
    pub user_id: i64,
    pub skill_template_id: i64,
    pub name: String,
    pub category: String,
    pub level: String,
    pub certification: Option<String>,
    pub credly_link: Option<String>,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingSkillUpdate {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub user_skill_id: Option<i64>,
    pub skill_template_id: i64,
    pub skill_name: String,
    pub level: String,
    pub certification: Option<String>,
    pub credly_link: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub is_update: bool,
    pub submitted_at: Option<NaiveDateTime>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub reviewed_by: Option<i64>,
    pub review_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Endorsement {
    pub id: i64,
    pub user_skill_id: i64,
    pub endorser_id: i64,
    pub endorser_name: String,
    pub endorsee_id: i64,
    pub comment: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub is_read: bool,
    pub related_user_skill_id: Option<i64>,
    pub related_user_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub industry: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub website: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub client_id: Option<i64>,
    pub client_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub confluence_link: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectSkill {
    pub id: i64,
    pub project_id: i64,
    pub skill_template_id: i64,
    pub skill_name: String,
    pub category: String,
    pub required_level: String,
    pub importance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectResource {
    pub id: i64,
    pub project_id: i64,
    pub user_id: i64,
    pub username: String,
    pub role: String,
    pub allocation: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectResourceHistory {
    pub id: i64,
    pub project_id: i64,
    pub user_id: i64,
    pub action: String,
    pub previous_role: Option<String>,
    pub new_role: Option<String>,
    pub previous_allocation: Option<i64>,
    pub new_allocation: Option<i64>,
    pub performed_by: Option<i64>,
    pub note: Option<String>,
    pub date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFrequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl ReportFrequency {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "daily" => Ok(ReportFrequency::Daily),
            "weekly" => Ok(ReportFrequency::Weekly),
            "biweekly" => Ok(ReportFrequency::Biweekly),
            "monthly" => Ok(ReportFrequency::Monthly),
            other => Err(AppError::Validation(format!(
                "Unknown report frequency: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFrequency::Daily => "daily",
            ReportFrequency::Weekly => "weekly",
            ReportFrequency::Biweekly => "biweekly",
            ReportFrequency::Monthly => "monthly",
        }
    }

    /// First run strictly after `from`, with no weekday or day-of-month anchor.
    pub fn next_after(&self, from: NaiveDateTime) -> NaiveDateTime {
        self.next_run(from, None, None)
    }

    /// First run strictly after `from`. Weekly and biweekly runs land on
    /// `day_of_week` (0 = Sunday .. 6 = Saturday); monthly runs land on
    /// `day_of_month`, clamped to the month's last day. Without an anchor the
    /// weekday or day of `from` is kept. The time of day is always kept.
    pub fn next_run(
        &self,
        from: NaiveDateTime,
        day_of_week: Option<i64>,
        day_of_month: Option<i64>,
    ) -> NaiveDateTime {
        let date = from.date();
        let next = match self {
            ReportFrequency::Daily => date + Duration::days(1),
            ReportFrequency::Weekly | ReportFrequency::Biweekly => {
                let today = i64::from(date.weekday().num_days_from_sunday());
                let target = day_of_week.filter(|d| (0..7).contains(d)).unwrap_or(today);
                // 1..=7 days ahead, so the same weekday means next week.
                let ahead = (target - today - 1).rem_euclid(7) + 1;
                let extra = if *self == ReportFrequency::Biweekly { 7 } else { 0 };
                date + Duration::days(ahead + extra)
            }
            ReportFrequency::Monthly => {
                let day = day_of_month
                    .and_then(|d| u32::try_from(d).ok())
                    .filter(|d| (1..=31).contains(d))
                    .unwrap_or(date.day());
                match clamped_date(date.year(), date.month(), day).filter(|d| *d > date) {
                    Some(this_month) => this_month,
                    None => {
                        let (year, month) = if date.month() == 12 {
                            (date.year() + 1, 1)
                        } else {
                            (date.year(), date.month() + 1)
                        };
                        clamped_date(year, month, day).unwrap_or(date + Duration::days(30))
                    }
                }
            }
        };
        next.and_time(from.time())
    }
}

/// `day` of the given month, or its last day when the month is shorter.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
    first.with_day(day.min(last.day()))
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReportSetting {
    pub id: i64,
    pub name: String,
    pub frequency: String,
    pub day_of_week: Option<i64>,
    pub day_of_month: Option<i64>,
    pub recipients: String,
    pub base_url: Option<String>,
    pub is_active: bool,
    pub last_sent_at: Option<NaiveDateTime>,
    pub next_scheduled_at: Option<NaiveDateTime>,
}

impl ReportSetting {
    pub fn recipient_list(&self) -> Vec<String> {
        split_recipients(&self.recipients)
    }

    pub fn next_run_after(&self, from: NaiveDateTime) -> Result<NaiveDateTime, AppError> {
        let frequency = ReportFrequency::parse(&self.frequency)?;
        Ok(frequency.next_run(from, self.day_of_week, self.day_of_month))
    }
}

pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect()
}

pub fn validate_choice(field: &str, value: &str, choices: &[&str]) -> Result<(), AppError> {
    if choices.contains(&value) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} must be one of {}",
            field,
            choices.join(", ")
        )))
    }
}
