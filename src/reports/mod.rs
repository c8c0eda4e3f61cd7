//! Weekly staffing report, its delivery and the schedule that drives it.

pub mod mailer;
pub mod scheduler;
pub mod weekly;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

pub use mailer::{DisabledMailer, Mailer, MailjetMailer, OutgoingEmail};
pub use scheduler::{SchedulerRun, run_due_reports, spawn_report_scheduler};
pub use weekly::WeeklyResourceReport;

use crate::env::Settings;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub sender: String,
    /// Used when a report has no recipients of its own.
    pub sales_team_email: Option<String>,
}

impl From<&Settings> for ReportConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            sender: settings.report_sender.clone(),
            sales_team_email: settings.sales_team_email.clone(),
        }
    }
}

impl ReportConfig {
    pub fn resolve_recipients(&self, recipients: &[String]) -> Result<Vec<String>, AppError> {
        if !recipients.is_empty() {
            return Ok(recipients.to_vec());
        }
        match &self.sales_team_email {
            Some(fallback) => Ok(crate::models::split_recipients(fallback)),
            None => Err(AppError::Validation(
                "No recipients given and SALES_TEAM_EMAIL is not set".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub sent: bool,
    pub recipients: Vec<String>,
    pub projects: usize,
}

#[instrument(skip(pool, mailer, config))]
pub async fn send_weekly_report(
    pool: &Pool<Sqlite>,
    mailer: &dyn Mailer,
    config: &ReportConfig,
    recipients: &[String],
    base_url: Option<&str>,
    day: NaiveDate,
) -> Result<SendOutcome, AppError> {
    let recipients = config.resolve_recipients(recipients)?;
    let report = WeeklyResourceReport::generate(pool, day).await?;

    let email = OutgoingEmail {
        from: config.sender.clone(),
        to: recipients.clone(),
        subject: report.subject(),
        text: report.render_text(),
        html: report.render_html(base_url),
    };

    let sent = mailer.send(&email).await;
    info!(sent, recipients = recipients.len(), "Weekly resource report dispatched");

    Ok(SendOutcome {
        sent,
        recipients,
        projects: report.projects.len(),
    })
}
