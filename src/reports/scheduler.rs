use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{error, info, instrument, warn};

use super::{Mailer, ReportConfig, send_weekly_report};
use crate::db::{get_due_report_settings, mark_report_sent};
use crate::error::AppError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerRun {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Sends every due report once. A setting that fails keeps its schedule and
/// is picked up again on the next tick.
#[instrument(skip(pool, mailer, config))]
pub async fn run_due_reports(
    pool: &Pool<Sqlite>,
    mailer: &dyn Mailer,
    config: &ReportConfig,
    now: NaiveDateTime,
) -> Result<SchedulerRun, AppError> {
    let due = get_due_report_settings(pool, now).await?;
    let mut run = SchedulerRun {
        due: due.len(),
        ..Default::default()
    };

    for setting in due {
        let next = match setting.next_run_after(now) {
            Ok(next) => next,
            Err(e) => {
                warn!(setting_id = setting.id, error = %e, "Skipping report with bad frequency");
                run.failed += 1;
                continue;
            }
        };

        let result = send_weekly_report(
            pool,
            mailer,
            config,
            &setting.recipient_list(),
            setting.base_url.as_deref(),
            now.date(),
        )
        .await;

        match result {
            Ok(outcome) if outcome.sent => {
                mark_report_sent(pool, setting.id, now, next).await?;
                info!(setting_id = setting.id, name = %setting.name, "Scheduled report sent");
                run.sent += 1;
            }
            Ok(_) => {
                warn!(setting_id = setting.id, "Scheduled report was not delivered, will retry");
                run.failed += 1;
            }
            Err(e) => {
                e.log_and_record("Scheduled report");
                run.failed += 1;
            }
        }
    }

    Ok(run)
}

pub fn spawn_report_scheduler(
    pool: Pool<Sqlite>,
    mailer: Arc<dyn Mailer>,
    config: ReportConfig,
    interval: Duration,
) {
    tokio::spawn(async move {
        // `interval` panics on a zero period.
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            let now = Utc::now().naive_utc();
            match run_due_reports(&pool, mailer.as_ref(), &config, now).await {
                Ok(run) if run.due > 0 => {
                    info!(due = run.due, sent = run.sent, failed = run.failed, "Report scheduler tick");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Report scheduler tick failed"),
            }
        }
    });
}
