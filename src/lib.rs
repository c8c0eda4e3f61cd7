#[macro_use]
extern crate rocket;

pub mod api;
pub mod auth;
pub mod client;
pub mod database;
pub mod db;
pub mod env;
pub mod error;
pub mod models;
pub mod realtime;
pub mod reports;
pub mod telemetry;
pub mod validation;
#[cfg(test)]
mod test;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rocket::{Build, Rocket};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::{error, info};

use api::SessionPolicy;
use auth::{forbidden_api, not_found_api, unauthorized_api, unprocessable_api};
use db::clean_expired_sessions;
use env::Settings;
use error::AppError;
use realtime::{NotificationHub, notifications_socket};
use reports::{DisabledMailer, Mailer, MailjetMailer, ReportConfig};
use telemetry::TelemetryFairing;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Everything the HTTP layer manages besides the pool.
#[derive(Clone)]
pub struct AppConfig {
    pub session: SessionPolicy,
    pub reports: ReportConfig,
    pub mailer: Arc<dyn Mailer>,
}

impl AppConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            session: SessionPolicy::hours(settings.session_ttl_hours),
            reports: ReportConfig::from(settings),
            mailer: mailer_from_settings(settings),
        }
    }
}

/// Mailjet when both keys are configured, otherwise a mailer that reports
/// every send as failed.
pub fn mailer_from_settings(settings: &Settings) -> Arc<dyn Mailer> {
    match &settings.mailjet {
        Some(credentials) => Arc::new(MailjetMailer::new(credentials.clone())),
        None => {
            info!("Mailjet is not configured, outgoing email is disabled");
            Arc::new(DisabledMailer)
        }
    }
}

pub async fn connect_pool(settings: &Settings) -> Result<Pool<Sqlite>, AppError> {
    let options = SqliteConnectOptions::from_str(&settings.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .min_connections(settings.min_connections)
        .max_connections(settings.max_connections)
        .connect_with(options)
        .await?;

    info!(
        min = settings.min_connections,
        max = settings.max_connections,
        "Connected to database"
    );
    Ok(pool)
}

pub fn build_rocket(pool: Pool<Sqlite>, config: AppConfig) -> Rocket<Build> {
    info!("Starting SkillMetrics");

    rocket::build()
        .manage(pool)
        .manage(NotificationHub::new())
        .manage(config.mailer)
        .manage(config.reports)
        .manage(config.session)
        .mount("/api", api::routes())
        .mount("/", routes![notifications_socket])
        .register(
            "/api",
            catchers![unauthorized_api, forbidden_api, not_found_api, unprocessable_api],
        )
        .attach(TelemetryFairing)
}

pub fn spawn_session_cleanup(pool: Pool<Sqlite>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(SESSION_CLEANUP_INTERVAL).await;
        }
    })
}
