use skillmetrics::database::{CURRENT_SCHEMA, converge_schema};
use skillmetrics::env::{Settings, load_environment};
use skillmetrics::error::AppError;
use skillmetrics::reports::spawn_report_scheduler;
use skillmetrics::telemetry::init_tracing;
use skillmetrics::{AppConfig, build_rocket, connect_pool, spawn_session_cleanup};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }
    let otel = init_tracing();
    info!(exporting = otel.exporting(), "Tracing initialised");

    let settings = Settings::from_env()?;
    let pool = connect_pool(&settings).await?;

    info!("Converging database schema");
    match converge_schema(
        pool.clone(),
        CURRENT_SCHEMA,
        settings.allow_destructive_migrations,
    )
    .await
    {
        Ok(true) => info!("Schema updated"),
        Ok(false) => info!("Schema already up to date"),
        Err(e) => {
            error!("Database migration failed: {}", e);
            return Err(e.into());
        }
    }

    let config = AppConfig::from_settings(&settings);

    spawn_session_cleanup(pool.clone());
    spawn_report_scheduler(
        pool.clone(),
        config.mailer.clone(),
        config.reports.clone(),
        settings.report_interval,
    );

    let _rocket = build_rocket(pool, config).launch().await?;
    Ok(())
}
