use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::AppError;

pub const DEFAULT_MAILJET_API_URL: &str = "https://api.mailjet.com/v3.1";
pub const DEFAULT_REPORT_SENDER: &str = "reports@skillmetrics.local";

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

#[derive(Debug, Clone)]
pub struct MailjetCredentials {
    pub api_key: String,
    pub secret_key: String,
    pub api_url: String,
}

/// Runtime settings read from the process environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub allow_destructive_migrations: bool,
    pub sales_team_email: Option<String>,
    pub mailjet: Option<MailjetCredentials>,
    pub report_sender: String,
    pub report_interval: Duration,
    pub session_ttl_hours: i64,
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::Internal("DATABASE_URL environment variable not set".into()))?;

        let min_connections = parse_var("DATABASE_MIN_CONNECTIONS", 5)?;
        let max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 20)?;
        if min_connections > max_connections {
            return Err(AppError::Internal(format!(
                "DATABASE_MIN_CONNECTIONS ({}) exceeds DATABASE_MAX_CONNECTIONS ({})",
                min_connections, max_connections
            )));
        }

        let mailjet = match (
            non_empty_var("MAILJET_API_KEY"),
            non_empty_var("MAILJET_SECRET_KEY"),
        ) {
            (Some(api_key), Some(secret_key)) => Some(MailjetCredentials {
                api_key,
                secret_key,
                api_url: non_empty_var("MAILJET_API_URL")
                    .unwrap_or_else(|| DEFAULT_MAILJET_API_URL.to_string()),
            }),
            (None, None) => None,
            _ => {
                warn!("Only one of MAILJET_API_KEY / MAILJET_SECRET_KEY is set, email is disabled");
                None
            }
        };

        let report_interval_secs: u64 = parse_var("REPORT_SCHEDULER_INTERVAL_SECS", 300)?;
        if report_interval_secs == 0 {
            return Err(AppError::Internal(
                "REPORT_SCHEDULER_INTERVAL_SECS must be at least 1".into(),
            ));
        }

        Ok(Self {
            database_url,
            min_connections,
            max_connections,
            allow_destructive_migrations: parse_var("ALLOW_DESTRUCTIVE_MIGRATIONS", false)?,
            sales_team_email: non_empty_var("SALES_TEAM_EMAIL"),
            mailjet,
            report_sender: non_empty_var("REPORT_SENDER_EMAIL")
                .unwrap_or_else(|| DEFAULT_REPORT_SENDER.to_string()),
            report_interval: Duration::from_secs(report_interval_secs),
            session_ttl_hours: parse_var("SESSION_TTL_HOURS", 24)?,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Internal(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(default),
    }
}
