#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serial_test::serial;

    use crate::AppConfig;
    use crate::env::{DEFAULT_MAILJET_API_URL, DEFAULT_REPORT_SENDER, Settings};
    use crate::error::AppError;

    const MANAGED_VARS: [&str; 11] = [
        "DATABASE_URL",
        "DATABASE_MIN_CONNECTIONS",
        "DATABASE_MAX_CONNECTIONS",
        "ALLOW_DESTRUCTIVE_MIGRATIONS",
        "SALES_TEAM_EMAIL",
        "MAILJET_API_KEY",
        "MAILJET_SECRET_KEY",
        "MAILJET_API_URL",
        "REPORT_SENDER_EMAIL",
        "REPORT_SCHEDULER_INTERVAL_SECS",
        "SESSION_TTL_HOURS",
    ];

    /// Runs `f` with only the given variables set among the ones settings read.
    fn with_env<R>(vars: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let all: Vec<(&str, Option<&str>)> = MANAGED_VARS
            .iter()
            .map(|name| {
                let value = vars.iter().find(|(k, _)| k == name).map(|(_, v)| *v);
                (*name, value)
            })
            .collect();
        temp_env::with_vars(all, f)
    }

    #[test]
    #[serial]
    fn test_defaults() {
        let settings = with_env(&[("DATABASE_URL", "sqlite::memory:")], Settings::from_env)
            .expect("settings should load");

        assert_eq!(settings.database_url, "sqlite::memory:");
        assert_eq!(settings.min_connections, 5);
        assert_eq!(settings.max_connections, 20);
        assert!(!settings.allow_destructive_migrations);
        assert!(settings.sales_team_email.is_none());
        assert!(settings.mailjet.is_none());
        assert_eq!(settings.report_sender, DEFAULT_REPORT_SENDER);
        assert_eq!(settings.report_interval, Duration::from_secs(300));
        assert_eq!(settings.session_ttl_hours, 24);
    }

    #[test]
    #[serial]
    fn test_missing_database_url() {
        match with_env(&[], Settings::from_env) {
            Err(AppError::Internal(msg)) => assert!(msg.contains("DATABASE_URL")),
            other => panic!("Expected Internal error, got {:?}", other.map(|s| s.database_url)),
        }
    }

    #[test]
    #[serial]
    fn test_overrides() {
        let settings = with_env(
            &[
                ("DATABASE_URL", "sqlite://skills.db"),
                ("DATABASE_MIN_CONNECTIONS", "1"),
                ("DATABASE_MAX_CONNECTIONS", "4"),
                ("ALLOW_DESTRUCTIVE_MIGRATIONS", "true"),
                ("SALES_TEAM_EMAIL", "  sales@example.com  "),
                ("REPORT_SENDER_EMAIL", "noreply@example.com"),
                ("REPORT_SCHEDULER_INTERVAL_SECS", "60"),
                ("SESSION_TTL_HOURS", "8"),
            ],
            Settings::from_env,
        )
        .unwrap();

        assert_eq!((settings.min_connections, settings.max_connections), (1, 4));
        assert!(settings.allow_destructive_migrations);
        assert_eq!(settings.sales_team_email.as_deref(), Some("sales@example.com"));
        assert_eq!(settings.report_sender, "noreply@example.com");
        assert_eq!(settings.report_interval, Duration::from_secs(60));

        let config = AppConfig::from_settings(&settings);
        assert_eq!(config.session.ttl, chrono::Duration::hours(8));
        assert_eq!(config.reports.sender, "noreply@example.com");
    }

    #[test]
    #[serial]
    fn test_pool_bounds_are_checked() {
        let result = with_env(
            &[
                ("DATABASE_URL", "sqlite::memory:"),
                ("DATABASE_MIN_CONNECTIONS", "10"),
                ("DATABASE_MAX_CONNECTIONS", "2"),
            ],
            Settings::from_env,
        );
        assert!(matches!(result, Err(AppError::Internal(_))));

        let result = with_env(
            &[
                ("DATABASE_URL", "sqlite::memory:"),
                ("DATABASE_MAX_CONNECTIONS", "many"),
            ],
            Settings::from_env,
        );
        match result {
            Err(AppError::Internal(msg)) => assert!(msg.contains("DATABASE_MAX_CONNECTIONS")),
            other => panic!("Expected Internal error, got {:?}", other.map(|s| s.database_url)),
        }
    }

    #[test]
    #[serial]
    fn test_zero_report_interval_is_rejected() {
        let result = with_env(
            &[
                ("DATABASE_URL", "sqlite::memory:"),
                ("REPORT_SCHEDULER_INTERVAL_SECS", "0"),
            ],
            Settings::from_env,
        );
        match result {
            Err(AppError::Internal(msg)) => assert!(msg.contains("REPORT_SCHEDULER_INTERVAL_SECS")),
            other => panic!("Expected Internal error, got {:?}", other.map(|s| s.report_interval)),
        }

        let settings = with_env(
            &[
                ("DATABASE_URL", "sqlite::memory:"),
                ("REPORT_SCHEDULER_INTERVAL_SECS", "1"),
            ],
            Settings::from_env,
        )
        .unwrap();
        assert_eq!(settings.report_interval, Duration::from_secs(1));
    }

    #[test]
    #[serial]
    fn test_mailjet_needs_both_keys() {
        let settings = with_env(
            &[
                ("DATABASE_URL", "sqlite::memory:"),
                ("MAILJET_API_KEY", "key"),
            ],
            Settings::from_env,
        )
        .unwrap();
        assert!(settings.mailjet.is_none());

        let settings = with_env(
            &[
                ("DATABASE_URL", "sqlite::memory:"),
                ("MAILJET_API_KEY", "key"),
                ("MAILJET_SECRET_KEY", "secret"),
            ],
            Settings::from_env,
        )
        .unwrap();
        let mailjet = settings.mailjet.expect("mailjet should be configured");
        assert_eq!(mailjet.api_key, "key");
        assert_eq!(mailjet.api_url, DEFAULT_MAILJET_API_URL);
    }
}
