#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
    use rocket::http::{ContentType, Status};
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::db::{
        ReportSettingFields, ResourceFields, add_project_resource, create_report_setting,
        get_report_setting, update_report_setting,
    };
    use crate::env::MailjetCredentials;
    use crate::models::ReportFrequency;
    use crate::reports::weekly::week_bounds;
    use crate::reports::{
        Mailer, MailjetMailer, OutgoingEmail, SendOutcome, WeeklyResourceReport, run_due_reports,
    };
    use crate::test::test_db::TestDb;
    use crate::test::test_utils::{
        SALES_TEAM, bearer, create_standard_test_db, login_test_user, setup_test_client_with,
        test_config,
    };

    /// Keeps every message and answers with a fixed delivery result.
    #[derive(Default)]
    struct RecordingMailer {
        deliver: bool,
        sent: Mutex<Vec<OutgoingEmail>>,
    }

    impl RecordingMailer {
        fn delivering() -> Arc<Self> {
            Arc::new(Self {
                deliver: true,
                ..Default::default()
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn messages(&self) -> Vec<OutgoingEmail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[rocket::async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> bool {
            self.sent.lock().unwrap().push(email.clone());
            self.deliver
        }
    }

    async fn staff(test_db: &TestDb, username: &str, allocation: i64) {
        let project = test_db.project_id("Platform Migration").unwrap();
        let admin = test_db.user_id("admin_user").unwrap();
        add_project_resource(
            &test_db.pool,
            project,
            &ResourceFields {
                user_id: test_db.user_id(username).unwrap(),
                role: "Engineer".to_string(),
                allocation,
                start_date: None,
                end_date: None,
                notes: None,
            },
            admin,
        )
        .await
        .expect("Failed to assign resource");
    }

    fn weekly_setting(recipients: &str) -> ReportSettingFields {
        ReportSettingFields {
            name: "Monday staffing".to_string(),
            frequency: ReportFrequency::Weekly,
            day_of_week: Some(1),
            day_of_month: None,
            recipients: recipients.to_string(),
            base_url: Some("https://skills.example.com".to_string()),
            is_active: true,
        }
    }

    #[test]
    fn test_week_bounds_run_monday_to_sunday() {
        let thursday = NaiveDate::from_ymd_opt(2024, 5, 16).unwrap();
        let (start, end) = week_bounds(thursday);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 5, 13).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 5, 19).unwrap());

        let monday = NaiveDate::from_ymd_opt(2024, 5, 13).unwrap();
        assert_eq!(week_bounds(monday).0, monday);

        let sunday = NaiveDate::from_ymd_opt(2024, 5, 19).unwrap();
        assert_eq!(week_bounds(sunday), (start, end));
    }

    #[test]
    fn test_monthly_schedule_clamps_to_month_end() {
        let jan_31 = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let next = ReportFrequency::Monthly.next_after(jan_31);
        assert_eq!(next.date(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let dec_15 = NaiveDate::from_ymd_opt(2024, 12, 15)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let next = ReportFrequency::Monthly.next_after(dec_15);
        assert_eq!(next.date(), NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());

        assert_eq!(
            ReportFrequency::Biweekly.next_after(dec_15),
            dec_15 + Duration::weeks(2)
        );
    }

    #[test]
    fn test_weekly_schedule_lands_on_requested_weekday() {
        // A Wednesday.
        let wed = NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        let next = ReportFrequency::Weekly.next_run(wed, Some(1), None);
        assert_eq!(next, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(9, 0, 0).unwrap());
        assert_eq!(next.weekday(), Weekday::Mon);

        // Already on the requested day: a full period later.
        let monday = ReportFrequency::Weekly.next_run(next, Some(1), None);
        assert_eq!(monday, next + Duration::weeks(1));
        assert_eq!(
            ReportFrequency::Biweekly.next_run(next, Some(1), None),
            next + Duration::weeks(2)
        );

        // Sunday is 0; Saturday is 6.
        assert_eq!(
            ReportFrequency::Weekly.next_run(wed, Some(0), None).date(),
            NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
        );
        assert_eq!(
            ReportFrequency::Biweekly.next_run(wed, Some(6), None).date(),
            NaiveDate::from_ymd_opt(2026, 10, 24).unwrap()
        );

        // Daily ignores anchors.
        assert_eq!(ReportFrequency::Daily.next_run(wed, Some(1), Some(1)), wed + Duration::days(1));
    }

    #[test]
    fn test_monthly_schedule_lands_on_requested_day() {
        let oct_14 = NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        assert_eq!(
            ReportFrequency::Monthly.next_run(oct_14, None, Some(1)).date(),
            NaiveDate::from_ymd_opt(2026, 11, 1).unwrap()
        );
        // Still ahead this month.
        assert_eq!(
            ReportFrequency::Monthly.next_run(oct_14, None, Some(20)).date(),
            NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
        );
        assert_eq!(
            ReportFrequency::Monthly.next_run(oct_14, None, Some(14)).date(),
            NaiveDate::from_ymd_opt(2026, 11, 14).unwrap()
        );

        // Day 31 clamps to the end of shorter months.
        let oct_31 = ReportFrequency::Monthly.next_run(oct_14, None, Some(31));
        assert_eq!(oct_31.date(), NaiveDate::from_ymd_opt(2026, 10, 31).unwrap());
        let next = ReportFrequency::Monthly.next_run(oct_31, None, Some(31));
        assert_eq!(next.date(), NaiveDate::from_ymd_opt(2026, 11, 30).unwrap());
        let feb = NaiveDate::from_ymd_opt(2027, 1, 31).unwrap().and_hms_opt(9, 0, 0).unwrap();
        assert_eq!(
            ReportFrequency::Monthly.next_run(feb, None, Some(31)).date(),
            NaiveDate::from_ymd_opt(2027, 2, 28).unwrap()
        );
    }

    #[tokio::test]
    async fn test_created_setting_uses_its_anchor() {
        let test_db = create_standard_test_db().await;
        let wed = NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        let weekly = create_report_setting(&test_db.pool, &weekly_setting(""), wed)
            .await
            .unwrap();
        assert_eq!(
            weekly.next_scheduled_at.map(|n| n.date()),
            NaiveDate::from_ymd_opt(2026, 10, 19)
        );

        let mut monthly = weekly_setting("");
        monthly.name = "Month start".to_string();
        monthly.frequency = ReportFrequency::Monthly;
        monthly.day_of_week = None;
        monthly.day_of_month = Some(1);
        let monthly = create_report_setting(&test_db.pool, &monthly, wed).await.unwrap();
        assert_eq!(
            monthly.next_scheduled_at.map(|n| n.date()),
            NaiveDate::from_ymd_opt(2026, 11, 1)
        );
    }

    #[tokio::test]
    async fn test_update_reschedules_on_reactivation_and_frequency_change() {
        let test_db = create_standard_test_db().await;
        let now = Utc::now().naive_utc();
        let mut fields = weekly_setting("ops@example.com");
        let setting = create_report_setting(&test_db.pool, &fields, now - Duration::weeks(12))
            .await
            .unwrap();
        let stale = setting.next_scheduled_at;

        // Renaming keeps the plan.
        fields.name = "Renamed".to_string();
        let renamed = update_report_setting(&test_db.pool, setting.id, &fields, now)
            .await
            .unwrap();
        assert_eq!(renamed.next_scheduled_at, stale);

        fields.is_active = false;
        let paused = update_report_setting(&test_db.pool, setting.id, &fields, now)
            .await
            .unwrap();
        assert_eq!(paused.next_scheduled_at, stale);

        fields.is_active = true;
        let resumed = update_report_setting(&test_db.pool, setting.id, &fields, now)
            .await
            .unwrap();
        let next = resumed.next_scheduled_at.unwrap();
        assert!(next > now);
        assert_eq!(next.weekday(), Weekday::Mon);

        fields.frequency = ReportFrequency::Daily;
        let daily = update_report_setting(&test_db.pool, setting.id, &fields, now)
            .await
            .unwrap();
        assert_eq!(daily.next_scheduled_at, Some(now + Duration::days(1)));
    }

    #[tokio::test]
    async fn test_weekly_report_flags_over_allocation() {
        let test_db = create_standard_test_db().await;
        staff(&test_db, "alice", 60).await;
        staff(&test_db, "bob", 40).await;

        // A second active project pushes alice past a full week.
        sqlx::query("INSERT INTO projects (name, status) VALUES ('Side Quest', 'active')")
            .execute(&test_db.pool)
            .await
            .unwrap();
        let side: i64 = sqlx::query_scalar("SELECT id FROM projects WHERE name = 'Side Quest'")
            .fetch_one(&test_db.pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO project_resources (project_id, user_id, role, allocation) VALUES (?, ?, 'Reviewer', 50)",
        )
        .bind(side)
        .bind(test_db.user_id("alice").unwrap())
        .execute(&test_db.pool)
        .await
        .unwrap();

        let report = WeeklyResourceReport::generate(&test_db.pool, Utc::now().date_naive())
            .await
            .unwrap();

        assert_eq!(report.projects.len(), 2);
        let migration = report
            .projects
            .iter()
            .find(|p| p.name == "Platform Migration")
            .unwrap();
        assert_eq!(migration.client_name.as_deref(), Some("Acme"));
        assert_eq!(migration.resources.len(), 2);

        let alice = &report.allocations[0];
        assert_eq!(alice.username, "alice");
        assert_eq!(alice.total_allocation, 110);
        assert_eq!(alice.project_count, 2);
        assert!(alice.over_allocated);

        let bob = report.allocations.iter().find(|a| a.username == "bob").unwrap();
        assert!(!bob.over_allocated);

        let text = report.render_text();
        assert!(text.contains("alice: 110% across 2 project(s) (over-allocated)"));
        assert!(report.render_html(Some("https://skills.example.com")).contains("Platform Migration"));
    }

    #[tokio::test]
    async fn test_weekly_report_skips_inactive_and_out_of_range() {
        let test_db = create_standard_test_db().await;
        sqlx::raw_sql(
            "INSERT INTO projects (name, status) VALUES ('Paused', 'on_hold');
             INSERT INTO projects (name, status, start_date, end_date)
                VALUES ('Finished', 'active', '2020-01-01', '2020-02-01');",
        )
        .execute(&test_db.pool)
        .await
        .unwrap();

        let report = WeeklyResourceReport::generate(&test_db.pool, Utc::now().date_naive())
            .await
            .unwrap();
        let names: Vec<&str> = report.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Platform Migration"]);
        assert!(report.projects[0].resources.is_empty());
        assert!(report.render_text().contains("no resources assigned"));
    }

    #[tokio::test]
    async fn test_mailjet_mailer_posts_to_send() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Messages": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = MailjetMailer::new(MailjetCredentials {
            api_key: "key".to_string(),
            secret_key: "secret".to_string(),
            api_url: server.uri(),
        });
        let email = OutgoingEmail {
            from: "reports@example.com".to_string(),
            to: vec!["a@example.com".to_string(), "b@example.com".to_string()],
            subject: "Weekly".to_string(),
            text: "body".to_string(),
            html: "<p>body</p>".to_string(),
        };
        assert!(mailer.send(&email).await);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["Messages"][0]["From"]["Email"], "reports@example.com");
        assert_eq!(body["Messages"][0]["To"].as_array().unwrap().len(), 2);
        assert_eq!(body["Messages"][0]["Subject"], "Weekly");
    }

    #[tokio::test]
    async fn test_mailjet_mailer_reports_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let mailer = MailjetMailer::new(MailjetCredentials {
            api_key: "key".to_string(),
            secret_key: "wrong".to_string(),
            api_url: format!("{}/", server.uri()),
        });
        let email = OutgoingEmail {
            from: "reports@example.com".to_string(),
            to: vec!["a@example.com".to_string()],
            subject: "Weekly".to_string(),
            text: String::new(),
            html: String::new(),
        };
        assert!(!mailer.send(&email).await);
    }

    #[rocket::async_test]
    async fn test_send_now_falls_back_to_sales_team() {
        let mailer = RecordingMailer::delivering();
        let (client, _) = setup_test_client_with(
            create_standard_test_db().await,
            test_config(mailer.clone()),
        )
        .await;
        let admin = login_test_user(&client, "admin_user").await;

        let response = client
            .post("/api/reports/send-now")
            .header(ContentType::JSON)
            .header(bearer(&admin))
            .body(json!({}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let outcome: SendOutcome = response.into_json().await.unwrap();
        assert!(outcome.sent);
        assert_eq!(outcome.recipients, vec![SALES_TEAM.to_string()]);
        assert_eq!(outcome.projects, 1);

        let response = client
            .post("/api/reports/send-now")
            .header(ContentType::JSON)
            .header(bearer(&admin))
            .body(json!({ "recipients": "ops@example.com; cto@example.com" }).to_string())
            .dispatch()
            .await;
        let outcome: SendOutcome = response.into_json().await.unwrap();
        assert_eq!(outcome.recipients, vec!["ops@example.com", "cto@example.com"]);

        let messages = mailer.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].from, "reports@example.com");
        assert!(messages[0].subject.starts_with("Weekly resource report"));
    }

    #[rocket::async_test]
    async fn test_send_now_without_delivery_is_unavailable() {
        let (client, _) = setup_test_client_with(
            create_standard_test_db().await,
            test_config(RecordingMailer::failing()),
        )
        .await;
        let admin = login_test_user(&client, "admin_user").await;
        let alice = login_test_user(&client, "alice").await;

        let response = client
            .post("/api/reports/send-now")
            .header(bearer(&alice))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .post("/api/reports/send-now")
            .header(bearer(&admin))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::ServiceUnavailable);
    }

    #[rocket::async_test]
    async fn test_report_settings_crud() {
        let (client, _) = setup_test_client_with(
            create_standard_test_db().await,
            test_config(RecordingMailer::delivering()),
        )
        .await;
        let admin = login_test_user(&client, "admin_user").await;

        let response = client
            .post("/api/reports/settings")
            .header(ContentType::JSON)
            .header(bearer(&admin))
            .body(
                json!({
                    "name": "Weekly staffing",
                    "frequency": "weekly",
                    "day_of_week": 1,
                    "recipients": "ops@example.com",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let created: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(created["frequency"], "weekly");
        assert!(created["next_scheduled_at"].is_string());
        let id = created["id"].as_i64().unwrap();

        let response = client
            .post("/api/reports/settings")
            .header(ContentType::JSON)
            .header(bearer(&admin))
            .body(json!({ "name": "Bad", "frequency": "hourly" }).to_string())
            .dispatch()
            .await;
        assert!(response.status().code >= 400);

        let response = client
            .post("/api/reports/settings")
            .header(ContentType::JSON)
            .header(bearer(&admin))
            .body(json!({ "name": "Bad", "frequency": "weekly", "day_of_week": 9 }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let response = client
            .delete(format!("/api/reports/settings/{}", id))
            .header(bearer(&admin))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .delete(format!("/api/reports/settings/{}", id))
            .header(bearer(&admin))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[tokio::test]
    async fn test_scheduler_advances_only_delivered_reports() {
        let test_db = create_standard_test_db().await;
        let config = test_config(RecordingMailer::delivering()).reports;
        let created_at = Utc::now().naive_utc() - Duration::weeks(2);
        let setting = create_report_setting(&test_db.pool, &weekly_setting(""), created_at)
            .await
            .unwrap();
        let now = Utc::now().naive_utc();

        let failing = RecordingMailer::failing();
        let run = run_due_reports(&test_db.pool, failing.as_ref(), &config, now)
            .await
            .unwrap();
        assert_eq!((run.due, run.sent, run.failed), (1, 0, 1));
        let unchanged = get_report_setting(&test_db.pool, setting.id).await.unwrap();
        assert_eq!(unchanged.next_scheduled_at, setting.next_scheduled_at);
        assert!(unchanged.last_sent_at.is_none());
        // The empty recipient list went to the sales team.
        assert_eq!(failing.messages()[0].to, vec![SALES_TEAM.to_string()]);

        let working = RecordingMailer::delivering();
        let run = run_due_reports(&test_db.pool, working.as_ref(), &config, now)
            .await
            .unwrap();
        assert_eq!((run.due, run.sent, run.failed), (1, 1, 0));
        let advanced = get_report_setting(&test_db.pool, setting.id).await.unwrap();
        assert_eq!(advanced.last_sent_at, Some(now));
        // Next Monday, at the time of the send.
        let next = advanced.next_scheduled_at.expect("next run should be planned");
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!(next.time(), now.time());
        assert!(next > now && next <= now + Duration::weeks(1));

        // Nothing is due until next week.
        let run = run_due_reports(&test_db.pool, working.as_ref(), &config, now)
            .await
            .unwrap();
        assert_eq!(run.due, 0);
        assert_eq!(working.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_ignores_inactive_settings() {
        let test_db = create_standard_test_db().await;
        let config = test_config(RecordingMailer::delivering()).reports;
        let mut fields = weekly_setting("ops@example.com");
        fields.is_active = false;
        create_report_setting(&test_db.pool, &fields, Utc::now().naive_utc() - Duration::weeks(3))
            .await
            .unwrap();

        let mailer = RecordingMailer::delivering();
        let run = run_due_reports(&test_db.pool, mailer.as_ref(), &config, Utc::now().naive_utc())
            .await
            .unwrap();
        assert_eq!(run.due, 0);
        assert!(mailer.messages().is_empty());
    }
}
