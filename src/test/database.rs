#[cfg(test)]
mod migrations {
    use crate::database::{CURRENT_SCHEMA, SchemaConverger, converge_schema, normalize_sql};
    use crate::error::AppError;
    use crate::test::test_db::memory_pool;
    use sqlx::{Pool, Row, Sqlite};

    const SKILLS_SCHEMA: &str = r#"
        CREATE TABLE skill_templates (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE user_skills (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            skill_template_id INTEGER NOT NULL,
            FOREIGN KEY (skill_template_id) REFERENCES skill_templates (id)
        );
    "#;

    const SKILLS_WITH_LEVEL_SCHEMA: &str = r#"
        CREATE TABLE skill_templates (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE user_skills (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            skill_template_id INTEGER NOT NULL,
            level TEXT,
            FOREIGN KEY (skill_template_id) REFERENCES skill_templates (id)
        );

        CREATE INDEX idx_user_skills_template ON user_skills (skill_template_id);
    "#;

    const TEMPLATES_ONLY_SCHEMA: &str = r#"
        CREATE TABLE skill_templates (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );
    "#;

    async fn table_names(pool: &Pool<Sqlite>) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .expect("Failed to fetch table names")
    }

    #[tokio::test]
    async fn test_current_schema_on_fresh_database() {
        let pool = memory_pool().await.unwrap();

        let changed = converge_schema(pool.clone(), CURRENT_SCHEMA, false)
            .await
            .expect("Fresh migration failed");
        assert!(changed);

        let tables = table_names(&pool).await;
        for expected in [
            "users",
            "user_sessions",
            "skill_templates",
            "user_skills",
            "pending_skill_updates",
            "endorsements",
            "notifications",
            "projects",
            "project_resources",
            "project_resource_histories",
            "report_settings",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {}", expected);
        }

        let again = converge_schema(pool.clone(), CURRENT_SCHEMA, false)
            .await
            .expect("Second run failed");
        assert!(!again, "Re-running the same schema should be a no-op");

        let fk: i64 = sqlx::query("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get(0);
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_added_column_keeps_rows() {
        let pool = memory_pool().await.unwrap();
        sqlx::raw_sql(SKILLS_SCHEMA).execute(&pool).await.unwrap();
        sqlx::raw_sql(
            "INSERT INTO skill_templates (id, name) VALUES (1, 'Rust');
             INSERT INTO user_skills (user_id, skill_template_id) VALUES (7, 1);",
        )
        .execute(&pool)
        .await
        .unwrap();

        let changed = converge_schema(pool.clone(), SKILLS_WITH_LEVEL_SCHEMA, false)
            .await
            .expect("Additive migration failed");
        assert!(changed);

        let row = sqlx::query("SELECT user_id, level FROM user_skills")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("user_id"), 7);
        assert!(row.get::<Option<String>, _>("level").is_none());

        let index: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name = 'idx_user_skills_template'",
        )
        .fetch_optional(&pool)
        .await
        .unwrap();
        assert!(index.is_some());
    }

    #[tokio::test]
    async fn test_destructive_change_needs_permission() {
        let pool = memory_pool().await.unwrap();
        sqlx::raw_sql(SKILLS_SCHEMA).execute(&pool).await.unwrap();

        let refused = converge_schema(pool.clone(), TEMPLATES_ONLY_SCHEMA, false).await;
        assert!(refused.is_err(), "Dropping a table must be refused by default");
        assert_eq!(table_names(&pool).await, vec!["skill_templates", "user_skills"]);

        let allowed = converge_schema(pool.clone(), TEMPLATES_ONLY_SCHEMA, true)
            .await
            .expect("Permitted drop failed");
        assert!(allowed);
        assert_eq!(table_names(&pool).await, vec!["skill_templates"]);
    }

    #[tokio::test]
    async fn test_plan_leaves_database_untouched() {
        let pool = memory_pool().await.unwrap();
        sqlx::raw_sql(SKILLS_SCHEMA).execute(&pool).await.unwrap();

        let converger = SchemaConverger::new(pool.clone(), SKILLS_WITH_LEVEL_SCHEMA, false);
        let plan = converger.plan().await.expect("Planning failed");
        assert!(!plan.is_empty());
        assert!(!plan.is_destructive());
        assert!(plan.create_tables.is_empty());
        assert_eq!(plan.create_indexes, vec!["idx_user_skills_template"]);
        assert_eq!(plan.rebuild_tables.len(), 1);
        assert_eq!(plan.rebuild_tables[0].table, "user_skills");
        assert_eq!(plan.rebuild_tables[0].added_columns, vec!["level"]);

        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('user_skills')")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(!columns.contains(&"level".to_string()));

        let planned_again = SchemaConverger::new(pool, SKILLS_SCHEMA, false)
            .plan()
            .await
            .unwrap();
        assert!(planned_again.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_target_schema_is_rejected() {
        let pool = memory_pool().await.unwrap();
        let result = converge_schema(pool, "CREATE TABLE (", false).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[test]
    fn test_normalize_sql() {
        assert_eq!(
            normalize_sql("CREATE TABLE IF NOT EXISTS skills( -- comment\n  id INTEGER );"),
            "CREATE TABLE skills(id INTEGER)"
        );
        assert_eq!(
            normalize_sql("CREATE TABLE \"quoted\"(id INTEGER)"),
            "CREATE TABLE quoted(id INTEGER)"
        );
    }
}

#[cfg(test)]
mod backfill {
    use crate::database::{BackfillOutcome, legacy_backfills, run_backfills};
    use crate::test::test_db::memory_pool;
    use sqlx::{Pool, Sqlite};

    /// v1 shape: `skill_id` everywhere, `recipient_email`/`active` on reports,
    /// no endorsements table.
    const LEGACY_SCHEMA: &str = r#"
        CREATE TABLE skill_categories (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
        CREATE TABLE skill_templates (id INTEGER PRIMARY KEY, name TEXT NOT NULL, category TEXT NOT NULL);
        CREATE TABLE user_skills (
            id INTEGER PRIMARY KEY, user_id INTEGER, skill_template_id INTEGER, notes TEXT
        );
        CREATE TABLE pending_skill_updates (id INTEGER PRIMARY KEY, user_id INTEGER, skill_id INTEGER);
        CREATE TABLE project_skills (id INTEGER PRIMARY KEY, project_id INTEGER, skill_id INTEGER);
        CREATE TABLE notifications (id INTEGER PRIMARY KEY, user_id INTEGER, content TEXT);
        CREATE TABLE report_settings (
            id INTEGER PRIMARY KEY, name TEXT, recipient_email TEXT, active BOOLEAN
        );

        INSERT INTO skill_categories (id, name) VALUES (1, 'Programming');
        INSERT INTO skill_templates (id, name, category) VALUES (1, 'Rust', 'Programming'), (2, 'Scrum', 'Process');
        INSERT INTO user_skills (id, user_id, skill_template_id, notes) VALUES (10, 1, 1, 'daily use');
        INSERT INTO pending_skill_updates (user_id, skill_id) VALUES (1, 1), (2, 2);
        INSERT INTO project_skills (project_id, skill_id) VALUES (1, 1);
        INSERT INTO report_settings (name, recipient_email, active) VALUES ('Weekly', 'a@x.com,b@x.com', 1);
    "#;

    fn find<'a>(outcomes: &'a [BackfillOutcome], table: &str, column: &str) -> &'a BackfillOutcome {
        outcomes
            .iter()
            .find(|o| o.table == table && o.column == column)
            .unwrap_or_else(|| panic!("no outcome for {}.{}", table, column))
    }

    async fn legacy_pool() -> Pool<Sqlite> {
        let pool = memory_pool().await.unwrap();
        sqlx::raw_sql(LEGACY_SCHEMA).execute(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_backfills_fold_legacy_columns() {
        let pool = legacy_pool().await;
        let outcomes = run_backfills(&pool, &legacy_backfills()).await.expect("Backfill failed");

        let category = find(&outcomes, "skill_templates", "category_id");
        assert!(category.added);
        assert_eq!(category.rows_backfilled, 1);

        let pending = find(&outcomes, "pending_skill_updates", "skill_template_id");
        assert!(pending.added);
        assert_eq!(pending.rows_backfilled, 2);

        // Only user 1 actually holds the skill they asked about.
        let linked = find(&outcomes, "pending_skill_updates", "user_skill_id");
        assert_eq!(linked.rows_backfilled, 1);

        assert_eq!(find(&outcomes, "project_skills", "skill_template_id").rows_backfilled, 1);
        assert_eq!(find(&outcomes, "report_settings", "recipients").rows_backfilled, 1);
        assert_eq!(find(&outcomes, "report_settings", "is_active").rows_backfilled, 1);
        assert_eq!(find(&outcomes, "user_skills", "description").rows_backfilled, 1);

        let endorsements = find(&outcomes, "endorsements", "user_skill_id");
        assert!(!endorsements.added);
        assert!(endorsements.skipped.is_some());

        let recipients: String = sqlx::query_scalar("SELECT recipients FROM report_settings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(recipients, "a@x.com,b@x.com");

        let link: Option<i64> = sqlx::query_scalar(
            "SELECT user_skill_id FROM pending_skill_updates WHERE user_id = 1",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(link, Some(10));
    }

    #[tokio::test]
    async fn test_backfills_are_idempotent() {
        let pool = legacy_pool().await;
        run_backfills(&pool, &legacy_backfills()).await.expect("First run failed");

        let second = run_backfills(&pool, &legacy_backfills()).await.expect("Second run failed");
        for outcome in &second {
            assert!(!outcome.added, "{}.{} added twice", outcome.table, outcome.column);
            assert_eq!(
                outcome.rows_backfilled, 0,
                "{}.{} changed rows on the second run",
                outcome.table, outcome.column
            );
        }
    }
}

#[cfg(test)]
mod compare {
    use crate::database::{CURRENT_SCHEMA, compare_snapshots, snapshot_schema_sql};

    const LEGACY: &str = r#"
        CREATE TABLE skill_templates (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
        CREATE TABLE pending_skill_updates_v2 (id INTEGER PRIMARY KEY, skill_id INTEGER);
        CREATE TABLE project_skills (id INTEGER PRIMARY KEY, skill_id INTEGER);
    "#;

    const CURRENT: &str = r#"
        CREATE TABLE skill_templates (id INTEGER PRIMARY KEY, name TEXT);
        CREATE TABLE project_skills (
            id INTEGER PRIMARY KEY,
            skill_id INTEGER,
            skill_template_id INTEGER REFERENCES skill_templates (id)
        );
        CREATE INDEX idx_project_skills_template ON project_skills (skill_template_id);
    "#;

    #[tokio::test]
    async fn test_compare_reports_tables_columns_and_indexes() {
        let left = snapshot_schema_sql(LEGACY).await.unwrap();
        let right = snapshot_schema_sql(CURRENT).await.unwrap();

        let diff = compare_snapshots("legacy", &left, "current", &right);

        assert_eq!(diff.tables_only_in_left, vec!["pending_skill_updates_v2"]);
        assert!(diff.tables_only_in_right.is_empty());
        assert!(diff.is_destructive());

        let templates = diff
            .table_diffs
            .iter()
            .find(|t| t.table == "skill_templates")
            .expect("skill_templates should differ");
        assert_eq!(templates.nullability_changes.len(), 1);

        let project_skills = diff
            .table_diffs
            .iter()
            .find(|t| t.table == "project_skills")
            .expect("project_skills should differ");
        assert_eq!(project_skills.columns_only_in_right, vec!["skill_template_id"]);
        assert_eq!(project_skills.foreign_keys_only_in_right.len(), 1);
        assert_eq!(project_skills.indexes_only_in_right, vec!["idx_project_skills_template"]);

        let rendered = diff.to_string();
        assert!(rendered.contains("Table only in legacy: pending_skill_updates_v2"));
        assert!(rendered.contains("Column only in current: skill_template_id"));
    }

    #[tokio::test]
    async fn test_identical_schemas_have_no_diff() {
        let left = snapshot_schema_sql(CURRENT_SCHEMA).await.unwrap();
        let right = snapshot_schema_sql(CURRENT_SCHEMA).await.unwrap();

        let diff = compare_snapshots("a", &left, "b", &right);
        assert!(diff.is_empty());
        assert!(!diff.is_destructive());
    }
}
