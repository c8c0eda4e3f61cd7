#[cfg(test)]
mod tests {
    use crate::db::{
        NewNotification, audit_orphans, create_notification, delete_skill_template,
        delete_unused_skill_template, endorse_skill, get_template_usage, purge_orphans,
    };
    use crate::error::AppError;
    use crate::test::test_db::{TestDb, TestDbBuilder, memory_pool};

    /// "Test" held by two users, endorsed, required by a project, with a
    /// pending change and notifications pointing at it.
    async fn test_skill_db() -> TestDb {
        let test_db = TestDbBuilder::new()
            .user("alice")
            .user("bob")
            .admin("admin_user")
            .template("Test", "Testing")
            .template("Rust", "Programming")
            .user_skill("alice", "Test", "beginner")
            .user_skill("bob", "Test", "expert")
            .user_skill("alice", "Rust", "expert")
            .project("Harness", Some("Acme"), "active")
            .build()
            .await
            .expect("Failed to build test database");

        let pool = &test_db.pool;
        let test_id = test_db.template_id("Test").unwrap();
        let alice = test_db.user_id("alice").unwrap();
        let bob = test_db.user_id("bob").unwrap();
        let alice_test = test_db.user_skill_id("alice", "Test").await.unwrap();

        endorse_skill(pool, bob, "bob", alice_test, Some("Solid"))
            .await
            .expect("Failed to endorse");

        create_notification(
            pool,
            &NewNotification {
                user_id: alice,
                kind: "achievement",
                content: "You added Test",
                related_user_skill_id: Some(alice_test),
                related_user_id: None,
            },
        )
        .await
        .expect("Failed to notify");

        sqlx::query(
            "INSERT INTO pending_skill_updates (user_id, user_skill_id, skill_template_id, level, is_update)
             VALUES (?, ?, ?, 'expert', 1)",
        )
        .bind(alice)
        .bind(alice_test)
        .bind(test_id)
        .execute(pool)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO project_skills (project_id, skill_template_id, required_level, importance)
             VALUES (?, ?, 'intermediate', 'high')",
        )
        .bind(test_db.project_id("Harness").unwrap())
        .bind(test_id)
        .execute(pool)
        .await
        .unwrap();

        test_db
    }

    #[tokio::test]
    async fn test_delete_template_removes_every_dependent() {
        let test_db = test_skill_db().await;
        let test_id = test_db.template_id("Test").unwrap();

        let usage = get_template_usage(&test_db.pool, test_id).await.unwrap();
        assert!(usage.in_use());
        assert_eq!(usage.user_skills, 2);

        let report = delete_skill_template(&test_db.pool, test_id)
            .await
            .expect("Cascade delete failed");

        assert_eq!(report.template_name, "Test");
        assert!(report.template_removed);
        // The seeded one plus the endorsement notice.
        assert_eq!(report.notifications_removed, 2);
        assert_eq!(report.endorsements_removed, 1);
        assert_eq!(report.pending_updates_removed, 1);
        assert_eq!(report.user_skills_removed, 2);
        assert_eq!(report.project_skills_removed, 1);
        assert_eq!(report.dependents_removed(), 7);

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM skill_templates WHERE name = 'Test'")
                .fetch_one(&test_db.pool)
                .await
                .unwrap();
        assert_eq!(remaining, 0);

        // Unrelated skills survive.
        assert!(test_db.user_skill_id("alice", "Rust").await.is_ok());
        assert_eq!(test_db.count("user_skills").await, 1);

        let orphans = audit_orphans(&test_db.pool).await.unwrap();
        assert_eq!(orphans.total(), 0);
    }

    #[tokio::test]
    async fn test_delete_single_holder_template() {
        let test_db = TestDbBuilder::new()
            .user("carol")
            .template("Test", "Testing")
            .user_skill("carol", "Test", "beginner")
            .project("Pilot", None, "planning")
            .build()
            .await
            .expect("Failed to build test database");
        let test_id = test_db.template_id("Test").unwrap();

        sqlx::query(
            "INSERT INTO project_skills (project_id, skill_template_id, required_level, importance)
             VALUES (?, ?, 'beginner', 'low')",
        )
        .bind(test_db.project_id("Pilot").unwrap())
        .bind(test_id)
        .execute(&test_db.pool)
        .await
        .unwrap();

        let report = delete_skill_template(&test_db.pool, test_id).await.unwrap();
        assert_eq!(report.user_skills_removed, 1);
        assert_eq!(report.project_skills_removed, 1);
        assert!(report.template_removed);
        // Only the legacy spellings are absent from the current schema.
        assert!(
            report
                .skipped
                .iter()
                .all(|s| s.ends_with(".skill_id") || s.starts_with("pending_skill_updates_v2.")),
            "unexpected skips: {:?}",
            report.skipped
        );
        assert_eq!(test_db.count("user_skills").await, 0);
        assert_eq!(test_db.count("project_skills").await, 0);
    }

    #[tokio::test]
    async fn test_delete_missing_template_is_not_found() {
        let test_db = test_skill_db().await;

        match delete_skill_template(&test_db.pool, 9999).await {
            Err(AppError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got {:?}", other),
        }

        // Nothing was touched.
        assert_eq!(test_db.count("user_skills").await, 3);
        assert_eq!(test_db.count("endorsements").await, 1);
    }

    #[tokio::test]
    async fn test_failure_mid_sequence_rolls_everything_back() {
        let test_db = test_skill_db().await;
        let pool = &test_db.pool;
        let test_id = test_db.template_id("Test").unwrap();
        let alice_test = test_db.user_skill_id("alice", "Test").await.unwrap();

        // Nothing cascades from this table, so removing alice's user skill
        // fails after the notification, endorsement and pending deletes ran.
        sqlx::raw_sql(
            "CREATE TABLE skill_badges (
                id INTEGER PRIMARY KEY,
                user_skill_id INTEGER NOT NULL REFERENCES user_skills (id)
            )",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO skill_badges (user_skill_id) VALUES (?)")
            .bind(alice_test)
            .execute(pool)
            .await
            .unwrap();

        let before: Vec<i64> = {
            let mut counts = Vec::new();
            for table in ["notifications", "endorsements", "pending_skill_updates", "user_skills", "project_skills"] {
                counts.push(test_db.count(table).await);
            }
            counts
        };
        assert!(before.iter().all(|c| *c > 0));

        match delete_skill_template(pool, test_id).await {
            Err(AppError::Database(_)) => {}
            other => panic!("Expected a database error, got {:?}", other),
        }

        let mut after = Vec::new();
        for table in ["notifications", "endorsements", "pending_skill_updates", "user_skills", "project_skills"] {
            after.push(test_db.count(table).await);
        }
        assert_eq!(after, before);

        let template: Option<String> =
            sqlx::query_scalar("SELECT name FROM skill_templates WHERE id = ?")
                .bind(test_id)
                .fetch_optional(pool)
                .await
                .unwrap();
        assert_eq!(template.as_deref(), Some("Test"));
    }

    #[tokio::test]
    async fn test_delete_unused_refuses_template_in_use() {
        let test_db = test_skill_db().await;
        let test_id = test_db.template_id("Test").unwrap();

        match delete_unused_skill_template(&test_db.pool, test_id).await {
            Err(AppError::Conflict(msg)) => {
                assert!(msg.contains("2 user skill(s)"), "unexpected message: {}", msg)
            }
            other => panic!("Expected Conflict, got {:?}", other),
        }
        assert_eq!(test_db.count("user_skills").await, 3);
        assert_eq!(test_db.count("endorsements").await, 1);

        let go_id = {
            sqlx::query("INSERT INTO skill_templates (name, category) VALUES ('Go', 'Programming')")
                .execute(&test_db.pool)
                .await
                .unwrap()
                .last_insert_rowid()
        };
        let report = delete_unused_skill_template(&test_db.pool, go_id).await.unwrap();
        assert!(report.template_removed);
        assert_eq!(report.dependents_removed(), 0);

        assert!(matches!(
            delete_unused_skill_template(&test_db.pool, 9999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_audit_on_legacy_shape_skips_user_skill_checks() {
        let pool = memory_pool().await.unwrap();
        sqlx::raw_sql(
            "CREATE TABLE skill_templates (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE user_skills (id INTEGER PRIMARY KEY, user_id INTEGER, skill_id INTEGER);
             CREATE TABLE notifications (id INTEGER PRIMARY KEY, user_id INTEGER, related_user_skill_id INTEGER);
             CREATE TABLE project_skills (id INTEGER PRIMARY KEY, project_id INTEGER, skill_template_id INTEGER);

             INSERT INTO skill_templates (id, name) VALUES (1, 'Rust');
             INSERT INTO user_skills (user_id, skill_id) VALUES (1, 1);
             INSERT INTO notifications (user_id, related_user_skill_id) VALUES (1, 1), (1, 42);
             INSERT INTO project_skills (project_id, skill_template_id) VALUES (1, 1), (2, 7);",
        )
        .execute(&pool)
        .await
        .unwrap();

        let audit = audit_orphans(&pool).await.expect("Legacy audit failed");
        assert_eq!(audit.project_skills, 1);
        assert_eq!(audit.notifications, 0);
        assert_eq!(audit.total(), 1);
        for skipped in [
            "notifications.related_user_skill_id",
            "user_skills.skill_template_id",
            "endorsements.user_skill_id",
        ] {
            assert!(
                audit.skipped.iter().any(|s| s == skipped),
                "{} should have been skipped, got {:?}",
                skipped,
                audit.skipped
            );
        }

        let purged = purge_orphans(&pool).await.expect("Legacy purge failed");
        assert_eq!(purged.total(), 1);
        let notifications: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(notifications, 2);
    }

    #[tokio::test]
    async fn test_delete_on_legacy_shape_skips_absent_references() {
        let pool = memory_pool().await.unwrap();
        sqlx::raw_sql(
            "CREATE TABLE skill_templates (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE user_skills (id INTEGER PRIMARY KEY, user_id INTEGER, skill_template_id INTEGER);
             CREATE TABLE pending_skill_updates_v2 (id INTEGER PRIMARY KEY, user_id INTEGER, skill_id INTEGER);
             CREATE TABLE project_skills (id INTEGER PRIMARY KEY, project_id INTEGER, skill_id INTEGER);
             CREATE TABLE notifications (id INTEGER PRIMARY KEY, user_id INTEGER, content TEXT);

             INSERT INTO skill_templates (id, name) VALUES (1, 'Test'), (2, 'Go');
             INSERT INTO user_skills (user_id, skill_template_id) VALUES (1, 1), (2, 1), (1, 2);
             INSERT INTO pending_skill_updates_v2 (user_id, skill_id) VALUES (1, 1), (3, 2);
             INSERT INTO project_skills (project_id, skill_id) VALUES (1, 1), (2, 1);",
        )
        .execute(&pool)
        .await
        .unwrap();

        let report = delete_skill_template(&pool, 1).await.expect("Legacy delete failed");

        assert!(report.template_removed);
        assert_eq!(report.user_skills_removed, 2);
        assert_eq!(report.pending_updates_removed, 1);
        assert_eq!(report.project_skills_removed, 2);
        assert_eq!(report.endorsements_removed, 0);

        for skipped in [
            "notifications.related_user_skill_id",
            "endorsements.user_skill_id",
            "pending_skill_updates.skill_template_id",
            "pending_skill_updates_v2.skill_template_id",
            "project_skills.skill_template_id",
        ] {
            assert!(
                report.skipped.iter().any(|s| s == skipped),
                "{} should have been skipped, got {:?}",
                skipped,
                report.skipped
            );
        }

        let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_skill_updates_v2")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(left, 1);
    }

    #[tokio::test]
    async fn test_audit_and_purge_orphans() {
        let test_db = test_skill_db().await;
        let pool = &test_db.pool;
        let test_id = test_db.template_id("Test").unwrap();

        // Simulate an old non-cascading delete.
        sqlx::raw_sql("PRAGMA foreign_keys = OFF")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM skill_templates WHERE id = ?")
            .bind(test_id)
            .execute(pool)
            .await
            .unwrap();

        let audit = audit_orphans(pool).await.unwrap();
        assert_eq!(audit.user_skills, 2);
        assert_eq!(audit.project_skills, 1);
        assert_eq!(audit.endorsements, 1);
        assert_eq!(audit.notifications, 2);
        assert_eq!(audit.pending_skill_updates, 1);
        assert_eq!(audit.total(), 7);

        let purged = purge_orphans(pool).await.unwrap();
        assert_eq!(purged.total(), audit.total());
        assert_eq!(audit_orphans(pool).await.unwrap().total(), 0);
        assert_eq!(test_db.count("user_skills").await, 1);
    }
}
