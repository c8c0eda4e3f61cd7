#[cfg(test)]
pub mod test_db {
    use crate::auth::Role;
    use crate::database::CURRENT_SCHEMA;
    use crate::db::{
        ClientFields, NewUser, ProjectFields, SkillValues, TemplateFields, create_client,
        create_project, create_skill_template, create_user, upsert_user_skill,
    };
    use crate::error::AppError;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;
    use tracing::log::LevelFilter;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    /// Single-connection in-memory pool; every handle sees the same database.
    pub async fn memory_pool() -> Result<Pool<Sqlite>, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(pool)
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        templates: Vec<(String, String)>,
        user_skills: Vec<(String, String, String)>,
        projects: Vec<(String, Option<String>, String)>,
    }

    pub struct TestUser {
        pub username: String,
        pub role: Role,
        pub password: String,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn user(self, username: &str) -> Self {
            self.user_with_password(username, Role::User, STANDARD_PASSWORD)
        }

        pub fn admin(self, username: &str) -> Self {
            self.user_with_password(username, Role::Admin, STANDARD_PASSWORD)
        }

        pub fn super_admin(self, username: &str) -> Self {
            self.user_with_password(username, Role::SuperAdmin, STANDARD_PASSWORD)
        }

        pub fn user_with_password(mut self, username: &str, role: Role, password: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                role,
                password: password.to_string(),
            });
            self
        }

        pub fn template(mut self, name: &str, category: &str) -> Self {
            self.templates.push((name.to_string(), category.to_string()));
            self
        }

        pub fn user_skill(mut self, username: &str, template: &str, level: &str) -> Self {
            self.user_skills
                .push((username.to_string(), template.to_string(), level.to_string()));
            self
        }

        /// A project, optionally under a client created on the fly.
        pub fn project(mut self, name: &str, client: Option<&str>, status: &str) -> Self {
            self.projects.push((
                name.to_string(),
                client.map(String::from),
                status.to_string(),
            ));
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .filter_level(LevelFilter::Debug)
                    .is_test(true)
                    .try_init();
            });

            let pool = memory_pool().await?;
            sqlx::raw_sql(CURRENT_SCHEMA).execute(&pool).await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut template_id_map: HashMap<String, i64> = HashMap::new();
            let mut project_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let email = format!("{}@example.com", user.username);
                let user_id = create_user(
                    &pool,
                    NewUser {
                        username: &user.username,
                        email: &email,
                        password: &user.password,
                        role: user.role,
                        first_name: None,
                        last_name: None,
                        job_title: None,
                        location: None,
                    },
                )
                .await?;
                user_id_map.insert(user.username.clone(), user_id);
            }

            for (name, category) in &self.templates {
                let template = create_skill_template(
                    &pool,
                    &TemplateFields {
                        name: name.clone(),
                        category: category.clone(),
                        ..Default::default()
                    },
                )
                .await?;
                template_id_map.insert(name.clone(), template.id);
            }

            for (username, template, level) in &self.user_skills {
                let (Some(user_id), Some(template_id)) = (
                    user_id_map.get(username).copied(),
                    template_id_map.get(template).copied(),
                ) else {
                    continue;
                };
                let mut conn = pool.acquire().await?;
                upsert_user_skill(
                    &mut conn,
                    user_id,
                    template_id,
                    &SkillValues {
                        level,
                        certification: None,
                        credly_link: None,
                        notes: None,
                    },
                )
                .await?;
            }

            let mut client_ids: HashMap<String, i64> = HashMap::new();
            for (name, client, status) in &self.projects {
                let client_id = match client {
                    Some(client_name) => match client_ids.get(client_name) {
                        Some(id) => Some(*id),
                        None => {
                            let created = create_client(
                                &pool,
                                &ClientFields {
                                    name: client_name.clone(),
                                    industry: None,
                                    contact_name: None,
                                    contact_email: None,
                                    website: None,
                                    notes: None,
                                },
                            )
                            .await?;
                            client_ids.insert(client_name.clone(), created.id);
                            Some(created.id)
                        }
                    },
                    None => None,
                };

                let project = create_project(
                    &pool,
                    &ProjectFields {
                        name: name.clone(),
                        description: None,
                        client_id,
                        start_date: None,
                        end_date: None,
                        location: None,
                        confluence_link: None,
                        status: status.clone(),
                    },
                )
                .await?;
                project_id_map.insert(name.clone(), project.id);
            }

            Ok(TestDb {
                pool,
                user_id_map,
                template_id_map,
                project_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub template_id_map: HashMap<String, i64>,
        pub project_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn template_id(&self, name: &str) -> Option<i64> {
            self.template_id_map.get(name).copied()
        }

        pub fn project_id(&self, name: &str) -> Option<i64> {
            self.project_id_map.get(name).copied()
        }

        pub async fn user_skill_id(&self, username: &str, template: &str) -> Result<i64, sqlx::Error> {
            let user_id = self.user_id(username).ok_or(sqlx::Error::RowNotFound)?;
            let template_id = self.template_id(template).ok_or(sqlx::Error::RowNotFound)?;

            sqlx::query_scalar(
                "SELECT id FROM user_skills WHERE user_id = ? AND skill_template_id = ?",
            )
            .bind(user_id)
            .bind(template_id)
            .fetch_one(&self.pool)
            .await
        }

        pub async fn count(&self, table: &str) -> i64 {
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .unwrap_or(-1)
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use std::sync::Arc;

    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    use super::test_db::{STANDARD_PASSWORD, TestDb, TestDbBuilder};
    use crate::api::SessionPolicy;
    use crate::api::auth::LoginResponse;
    use crate::reports::{DisabledMailer, Mailer, ReportConfig};
    use crate::{AppConfig, build_rocket};

    pub const SALES_TEAM: &str = "sales@example.com";

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .user("alice")
            .user("bob")
            .admin("admin_user")
            .super_admin("root")
            .template("Rust", "Programming")
            .template("Test", "Testing")
            .template("Kubernetes", "Cloud")
            .user_skill("alice", "Rust", "expert")
            .user_skill("bob", "Kubernetes", "intermediate")
            .project("Platform Migration", Some("Acme"), "active")
            .build()
            .await
            .expect("Failed to build standard test database")
    }

    pub fn test_config(mailer: Arc<dyn Mailer>) -> AppConfig {
        AppConfig {
            session: SessionPolicy::hours(24),
            reports: ReportConfig {
                sender: "reports@example.com".to_string(),
                sales_team_email: Some(SALES_TEAM.to_string()),
            },
            mailer,
        }
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        setup_test_client_with(test_db, test_config(Arc::new(DisabledMailer))).await
    }

    pub async fn setup_test_client_with(test_db: TestDb, config: AppConfig) -> (Client, TestDb) {
        let rocket = build_rocket(test_db.pool.clone(), config);
        let client = Client::tracked(rocket)
            .await
            .expect("Failed to build rocket client");
        (client, test_db)
    }

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token))
    }

    /// Logs in with the standard password and returns the session token.
    pub async fn login_test_user(client: &Client, username: &str) -> String {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "username": username, "password": STANDARD_PASSWORD }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok, "login failed for {}", username);
        let login: LoginResponse = response
            .into_json()
            .await
            .expect("login response should be JSON");
        login.token
    }
}
