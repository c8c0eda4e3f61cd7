//! Async HTTP client for the SkillMetrics JSON API.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::api::auth::LoginResponse;
use crate::api::notifications::UnreadCount;
use crate::auth::User;
use crate::db::{
    OrphanReport, ReviewOutcome, SearchResults, SkillAnalytics, TemplateDeletion,
    UserSkillSummary,
};
use crate::models::{
    Client as ClientRecord, Notification, PendingSkillUpdate, Project, ProjectResource,
    ReportSetting, SkillTemplate, UserSkill,
};
use crate::reports::{SendOutcome, WeeklyResourceReport};

pub const AUTHENTICATION_REQUIRED: &str = "Authentication required";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Non-2xx answer; `message` is the server's own message when it sent one.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::AuthenticationRequired => Some(401),
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Deserialize)]
struct ServerError {
    message: Option<String>,
    error: Option<String>,
}

/// Typed wrapper over `/api`, carrying an optional bearer token.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn error_from(response: Response) -> ClientError {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return ClientError::AuthenticationRequired;
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ServerError>(&text)
            .ok()
            .and_then(|e| e.message.or(e.error))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });
        ClientError::Api {
            status: status.as_u16(),
            message,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> ClientResult<T> {
        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> ClientResult<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> ClientResult<T> {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send(self.request(Method::DELETE, path)).await
    }

    // Auth

    /// Stores the returned token on success. Bad credentials surface the
    /// server's message rather than the generic 401.
    pub async fn login(&mut self, username: &str, password: &str) -> ClientResult<LoginResponse> {
        let response = self
            .request(Method::POST, "/login")
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ServerError>(&text)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| AUTHENTICATION_REQUIRED.to_string());
            return Err(ClientError::Api { status, message });
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        self.token = Some(login.token.clone());
        Ok(login)
    }

    pub async fn logout(&mut self) -> ClientResult<()> {
        let _: Value = self.post("/logout", &json!({})).await?;
        self.token = None;
        Ok(())
    }

    pub async fn me(&self) -> ClientResult<User> {
        self.get("/me").await
    }

    // Users

    pub async fn users(&self) -> ClientResult<Vec<User>> {
        self.get("/users").await
    }

    pub async fn user(&self, id: i64) -> ClientResult<User> {
        self.get(&format!("/users/{}", id)).await
    }

    pub async fn user_skills_of(&self, user_id: i64) -> ClientResult<Vec<UserSkill>> {
        self.get(&format!("/users/{}/skills", user_id)).await
    }

    // Skills

    pub async fn skill_templates(&self) -> ClientResult<Vec<SkillTemplate>> {
        self.get("/skill-templates").await
    }

    pub async fn create_skill_template(&self, template: &Value) -> ClientResult<SkillTemplate> {
        self.post("/admin/skill-templates", template).await
    }

    pub async fn delete_skill_template(&self, id: i64) -> ClientResult<TemplateDeletion> {
        self.delete(&format!("/admin/skill-templates/{}", id)).await
    }

    pub async fn purge_skill_template(&self, id: i64) -> ClientResult<TemplateDeletion> {
        self.delete(&format!("/super-admin/skill-templates/{}", id)).await
    }

    pub async fn orphan_audit(&self) -> ClientResult<OrphanReport> {
        self.get("/super-admin/orphans").await
    }

    pub async fn my_skills(&self) -> ClientResult<Vec<UserSkill>> {
        self.get("/user-skills").await
    }

    pub async fn submit_skill_update(
        &self,
        skill_template_id: i64,
        level: &str,
        certification: Option<&str>,
        notes: Option<&str>,
    ) -> ClientResult<PendingSkillUpdate> {
        self.post(
            "/skill-updates",
            &json!({
                "skill_template_id": skill_template_id,
                "level": level,
                "certification": certification,
                "notes": notes,
            }),
        )
        .await
    }

    pub async fn pending_updates(&self) -> ClientResult<Vec<PendingSkillUpdate>> {
        self.get("/admin/skill-updates").await
    }

    pub async fn approve_update(&self, id: i64, notes: Option<&str>) -> ClientResult<ReviewOutcome> {
        self.post(&format!("/admin/skill-updates/{}/approve", id), &json!({ "notes": notes }))
            .await
    }

    pub async fn reject_update(&self, id: i64, notes: Option<&str>) -> ClientResult<ReviewOutcome> {
        self.post(&format!("/admin/skill-updates/{}/reject", id), &json!({ "notes": notes }))
            .await
    }

    // Projects and clients

    pub async fn projects(&self) -> ClientResult<Vec<Project>> {
        self.get("/projects").await
    }

    pub async fn project_resources(&self, project_id: i64) -> ClientResult<Vec<ProjectResource>> {
        self.get(&format!("/projects/{}/resources", project_id)).await
    }

    pub async fn clients(&self) -> ClientResult<Vec<ClientRecord>> {
        self.get("/clients").await
    }

    // Notifications

    pub async fn notifications(&self, unread_only: bool) -> ClientResult<Vec<Notification>> {
        self.get(&format!("/notifications?unread={}", unread_only)).await
    }

    pub async fn unread_count(&self) -> ClientResult<i64> {
        let count: UnreadCount = self.get("/notifications/unread-count").await?;
        Ok(count.count)
    }

    pub async fn mark_notification_read(&self, id: i64) -> ClientResult<()> {
        let _: Value = self.put(&format!("/notifications/{}/read", id), &json!({})).await?;
        Ok(())
    }

    pub async fn mark_all_notifications_read(&self) -> ClientResult<()> {
        let _: Value = self.put("/notifications/read-all", &json!({})).await?;
        Ok(())
    }

    // Analytics, search and reports

    pub async fn skill_analytics(&self) -> ClientResult<SkillAnalytics> {
        self.get("/analytics/skills").await
    }

    pub async fn user_analytics(&self, user_id: i64) -> ClientResult<UserSkillSummary> {
        self.get(&format!("/analytics/users/{}", user_id)).await
    }

    pub async fn search(&self, query: &str) -> ClientResult<SearchResults> {
        let req = self.request(Method::GET, "/search").query(&[("q", query)]);
        self.send(req).await
    }

    pub async fn report_settings(&self) -> ClientResult<Vec<ReportSetting>> {
        self.get("/reports/settings").await
    }

    pub async fn weekly_resource_report(&self) -> ClientResult<WeeklyResourceReport> {
        self.get("/reports/weekly-resource").await
    }

    pub async fn send_report_now(&self, setting_id: Option<i64>) -> ClientResult<SendOutcome> {
        self.post("/reports/send-now", &json!({ "setting_id": setting_id }))
            .await
    }
}
