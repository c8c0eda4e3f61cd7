pub mod admin;
pub mod analytics;
pub mod auth;
pub mod notifications;
pub mod projects;
pub mod reports;
pub mod skills;
pub mod users;

use rocket::Route;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Success {
    pub success: bool,
}

impl Success {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// How long a login session stays valid.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub ttl: chrono::Duration,
}

impl SessionPolicy {
    pub fn hours(hours: i64) -> Self {
        Self {
            ttl: chrono::Duration::hours(hours),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
}

#[get("/health")]
pub fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Everything mounted under `/api`.
pub fn routes() -> Vec<Route> {
    routes![
        health,
        auth::api_login,
        auth::api_logout,
        auth::api_me,
        auth::api_update_profile,
        auth::api_change_password,
        users::api_get_users,
        users::api_get_user,
        users::api_get_user_skills,
        users::api_get_user_endorsements,
        users::api_get_user_projects,
        users::api_register_user,
        users::api_update_user,
        skills::api_get_categories,
        skills::api_create_category,
        skills::api_get_subcategories,
        skills::api_create_subcategory,
        skills::api_get_skill_templates,
        skills::api_get_skill_template,
        skills::api_get_template_holders,
        skills::api_get_my_skills,
        skills::api_get_user_skill,
        skills::api_delete_user_skill,
        skills::api_submit_skill_update,
        skills::api_get_my_skill_updates,
        skills::api_get_endorsements,
        skills::api_endorse_skill,
        admin::api_create_skill_template,
        admin::api_update_skill_template,
        admin::api_delete_skill_template,
        admin::api_purge_skill_template,
        admin::api_audit_orphans,
        admin::api_purge_orphans,
        admin::api_get_pending_updates,
        admin::api_get_pending_update,
        admin::api_approve_skill_update,
        admin::api_reject_skill_update,
        projects::api_get_clients,
        projects::api_get_client,
        projects::api_create_client,
        projects::api_update_client,
        projects::api_delete_client,
        projects::api_get_projects,
        projects::api_get_project,
        projects::api_create_project,
        projects::api_update_project,
        projects::api_delete_project,
        projects::api_get_project_skills,
        projects::api_add_project_skill,
        projects::api_remove_project_skill,
        projects::api_get_project_resources,
        projects::api_add_project_resource,
        projects::api_update_project_resource,
        projects::api_remove_project_resource,
        projects::api_get_resource_history,
        notifications::api_get_notifications,
        notifications::api_unread_count,
        notifications::api_mark_notification_read,
        notifications::api_mark_all_read,
        analytics::api_skill_analytics,
        analytics::api_user_analytics,
        analytics::api_search,
        reports::api_get_report_settings,
        reports::api_create_report_setting,
        reports::api_update_report_setting,
        reports::api_delete_report_setting,
        reports::api_weekly_resource_report,
        reports::api_send_report_now,
    ]
}
