use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use super::Success;
use crate::auth::{Permission, User};
use crate::db::{
    ReportSettingFields, create_report_setting, delete_report_setting, get_report_setting,
    get_report_settings, update_report_setting,
};
use crate::error::AppError;
use crate::models::{ReportFrequency, ReportSetting, split_recipients};
use crate::reports::{Mailer, ReportConfig, SendOutcome, WeeklyResourceReport, send_weekly_report};
use crate::validation::{ValidatedJson, validate_recipient_list};

#[derive(Debug, Deserialize, Validate)]
pub struct ReportSettingRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    pub frequency: ReportFrequency,
    pub day_of_week: Option<i64>,
    pub day_of_month: Option<i64>,
    #[serde(default)]
    #[validate(custom(function = "validate_recipient_list"))]
    pub recipients: String,
    #[validate(url(message = "Base URL must be a URL"))]
    pub base_url: Option<String>,
    pub is_active: Option<bool>,
}

impl From<ReportSettingRequest> for ReportSettingFields {
    fn from(r: ReportSettingRequest) -> Self {
        Self {
            name: r.name,
            frequency: r.frequency,
            day_of_week: r.day_of_week,
            day_of_month: r.day_of_month,
            recipients: r.recipients,
            base_url: r.base_url,
            is_active: r.is_active.unwrap_or(true),
        }
    }
}

/// Either a stored setting or an explicit recipient list; neither means
/// the sales team fallback.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct SendNowRequest {
    pub setting_id: Option<i64>,
    #[validate(custom(function = "validate_recipient_list"))]
    pub recipients: Option<String>,
    pub base_url: Option<String>,
}

#[get("/reports/settings")]
pub async fn api_get_report_settings(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ReportSetting>>, AppError> {
    user.require_permission(Permission::ManageReports)?;
    Ok(Json(get_report_settings(db).await?))
}

#[post("/reports/settings", data = "<request>")]
pub async fn api_create_report_setting(
    request: Json<ReportSettingRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<ReportSetting>>, AppError> {
    user.require_permission(Permission::ManageReports)?;
    let fields = ReportSettingFields::from(request.validated()?);
    let setting = create_report_setting(db, &fields, Utc::now().naive_utc()).await?;
    Ok(Custom(Status::Created, Json(setting)))
}

#[put("/reports/settings/<id>", data = "<request>")]
pub async fn api_update_report_setting(
    id: i64,
    request: Json<ReportSettingRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ReportSetting>, AppError> {
    user.require_permission(Permission::ManageReports)?;
    let fields = ReportSettingFields::from(request.validated()?);
    Ok(Json(
        update_report_setting(db, id, &fields, Utc::now().naive_utc()).await?,
    ))
}

#[delete("/reports/settings/<id>")]
pub async fn api_delete_report_setting(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Success>, AppError> {
    user.require_permission(Permission::ManageReports)?;
    delete_report_setting(db, id).await?;
    Ok(Json(Success::ok()))
}

#[get("/reports/weekly-resource?<date>")]
pub async fn api_weekly_resource_report(
    date: Option<&str>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<WeeklyResourceReport>, AppError> {
    user.require_permission(Permission::ManageReports)?;
    let day = match date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| AppError::Validation(format!("Invalid date: {}", raw)))?,
        None => Utc::now().date_naive(),
    };
    Ok(Json(WeeklyResourceReport::generate(db, day).await?))
}

#[post("/reports/send-now", data = "<request>")]
pub async fn api_send_report_now(
    request: Option<Json<SendNowRequest>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    mailer: &State<Arc<dyn Mailer>>,
    config: &State<ReportConfig>,
) -> Result<Json<SendOutcome>, AppError> {
    user.require_permission(Permission::ManageReports)?;
    let request = match request {
        Some(request) => request.validated()?,
        None => SendNowRequest::default(),
    };

    let (recipients, base_url) = match (request.recipients, request.setting_id) {
        (Some(explicit), _) if !split_recipients(&explicit).is_empty() => {
            (split_recipients(&explicit), request.base_url)
        }
        (_, Some(setting_id)) => {
            let setting = get_report_setting(db, setting_id).await?;
            (
                setting.recipient_list(),
                request.base_url.or(setting.base_url),
            )
        }
        _ => (Vec::new(), request.base_url),
    };

    let outcome = send_weekly_report(
        db,
        mailer.inner().as_ref(),
        config,
        &recipients,
        base_url.as_deref(),
        Utc::now().date_naive(),
    )
    .await?;

    if !outcome.sent {
        return Err(AppError::ExternalService(
            "The report could not be delivered".to_string(),
        ));
    }
    Ok(Json(outcome))
}
