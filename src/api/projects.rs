use chrono::NaiveDate;
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
    ClientFields, ProjectFields, ResourceFields, add_project_resource, add_project_skill,
    create_client, create_project, delete_client, delete_project, get_client, get_clients,
    get_project, get_project_resources, get_project_skills, get_projects, get_resource_history,
    remove_project_resource, remove_project_skill, update_client, update_project,
    update_project_resource,
};
use crate::error::AppError;
use crate::models::{Client, Project, ProjectResource, ProjectResourceHistory, ProjectSkill};
use crate::validation::{ValidatedJson, validate_importance, validate_skill_level};

#[derive(Debug, Deserialize, Validate)]
pub struct ClientRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub industry: Option<String>,
    pub contact_name: Option<String>,
    #[validate(email(message = "Contact email must be an email address"))]
    pub contact_email: Option<String>,
    #[validate(url(message = "Website must be a URL"))]
    pub website: Option<String>,
    pub notes: Option<String>,
}

impl From<ClientRequest> for ClientFields {
    fn from(r: ClientRequest) -> Self {
        Self {
            name: r.name,
            industry: r.industry,
            contact_name: r.contact_name,
            contact_email: r.contact_email,
            website: r.website,
            notes: r.notes,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
    pub client_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub location: Option<String>,
    #[validate(url(message = "Confluence link must be a URL"))]
    pub confluence_link: Option<String>,
    pub status: Option<String>,
}

impl From<ProjectRequest> for ProjectFields {
    fn from(r: ProjectRequest) -> Self {
        Self {
            name: r.name,
            description: r.description,
            client_id: r.client_id,
            start_date: r.start_date,
            end_date: r.end_date,
            location: r.location,
            confluence_link: r.confluence_link,
            status: r.status.unwrap_or_else(|| "planning".to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProjectSkillRequest {
    pub skill_template_id: i64,
    #[validate(custom(function = "validate_skill_level"))]
    pub required_level: String,
    #[validate(custom(function = "validate_importance"))]
    pub importance: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResourceRequest {
    pub user_id: i64,
    #[validate(length(min = 1, max = 100, message = "Role is required"))]
    pub role: String,
    #[validate(range(min = 0, max = 100, message = "Allocation must be between 0 and 100"))]
    pub allocation: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl From<ResourceRequest> for ResourceFields {
    fn from(r: ResourceRequest) -> Self {
        Self {
            user_id: r.user_id,
            role: r.role,
            allocation: r.allocation.unwrap_or(100),
            start_date: r.start_date,
            end_date: r.end_date,
            notes: r.notes,
        }
    }
}

#[get("/clients")]
pub async fn api_get_clients(user: User, db: &State<Pool<Sqlite>>) -> Result<Json<Vec<Client>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_clients(db).await?))
}

#[get("/clients/<id>")]
pub async fn api_get_client(id: i64, user: User, db: &State<Pool<Sqlite>>) -> Result<Json<Client>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_client(db, id).await?))
}

#[post("/clients", data = "<request>")]
pub async fn api_create_client(
    request: Json<ClientRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Client>>, AppError> {
    user.require_permission(Permission::ManageClients)?;
    let fields = ClientFields::from(request.validated()?);
    Ok(Custom(Status::Created, Json(create_client(db, &fields).await?)))
}

#[put("/clients/<id>", data = "<request>")]
pub async fn api_update_client(
    id: i64,
    request: Json<ClientRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Client>, AppError> {
    user.require_permission(Permission::ManageClients)?;
    let fields = ClientFields::from(request.validated()?);
    Ok(Json(update_client(db, id, &fields).await?))
}

#[delete("/clients/<id>")]
pub async fn api_delete_client(id: i64, user: User, db: &State<Pool<Sqlite>>) -> Result<Json<Success>, AppError> {
    user.require_permission(Permission::ManageClients)?;
    delete_client(db, id).await?;
    Ok(Json(Success::ok()))
}

#[get("/projects?<status>")]
pub async fn api_get_projects(
    status: Option<&str>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Project>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_projects(db, status).await?))
}

#[get("/projects/<id>")]
pub async fn api_get_project(id: i64, user: User, db: &State<Pool<Sqlite>>) -> Result<Json<Project>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_project(db, id).await?))
}

#[post("/projects", data = "<request>")]
pub async fn api_create_project(
    request: Json<ProjectRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Project>>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    let fields = ProjectFields::from(request.validated()?);
    Ok(Custom(Status::Created, Json(create_project(db, &fields).await?)))
}

#[put("/projects/<id>", data = "<request>")]
pub async fn api_update_project(
    id: i64,
    request: Json<ProjectRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Project>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    let fields = ProjectFields::from(request.validated()?);
    Ok(Json(update_project(db, id, &fields).await?))
}

#[delete("/projects/<id>")]
pub async fn api_delete_project(id: i64, user: User, db: &State<Pool<Sqlite>>) -> Result<Json<Success>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    delete_project(db, id).await?;
    Ok(Json(Success::ok()))
}

#[get("/projects/<id>/skills")]
pub async fn api_get_project_skills(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ProjectSkill>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    get_project(db, id).await?;
    Ok(Json(get_project_skills(db, id).await?))
}

#[post("/projects/<id>/skills", data = "<request>")]
pub async fn api_add_project_skill(
    id: i64,
    request: Json<ProjectSkillRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<ProjectSkill>>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    let request = request.validated()?;
    let skill = add_project_skill(
        db,
        id,
        request.skill_template_id,
        &request.required_level,
        &request.importance,
    )
    .await?;
    Ok(Custom(Status::Created, Json(skill)))
}

#[delete("/projects/<id>/skills/<project_skill_id>")]
pub async fn api_remove_project_skill(
    id: i64,
    project_skill_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Success>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    remove_project_skill(db, id, project_skill_id).await?;
    Ok(Json(Success::ok()))
}

#[get("/projects/<id>/resources")]
pub async fn api_get_project_resources(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ProjectResource>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    get_project(db, id).await?;
    Ok(Json(get_project_resources(db, id).await?))
}

#[post("/projects/<id>/resources", data = "<request>")]
pub async fn api_add_project_resource(
    id: i64,
    request: Json<ResourceRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<ProjectResource>>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    let fields = ResourceFields::from(request.validated()?);
    let resource = add_project_resource(db, id, &fields, user.id).await?;
    Ok(Custom(Status::Created, Json(resource)))
}

#[put("/projects/<id>/resources", data = "<request>")]
pub async fn api_update_project_resource(
    id: i64,
    request: Json<ResourceRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ProjectResource>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    let fields = ResourceFields::from(request.validated()?);
    Ok(Json(update_project_resource(db, id, &fields, user.id).await?))
}

#[delete("/projects/<id>/resources/<user_id>")]
pub async fn api_remove_project_resource(
    id: i64,
    user_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Success>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    remove_project_resource(db, id, user_id, user.id).await?;
    Ok(Json(Success::ok()))
}

#[get("/projects/<id>/resource-history")]
pub async fn api_get_resource_history(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ProjectResourceHistory>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    get_project(db, id).await?;
    Ok(Json(get_resource_history(db, id).await?))
}
