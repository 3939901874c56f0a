use actix_web::{delete, get, post, put, web, HttpResponse};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::json;

use common::{
    entities::user::PublicUser,
    error::{self, AddCode},
};

use crate::{
    extractors::{require_admin, AuthUser},
    repositories::{
        message::MessageRepository, project::ProjectRepository, user::UserRepository,
    },
    service::{
        message::{MessageService, PostMessage},
        project::{CreateProject, ProjectChange, ProjectService},
    },
};

use super::ApiResponse;

fn parse_id(raw: &str) -> error::Result<ObjectId> {
    ObjectId::parse_str(raw).map_err(|_| anyhow::anyhow!("Ungültige ID").code(400))
}

fn project_service(
    users: &web::Data<UserRepository>,
    projects: &web::Data<ProjectRepository>,
    messages: &web::Data<MessageRepository>,
) -> ProjectService {
    ProjectService::new(
        users.get_ref().clone(),
        projects.get_ref().clone(),
        messages.get_ref().clone(),
    )
}

#[get("/api/dashboard")]
pub async fn overview(
    user: AuthUser,
    users: web::Data<UserRepository>,
    projects: web::Data<ProjectRepository>,
    messages: web::Data<MessageRepository>,
) -> error::Result<HttpResponse> {
    let service = project_service(&users, &projects, &messages);
    let dashboard_stats = service.stats_for(&user.0).await?;
    let recent = service.list_for(&user.0).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "user": PublicUser::from(user.0),
            "stats": dashboard_stats,
            "recentProjects": recent.into_iter().take(5).collect::<Vec<_>>(),
        },
    })))
}

#[get("/api/dashboard/stats")]
pub async fn stats(
    user: AuthUser,
    users: web::Data<UserRepository>,
    projects: web::Data<ProjectRepository>,
    messages: web::Data<MessageRepository>,
) -> error::Result<HttpResponse> {
    let stats = project_service(&users, &projects, &messages)
        .stats_for(&user.0)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(stats)))
}

#[get("/api/dashboard/projects")]
pub async fn list_projects(
    user: AuthUser,
    users: web::Data<UserRepository>,
    projects: web::Data<ProjectRepository>,
    messages: web::Data<MessageRepository>,
) -> error::Result<HttpResponse> {
    let list = project_service(&users, &projects, &messages)
        .list_for(&user.0)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(list)))
}

#[get("/api/dashboard/projects/{id}")]
pub async fn get_project(
    user: AuthUser,
    path: web::Path<String>,
    users: web::Data<UserRepository>,
    projects: web::Data<ProjectRepository>,
    messages: web::Data<MessageRepository>,
) -> error::Result<HttpResponse> {
    let id = parse_id(&path)?;
    let project = project_service(&users, &projects, &messages)
        .find_for(&user.0, &id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(project)))
}

#[post("/api/dashboard/projects")]
pub async fn create_project(
    user: AuthUser,
    data: web::Json<CreateProject>,
    users: web::Data<UserRepository>,
    projects: web::Data<ProjectRepository>,
    messages: web::Data<MessageRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let project = project_service(&users, &projects, &messages)
        .create(&user.0, data.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok_with_message("Projekt erstellt", project)))
}

#[put("/api/dashboard/projects/{id}")]
pub async fn update_project(
    user: AuthUser,
    path: web::Path<String>,
    data: web::Json<ProjectChange>,
    users: web::Data<UserRepository>,
    projects: web::Data<ProjectRepository>,
    messages: web::Data<MessageRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let id = parse_id(&path)?;
    let project = project_service(&users, &projects, &messages)
        .update(&user.0, &id, data.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(project)))
}

#[delete("/api/dashboard/projects/{id}")]
pub async fn delete_project(
    user: AuthUser,
    path: web::Path<String>,
    users: web::Data<UserRepository>,
    projects: web::Data<ProjectRepository>,
    messages: web::Data<MessageRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let id = parse_id(&path)?;
    project_service(&users, &projects, &messages)
        .deactivate(&user.0, &id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Projekt archiviert")))
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
}

#[get("/api/dashboard/messages")]
pub async fn list_messages(
    user: AuthUser,
    query: web::Query<MessageQuery>,
    projects: web::Data<ProjectRepository>,
    messages: web::Data<MessageRepository>,
) -> error::Result<HttpResponse> {
    let project_id = match &query.project_id {
        Some(raw) => Some(parse_id(raw)?),
        None => None,
    };
    let list = MessageService::new(projects.get_ref().clone(), messages.get_ref().clone())
        .list(&user.0, project_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(list)))
}

#[post("/api/dashboard/messages")]
pub async fn post_message(
    user: AuthUser,
    data: web::Json<PostMessage>,
    projects: web::Data<ProjectRepository>,
    messages: web::Data<MessageRepository>,
) -> error::Result<HttpResponse> {
    let message = MessageService::new(projects.get_ref().clone(), messages.get_ref().clone())
        .post(&user.0, data.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(message)))
}

#[put("/api/dashboard/messages/{id}/read")]
pub async fn mark_message_read(
    user: AuthUser,
    path: web::Path<String>,
    projects: web::Data<ProjectRepository>,
    messages: web::Data<MessageRepository>,
) -> error::Result<HttpResponse> {
    let id = parse_id(&path)?;
    let message = MessageService::new(projects.get_ref().clone(), messages.get_ref().clone())
        .mark_read(&user.0, &id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(message)))
}

#[get("/api/dashboard/customers")]
pub async fn list_customers(
    user: AuthUser,
    users: web::Data<UserRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let customers = users.customers_of(&user.0.id).await?;
    let customers: Vec<PublicUser> = customers.into_iter().map(PublicUser::from).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::ok(customers)))
}

#[derive(Debug, Deserialize)]
pub struct ProfileChange {
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub avatar: Option<String>,
}

#[put("/api/dashboard/profile")]
pub async fn update_profile(
    user: AuthUser,
    data: web::Json<ProfileChange>,
    users: web::Data<UserRepository>,
) -> error::Result<HttpResponse> {
    let mut user = user.0;
    let data = data.into_inner();
    if let Some(first_name) = data.first_name {
        user.first_name = Some(first_name);
    }
    if let Some(last_name) = data.last_name {
        user.last_name = Some(last_name);
    }
    if let Some(company) = data.company {
        user.company = Some(company);
    }
    if let Some(avatar) = data.avatar {
        user.avatar = Some(avatar);
    }
    users.update(&user).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(PublicUser::from(user))))
}
