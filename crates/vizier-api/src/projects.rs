//! Project routes: thin HTTP wrapper over the Project Cache, which in
//! turn creates/lists/deletes the underlying viztrail in the store.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use vizier_cache::{ProjectCache, ProjectHandle};
use vizier_core::model::Properties;
use vizier_core::Identifier;
use vizier_store::ViztrailStore;

use crate::common::ListResponse;
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn ProjectCache>,
    pub store: Arc<dyn ViztrailStore>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub properties: Properties,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenameProjectRequest {
    #[schema(value_type = Object)]
    pub properties: Properties,
}

/// JSON shape returned for a project: its persisted properties plus the
/// cache's live handle.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectView {
    pub project_id: Identifier,
    #[schema(value_type = Object)]
    pub properties: Properties,
    pub datastore_handle: String,
    pub filestore_handle: String,
    pub container_endpoint: Option<ContainerEndpointView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContainerEndpointView {
    pub url: String,
    pub port: u16,
    pub container_id: String,
}

impl ProjectView {
    fn from_handle(handle: ProjectHandle, properties: Properties) -> Self {
        Self {
            project_id: handle.project_id,
            properties,
            datastore_handle: handle.datastore_handle,
            filestore_handle: handle.filestore_handle,
            container_endpoint: handle.container_endpoint.map(|e| ContainerEndpointView {
                url: e.url,
                port: e.port,
                container_id: e.container_id,
            }),
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/projects", get(list_projects).post(create_project))
        .route("/v1/projects/:project_id", get(get_project).patch(rename_project).delete(delete_project))
        .with_state(state)
}

/// GET /v1/projects
#[utoipa::path(
    get,
    path = "/v1/projects",
    responses((status = 200, description = "List of projects", body = ListResponse<ProjectView>)),
    tag = "projects"
)]
pub async fn list_projects(State(state): State<AppState>) -> Result<Json<ListResponse<ProjectView>>, ApiError> {
    let projects = state.cache.list_projects().await?;
    let mut views = Vec::with_capacity(projects.len());
    for handle in projects {
        let viztrail = state.store.get_viztrail(&handle.project_id).await?;
        views.push(ProjectView::from_handle(handle, viztrail.properties));
    }
    Ok(Json(views.into()))
}

/// POST /v1/projects
#[utoipa::path(
    post,
    path = "/v1/projects",
    request_body = CreateProjectRequest,
    responses((status = 201, description = "Project created", body = ProjectView)),
    tag = "projects"
)]
pub async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectView>), ApiError> {
    let properties = req.properties.clone();
    let project = state.cache.create_project(req.properties).await?;
    Ok((StatusCode::CREATED, Json(ProjectView::from_handle(project, properties))))
}

/// GET /v1/projects/{project_id}
#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}",
    params(("project_id" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project found", body = ProjectView),
        (status = 404, description = "Project not found"),
    ),
    tag = "projects"
)]
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectView>, ApiError> {
    let id = Identifier::new(project_id);
    let project = state.cache.get_project(&id).await?;
    let viztrail = state.store.get_viztrail(&id).await?;
    Ok(Json(ProjectView::from_handle(project, viztrail.properties)))
}

/// PATCH /v1/projects/{project_id}
///
/// Replaces a project's properties wholesale (used for renaming).
#[utoipa::path(
    patch,
    path = "/v1/projects/{project_id}",
    params(("project_id" = String, Path, description = "Project id")),
    request_body = RenameProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = ProjectView),
        (status = 404, description = "Project not found"),
    ),
    tag = "projects"
)]
pub async fn rename_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(req): Json<RenameProjectRequest>,
) -> Result<Json<ProjectView>, ApiError> {
    let id = Identifier::new(project_id);
    let viztrail = state.store.update_viztrail_properties(&id, req.properties).await?;
    let project = state.cache.get_project(&id).await?;
    Ok(Json(ProjectView::from_handle(project, viztrail.properties)))
}

/// DELETE /v1/projects/{project_id}
#[utoipa::path(
    delete,
    path = "/v1/projects/{project_id}",
    params(("project_id" = String, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 404, description = "Project not found"),
    ),
    tag = "projects"
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.cache.delete_project(&Identifier::new(project_id.clone())).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("project not found: {project_id}")))
    }
}
