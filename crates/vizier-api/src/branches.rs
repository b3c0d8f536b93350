//! Branch routes: branches are always addressed beneath the project
//! (viztrail) that owns them.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use vizier_core::model::Properties;
use vizier_core::{Branch, Identifier};
use vizier_store::{BranchSource, ViztrailStore};

use crate::common::ListResponse;
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ViztrailStore>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBranchRequest {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub properties: Properties,
    /// Copy a prefix of `source_branch`'s workflow into this branch's
    /// initial workflow. `source_workflow` defaults to that branch's
    /// head; `source_module` truncates the copy at that module,
    /// inclusive.
    pub source_branch: Option<Identifier>,
    pub source_workflow: Option<Identifier>,
    pub source_module: Option<Identifier>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenameBranchRequest {
    #[schema(value_type = Object)]
    pub properties: Properties,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/projects/:project_id/branches", get(list_branches).post(create_branch))
        .route(
            "/v1/projects/:project_id/branches/:branch_id",
            get(get_branch).patch(rename_branch).delete(delete_branch),
        )
        .with_state(state)
}

/// GET /v1/projects/{project_id}/branches
#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}/branches",
    params(("project_id" = String, Path, description = "Project id")),
    responses((status = 200, description = "List of branches", body = ListResponse<Branch>)),
    tag = "branches"
)]
pub async fn list_branches(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ListResponse<Branch>>, ApiError> {
    let branches = state.store.list_branches(&Identifier::new(project_id)).await?;
    Ok(Json(branches.into()))
}

/// POST /v1/projects/{project_id}/branches
#[utoipa::path(
    post,
    path = "/v1/projects/{project_id}/branches",
    params(("project_id" = String, Path, description = "Project id")),
    request_body = CreateBranchRequest,
    responses((status = 201, description = "Branch created", body = Branch)),
    tag = "branches"
)]
pub async fn create_branch(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(req): Json<CreateBranchRequest>,
) -> Result<(StatusCode, Json<Branch>), ApiError> {
    let source = req.source_branch.map(|source_branch| BranchSource {
        source_branch,
        source_workflow: req.source_workflow,
        source_module: req.source_module,
    });
    let branch = state
        .store
        .create_branch(&Identifier::new(project_id), req.properties, source)
        .await?;
    Ok((StatusCode::CREATED, Json(branch)))
}

/// GET /v1/projects/{project_id}/branches/{branch_id}
#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}/branches/{branch_id}",
    params(
        ("project_id" = String, Path, description = "Project id"),
        ("branch_id" = String, Path, description = "Branch id"),
    ),
    responses(
        (status = 200, description = "Branch found", body = Branch),
        (status = 404, description = "Branch not found"),
    ),
    tag = "branches"
)]
pub async fn get_branch(
    State(state): State<AppState>,
    Path((project_id, branch_id)): Path<(String, String)>,
) -> Result<Json<Branch>, ApiError> {
    let branch = state
        .store
        .get_branch(&Identifier::new(project_id), &Identifier::new(branch_id))
        .await?;
    Ok(Json(branch))
}

/// PATCH /v1/projects/{project_id}/branches/{branch_id}
///
/// Replaces a branch's properties wholesale (used for renaming).
#[utoipa::path(
    patch,
    path = "/v1/projects/{project_id}/branches/{branch_id}",
    params(
        ("project_id" = String, Path, description = "Project id"),
        ("branch_id" = String, Path, description = "Branch id"),
    ),
    request_body = RenameBranchRequest,
    responses(
        (status = 200, description = "Branch updated", body = Branch),
        (status = 404, description = "Branch not found"),
    ),
    tag = "branches"
)]
pub async fn rename_branch(
    State(state): State<AppState>,
    Path((project_id, branch_id)): Path<(String, String)>,
    Json(req): Json<RenameBranchRequest>,
) -> Result<Json<Branch>, ApiError> {
    let branch = state
        .store
        .update_branch_properties(&Identifier::new(project_id), &Identifier::new(branch_id), req.properties)
        .await?;
    Ok(Json(branch))
}

/// DELETE /v1/projects/{project_id}/branches/{branch_id}
///
/// Forbidden (`409`) if `branch_id` is the viztrail's only branch
/// (spec.md §4.1).
#[utoipa::path(
    delete,
    path = "/v1/projects/{project_id}/branches/{branch_id}",
    params(
        ("project_id" = String, Path, description = "Project id"),
        ("branch_id" = String, Path, description = "Branch id"),
    ),
    responses(
        (status = 204, description = "Branch deleted"),
        (status = 404, description = "Branch not found"),
        (status = 409, description = "Cannot delete the viztrail's only branch"),
    ),
    tag = "branches"
)]
pub async fn delete_branch(
    State(state): State<AppState>,
    Path((project_id, branch_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .store
        .delete_branch(&Identifier::new(project_id), &Identifier::new(branch_id.clone()))
        .await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("branch not found: {branch_id}")))
    }
}
