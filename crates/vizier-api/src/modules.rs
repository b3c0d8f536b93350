//! Module routes: the Execution Controller's edit operations
//! (spec.md §4.3's operation table) plus a read-only module lookup.
//!
//! Every edit route returns the freshly committed [`Workflow`]; the
//! module records it references can be read back individually via
//! `GET /v1/modules/{module_id}`, or in bulk by following `get_workflow`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use vizier_core::{Command, Identifier, Module, Workflow};
use vizier_engine::ExecutionController;
use vizier_store::ViztrailStore;

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ViztrailStore>,
    pub controller: Arc<ExecutionController>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AppendModuleRequest {
    pub command: Command,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InsertModuleRequest {
    pub before_module_id: Identifier,
    pub command: Command,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceModuleRequest {
    pub command: Command,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/modules/:module_id", get(get_module))
        .route("/v1/branches/:branch_id/modules", post(append_module))
        .route("/v1/branches/:branch_id/modules/insert", post(insert_module))
        .route(
            "/v1/branches/:branch_id/modules/:module_id",
            put(replace_module).delete(delete_module),
        )
        .route("/v1/branches/:branch_id/cancel", post(cancel_exec))
        .with_state(state)
}

/// GET /v1/modules/{module_id}
#[utoipa::path(
    get,
    path = "/v1/modules/{module_id}",
    params(("module_id" = String, Path, description = "Module id")),
    responses(
        (status = 200, description = "Module found", body = Module),
        (status = 404, description = "Module not found"),
    ),
    tag = "modules"
)]
pub async fn get_module(State(state): State<AppState>, Path(module_id): Path<String>) -> Result<Json<Module>, ApiError> {
    let module = state.store.get_module(&Identifier::new(module_id)).await?;
    Ok(Json(module))
}

/// POST /v1/branches/{branch_id}/modules — append a new PENDING module
/// after the branch's current tail.
#[utoipa::path(
    post,
    path = "/v1/branches/{branch_id}/modules",
    params(("branch_id" = String, Path, description = "Branch id")),
    request_body = AppendModuleRequest,
    responses(
        (status = 201, description = "New workflow committed", body = Workflow),
        (status = 400, description = "Malformed command"),
        (status = 404, description = "Branch not found"),
    ),
    tag = "modules"
)]
pub async fn append_module(
    State(state): State<AppState>,
    Path(branch_id): Path<String>,
    Json(req): Json<AppendModuleRequest>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let workflow = state.controller.append_workflow_module(&Identifier::new(branch_id), req.command).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

/// POST /v1/branches/{branch_id}/modules/insert — insert a new module
/// immediately before `before_module_id`, invalidating it and everything
/// after it (spec.md §4.3).
#[utoipa::path(
    post,
    path = "/v1/branches/{branch_id}/modules/insert",
    params(("branch_id" = String, Path, description = "Branch id")),
    request_body = InsertModuleRequest,
    responses(
        (status = 201, description = "New workflow committed", body = Workflow),
        (status = 400, description = "Malformed command"),
        (status = 404, description = "Branch or insertion-point module not found"),
    ),
    tag = "modules"
)]
pub async fn insert_module(
    State(state): State<AppState>,
    Path(branch_id): Path<String>,
    Json(req): Json<InsertModuleRequest>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let workflow = state
        .controller
        .insert_workflow_module(&Identifier::new(branch_id), req.before_module_id, req.command)
        .await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

/// PUT /v1/branches/{branch_id}/modules/{module_id} — substitute the
/// module's command, invalidating it and everything after it.
#[utoipa::path(
    put,
    path = "/v1/branches/{branch_id}/modules/{module_id}",
    params(
        ("branch_id" = String, Path, description = "Branch id"),
        ("module_id" = String, Path, description = "Module id to replace"),
    ),
    request_body = ReplaceModuleRequest,
    responses(
        (status = 200, description = "New workflow committed", body = Workflow),
        (status = 400, description = "Malformed command"),
        (status = 404, description = "Branch or module not found"),
    ),
    tag = "modules"
)]
pub async fn replace_module(
    State(state): State<AppState>,
    Path((branch_id, module_id)): Path<(String, String)>,
    Json(req): Json<ReplaceModuleRequest>,
) -> Result<Json<Workflow>, ApiError> {
    let workflow = state
        .controller
        .replace_workflow_module(&Identifier::new(branch_id), Identifier::new(module_id), req.command)
        .await?;
    Ok(Json(workflow))
}

/// DELETE /v1/branches/{branch_id}/modules/{module_id} — remove a
/// module, invalidating everything after it.
#[utoipa::path(
    delete,
    path = "/v1/branches/{branch_id}/modules/{module_id}",
    params(
        ("branch_id" = String, Path, description = "Branch id"),
        ("module_id" = String, Path, description = "Module id to delete"),
    ),
    responses(
        (status = 200, description = "New workflow committed", body = Workflow),
        (status = 404, description = "Branch or module not found"),
    ),
    tag = "modules"
)]
pub async fn delete_module(
    State(state): State<AppState>,
    Path((branch_id, module_id)): Path<(String, String)>,
) -> Result<Json<Workflow>, ApiError> {
    let workflow = state
        .controller
        .delete_workflow_module(&Identifier::new(branch_id), Identifier::new(module_id))
        .await?;
    Ok(Json(workflow))
}

/// POST /v1/branches/{branch_id}/cancel — flip every non-terminal module
/// of the branch's head workflow to `CANCELED` and signal the backend.
#[utoipa::path(
    post,
    path = "/v1/branches/{branch_id}/cancel",
    params(("branch_id" = String, Path, description = "Branch id")),
    responses(
        (status = 200, description = "Cancellation applied"),
        (status = 404, description = "Branch not found"),
    ),
    tag = "modules"
)]
pub async fn cancel_exec(State(state): State<AppState>, Path(branch_id): Path<String>) -> Result<StatusCode, ApiError> {
    state.controller.cancel_exec(&Identifier::new(branch_id)).await?;
    Ok(StatusCode::OK)
}
