//! Workflow routes. A workflow is immutable once committed; there is no
//! update or delete route here, only reads.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::IntoParams;
use vizier_core::{Identifier, Workflow};
use vizier_store::ViztrailStore;

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ViztrailStore>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GetWorkflowParams {
    /// Workflow id to fetch; omitted means the branch's current head.
    pub workflow_id: Option<String>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/branches/:branch_id/workflow", get(get_workflow))
        .with_state(state)
}

/// GET /v1/branches/{branch_id}/workflow?workflow_id=...
///
/// Defaults to the branch head when `workflow_id` is omitted, matching
/// `ViztrailStore::get_workflow`'s own default (spec.md §4.1).
#[utoipa::path(
    get,
    path = "/v1/branches/{branch_id}/workflow",
    params(
        ("branch_id" = String, Path, description = "Branch id"),
        GetWorkflowParams,
    ),
    responses(
        (status = 200, description = "Workflow found", body = Workflow),
        (status = 404, description = "Branch or workflow not found"),
    ),
    tag = "workflows"
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(branch_id): Path<String>,
    Query(params): Query<GetWorkflowParams>,
) -> Result<Json<Workflow>, ApiError> {
    let workflow_id = params.workflow_id.map(Identifier::new);
    let workflow = state
        .store
        .get_workflow(&Identifier::new(branch_id), workflow_id.as_ref())
        .await?;
    Ok(Json(workflow))
}
