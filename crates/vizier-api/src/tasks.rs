//! The task-state callback (spec.md §6): how a backend reports progress
//! back to the Execution Controller. Always accepted — an unknown or
//! already-superseded `task_id` is silently dropped by
//! `ExecutionController::update_task_state`, which is what gives the
//! idempotence/monotonicity spec.md §8 requires without this route
//! having to track anything itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use vizier_backend::{TaskReport, TaskState};
use vizier_core::{Identifier, Outputs, Provenance};
use vizier_engine::ExecutionController;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ExecutionController>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskStateCallback {
    pub state: TaskState,
    pub outputs: Option<Outputs>,
    pub provenance: Option<Provenance>,
    #[schema(value_type = Object)]
    pub datasets: Option<BTreeMap<String, Identifier>>,
}

impl From<TaskStateCallback> for TaskReport {
    fn from(callback: TaskStateCallback) -> Self {
        TaskReport { state: callback.state, outputs: callback.outputs, provenance: callback.provenance, datasets: callback.datasets }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new().route("/v1/tasks/:task_id", post(update_task_state)).with_state(state)
}

/// POST /v1/tasks/{task_id}
#[utoipa::path(
    post,
    path = "/v1/tasks/{task_id}",
    params(("task_id" = String, Path, description = "Task id")),
    request_body = TaskStateCallback,
    responses((status = 202, description = "Accepted (stale task ids are silently dropped)")),
    tag = "tasks"
)]
pub async fn update_task_state(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(callback): Json<TaskStateCallback>,
) -> StatusCode {
    state.controller.update_task_state(Identifier::new(task_id), callback.into()).await;
    StatusCode::ACCEPTED
}
