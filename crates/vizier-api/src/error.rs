//! Maps the workspace's per-crate error taxonomies onto HTTP responses,
//! following spec.md §7's propagation policy: `Validation`/`NotFound`/
//! `Conflict` are synchronous client errors, `BackendUnavailable` is a
//! retryable `503`, `Corruption` is an opaque `500` (the affected entity
//! is already isolated by the store/cache layer), and `ExecutionError`
//! never reaches this layer at all — it is recorded as a module's
//! terminal `ERROR` state, not an API failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use vizier_cache::CacheError;
use vizier_engine::EngineError;
use vizier_store::StoreError;

use crate::common::ErrorResponse;

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self { status: StatusCode::CONFLICT, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.message);
        }
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::ViztrailNotFound(_)
            | StoreError::BranchNotFound(_)
            | StoreError::WorkflowNotFound(_)
            | StoreError::ModuleNotFound(_) => StatusCode::NOT_FOUND,
            StoreError::LastBranch | StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::Corruption(_) | StoreError::Io(_) | StoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: err.to_string() }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        let status = match &err {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: err.to_string() }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::Store(inner) => return ApiError::from(inner.clone()),
            EngineError::Cache(inner) => return ApiError::from(inner.clone()),
            _ => {}
        }
        let status = match &err {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::BranchNotFound(_) | EngineError::ModuleNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::BackendUnavailable(_) | EngineError::ActorGone => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Store(_) | EngineError::Cache(_) => unreachable!("handled above"),
        };
        Self { status, message: err.to_string() }
    }
}
