//! Execution Controller errors.

use vizier_backend::BackendError;
use vizier_cache::CacheError;
use vizier_core::Identifier;
use vizier_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("branch not found: {0}")]
    BranchNotFound(Identifier),

    #[error("module not found: {0}")]
    ModuleNotFound(Identifier),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("project cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("the branch worker has shut down")]
    ActorGone,
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(msg) => EngineError::BackendUnavailable(msg),
            BackendError::Unsupported { package_id, command_id } => {
                EngineError::Validation(format!("no backend can execute {package_id}.{command_id}"))
            }
            BackendError::Transport(msg) => EngineError::BackendUnavailable(msg),
        }
    }
}
