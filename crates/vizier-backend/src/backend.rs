//! The `Backend` contract: execution transport for a command.
//!
//! A backend is characterized by what it can run (`can_execute`), how it
//! runs it (`execute`), how it is stopped (`cancel`), and optionally how
//! it is routed in a multi-queue deployment (`task_routes`). The backend
//! never writes to the Viztrail Store directly; it reports progress
//! through a [`TaskStateSink`] so `vizier-engine` stays the sole writer.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use vizier_cache::ProjectHandle;
use vizier_core::{Command, Identifier, Outputs, Provenance};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Worker unreachable or container missing. The caller retries; the
    /// backend itself never retries silently.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("no handler registered for {package_id}.{command_id}")]
    Unsupported { package_id: String, command_id: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// The non-persisted identity of the project a module is executing
/// against: the handles the Project Cache resolved, passed through so a
/// backend never has to look them up itself.
pub type ProjectContext = ProjectHandle;

/// Progress reported by a backend as a task executes. Mirrors the task
/// state callback payload of spec.md §6
/// (`{state, outputs?, provenance?, datasets?, timestamps?}`), minus the
/// timestamp fields the engine stamps itself on receipt.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub state: TaskState,
    pub outputs: Option<Outputs>,
    pub provenance: Option<Provenance>,
    pub datasets: Option<BTreeMap<String, Identifier>>,
}

impl TaskReport {
    pub fn running() -> Self {
        Self { state: TaskState::Running, outputs: None, provenance: None, datasets: None }
    }

    pub fn success(outputs: Outputs, provenance: Provenance, datasets: BTreeMap<String, Identifier>) -> Self {
        Self { state: TaskState::Success, outputs: Some(outputs), provenance: Some(provenance), datasets: Some(datasets) }
    }

    pub fn error(outputs: Outputs) -> Self {
        Self { state: TaskState::Error, outputs: Some(outputs), provenance: None, datasets: None }
    }

    pub fn canceled() -> Self {
        Self { state: TaskState::Canceled, outputs: None, provenance: None, datasets: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Running,
    Success,
    Error,
    Canceled,
}

/// Where a backend reports task progress. Implemented by `vizier-engine`;
/// kept as a trait here so `vizier-backend` does not depend on the
/// engine crate (leaves-first dependency order: store -> cache ->
/// backend -> engine).
#[async_trait]
pub trait TaskStateSink: Send + Sync {
    async fn report(&self, task_id: Identifier, report: TaskReport);
}

/// Execution transport for a command: in-process, remote/container, or a
/// dispatcher that routes between several of either.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Whether this backend is willing to run `command`.
    fn can_execute(&self, command: &Command) -> bool;

    /// Submit `command` for execution under `task_id`. Progress (running,
    /// success, error) is reported asynchronously to `sink`; this call
    /// itself returns as soon as submission succeeds or fails, not when
    /// the task finishes. `task_id` is guaranteed unique by the caller
    /// across all submissions; a backend may use it to dedupe retries.
    async fn execute(
        &self,
        task_id: Identifier,
        command: Command,
        visible_datasets: BTreeMap<String, Identifier>,
        project: ProjectContext,
        sink: Arc<dyn TaskStateSink>,
    ) -> Result<(), BackendError>;

    /// Best-effort cancellation. The caller has already flipped the
    /// module to `CANCELED` locally; this only tells the backend to stop
    /// doing work and to drop any in-flight success/error report it may
    /// still be holding.
    async fn cancel(&self, task_id: &Identifier) -> Result<(), BackendError>;

    /// Optional routing hint for a multi-queue dispatcher. `None` means
    /// "use the default queue".
    fn task_routes(&self, _command: &Command) -> Option<String> {
        None
    }
}
