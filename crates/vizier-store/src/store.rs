//! `ViztrailStore` trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vizier_core::model::Properties;
use vizier_core::{Branch, Identifier, Module, ModuleState, Outputs, Provenance, Viztrail, Workflow, WorkflowAction};

/// Error type for store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("viztrail not found: {0}")]
    ViztrailNotFound(Identifier),

    #[error("branch not found: {0}")]
    BranchNotFound(Identifier),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Identifier),

    #[error("module not found: {0}")]
    ModuleNotFound(Identifier),

    #[error("cannot delete the only branch of a viztrail")]
    LastBranch,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupted record: {0}")]
    Corruption(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Where a newly created branch's initial workflow is copied from.
///
/// When present, the new branch's first workflow contains a prefix of
/// `source_workflow`'s modules (or the head workflow of `source_branch` if
/// `source_workflow` is omitted), truncated at `source_module` inclusive
/// when given.
#[derive(Debug, Clone, Default)]
pub struct BranchSource {
    pub source_branch: Identifier,
    pub source_workflow: Option<Identifier>,
    pub source_module: Option<Identifier>,
}

/// One entry of a workflow being appended: either a module reused
/// verbatim from an earlier workflow, or a brand new module record that
/// must be durably written before the workflow itself is committed.
#[derive(Debug, Clone)]
pub enum ModuleRef {
    Existing(Identifier),
    New(Module),
}

impl ModuleRef {
    pub fn id(&self) -> &Identifier {
        match self {
            ModuleRef::Existing(id) => id,
            ModuleRef::New(module) => &module.identifier,
        }
    }
}

/// A partial update applied to a module by the Execution Controller as a
/// backend reports progress. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ModuleUpdate {
    pub state: Option<ModuleState>,
    pub outputs: Option<Outputs>,
    pub provenance: Option<Provenance>,
    pub datasets: Option<std::collections::BTreeMap<String, Identifier>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// The Viztrail Store contract.
///
/// Implementations must honor the recovery rule for `append_workflow`:
/// write every new module record first, then the workflow record
/// referencing all of them (new and reused), then swap the branch head
/// pointer in a single durable write — so a crash between any two of
/// those steps leaves the branch pointing at its previous, still-valid
/// head. On restart, a workflow whose modules are not all present is
/// discarded.
#[async_trait]
pub trait ViztrailStore: Send + Sync {
    async fn create_viztrail(&self, properties: Properties) -> Result<Viztrail, StoreError>;
    async fn delete_viztrail(&self, id: &Identifier) -> Result<bool, StoreError>;
    async fn list_viztrails(&self) -> Result<Vec<Viztrail>, StoreError>;
    async fn get_viztrail(&self, id: &Identifier) -> Result<Viztrail, StoreError>;

    /// Create a branch, optionally seeding its initial workflow from a
    /// prefix of an existing branch/workflow's modules.
    async fn create_branch(
        &self,
        viztrail_id: &Identifier,
        properties: Properties,
        source: Option<BranchSource>,
    ) -> Result<Branch, StoreError>;

    /// Delete a branch. Forbidden if it is the viztrail's only branch.
    async fn delete_branch(&self, viztrail_id: &Identifier, branch_id: &Identifier) -> Result<bool, StoreError>;

    async fn get_branch(&self, viztrail_id: &Identifier, branch_id: &Identifier) -> Result<Branch, StoreError>;
    async fn list_branches(&self, viztrail_id: &Identifier) -> Result<Vec<Branch>, StoreError>;

    /// Resolve the viztrail that owns a branch. Lets callers that only
    /// hold a branch id (the Execution Controller's public operations
    /// all take just a branch, per spec.md §4.3's operation table) reach
    /// the `(viztrail_id, branch_id)` pair this trait otherwise requires.
    async fn owning_viztrail(&self, branch_id: &Identifier) -> Result<Identifier, StoreError>;

    /// Atomically publish a new workflow as the given branch's head.
    async fn append_workflow(
        &self,
        branch_id: &Identifier,
        action: WorkflowAction,
        action_module_id: Option<Identifier>,
        modules: Vec<ModuleRef>,
    ) -> Result<Workflow, StoreError>;

    /// Fetch a workflow; `workflow_id = None` returns the branch head.
    async fn get_workflow(&self, branch_id: &Identifier, workflow_id: Option<&Identifier>) -> Result<Workflow, StoreError>;

    async fn get_module(&self, module_id: &Identifier) -> Result<Module, StoreError>;

    /// Apply a partial update to a module's live state. A no-op if the
    /// module has already reached a terminal state (terminal states are
    /// monotonic and this enforces that regardless of caller discipline).
    async fn update_module(&self, module_id: &Identifier, update: ModuleUpdate) -> Result<Module, StoreError>;

    /// Replace a viztrail's properties wholesale (e.g. a `name` rename).
    async fn update_viztrail_properties(&self, id: &Identifier, properties: Properties) -> Result<Viztrail, StoreError>;

    /// Replace a branch's properties wholesale.
    async fn update_branch_properties(
        &self,
        viztrail_id: &Identifier,
        branch_id: &Identifier,
        properties: Properties,
    ) -> Result<Branch, StoreError>;
}
