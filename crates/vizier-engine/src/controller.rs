//! The Execution Controller's public surface (spec.md §4.3's operation
//! table): the six operations every caller (API, CLI, tests) drives.
//!
//! The controller itself holds no per-branch state; it lazily spawns one
//! [`BranchActor`] per branch on first use and keeps a routing table from
//! branch id to that actor's event sender, plus a second table from task
//! id to branch sender so a backend's out-of-band progress report (e.g.
//! `vizier-api`'s task-state callback route) reaches the right actor
//! without the backend ever knowing which branch it belongs to.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use vizier_backend::{Backend, TaskReport};
use vizier_cache::ProjectCache;
use vizier_core::{Command, Identifier, VizierConfig, Workflow};
use vizier_store::ViztrailStore;

use crate::branch_actor::{BranchActor, BranchEvent, EditKind};
use crate::error::EngineError;

/// Routes edits and task reports to per-branch actors; owns nothing else.
pub struct ExecutionController {
    store: Arc<dyn ViztrailStore>,
    cache: Arc<dyn ProjectCache>,
    backend: Arc<dyn Backend>,
    config: VizierConfig,
    branches: RwLock<HashMap<Identifier, mpsc::UnboundedSender<BranchEvent>>>,
    task_routing: Arc<RwLock<HashMap<Identifier, mpsc::UnboundedSender<BranchEvent>>>>,
}

impl ExecutionController {
    pub fn new(store: Arc<dyn ViztrailStore>, cache: Arc<dyn ProjectCache>, backend: Arc<dyn Backend>) -> Self {
        Self::with_config(store, cache, backend, VizierConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn ViztrailStore>,
        cache: Arc<dyn ProjectCache>,
        backend: Arc<dyn Backend>,
        config: VizierConfig,
    ) -> Self {
        Self {
            store,
            cache,
            backend,
            config,
            branches: RwLock::new(HashMap::new()),
            task_routing: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn actor_for(&self, branch_id: &Identifier) -> mpsc::UnboundedSender<BranchEvent> {
        if let Some(sender) = self.branches.read().await.get(branch_id) {
            if !sender.is_closed() {
                return sender.clone();
            }
        }
        let mut branches = self.branches.write().await;
        if let Some(sender) = branches.get(branch_id) {
            if !sender.is_closed() {
                return sender.clone();
            }
        }
        let sender = BranchActor::spawn(
            branch_id.clone(),
            self.store.clone(),
            self.cache.clone(),
            self.backend.clone(),
            self.config.clone(),
            self.task_routing.clone(),
        );
        branches.insert(branch_id.clone(), sender.clone());
        sender
    }

    async fn send_edit(&self, branch_id: &Identifier, kind: EditKind) -> Result<Workflow, EngineError> {
        let sender = self.actor_for(branch_id).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender.send(BranchEvent::Edit { kind, reply: reply_tx }).map_err(|_| EngineError::ActorGone)?;
        reply_rx.await.map_err(|_| EngineError::ActorGone)?
    }

    /// Append a new module after the branch's current tail.
    pub async fn append_workflow_module(&self, branch_id: &Identifier, command: Command) -> Result<Workflow, EngineError> {
        self.send_edit(branch_id, EditKind::Append { command }).await
    }

    /// Insert a new module immediately before `before_module_id`,
    /// resetting it and everything after it to `PENDING`.
    pub async fn insert_workflow_module(
        &self,
        branch_id: &Identifier,
        before_module_id: Identifier,
        command: Command,
    ) -> Result<Workflow, EngineError> {
        self.send_edit(branch_id, EditKind::Insert { before_module_id, command }).await
    }

    /// Remove a module, resetting everything after it to `PENDING`.
    pub async fn delete_workflow_module(&self, branch_id: &Identifier, module_id: Identifier) -> Result<Workflow, EngineError> {
        self.send_edit(branch_id, EditKind::Delete { module_id }).await
    }

    /// Substitute a module's command, resetting it and everything after
    /// it to `PENDING`.
    pub async fn replace_workflow_module(
        &self,
        branch_id: &Identifier,
        module_id: Identifier,
        command: Command,
    ) -> Result<Workflow, EngineError> {
        self.send_edit(branch_id, EditKind::Replace { module_id, command }).await
    }

    /// Cancel every non-terminal module of the branch's head workflow.
    pub async fn cancel_exec(&self, branch_id: &Identifier) -> Result<(), EngineError> {
        let sender = self.actor_for(branch_id).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender.send(BranchEvent::CancelExec { reply: reply_tx }).map_err(|_| EngineError::ActorGone)?;
        reply_rx.await.map_err(|_| EngineError::ActorGone)?
    }

    /// Feed a backend's out-of-band progress report (spec.md §6's task
    /// state callback) to whichever branch actor owns `task_id`. A
    /// `task_id` with no routing entry is a stale or already-superseded
    /// report and is dropped silently.
    pub async fn update_task_state(&self, task_id: Identifier, report: TaskReport) {
        let sender = self.task_routing.read().await.get(&task_id).cloned();
        if let Some(sender) = sender {
            let _ = sender.send(BranchEvent::TaskUpdate { task_id, report });
        }
    }
}
