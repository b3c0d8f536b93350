//! Per-branch worker task.
//!
//! Each branch owns exactly one actor that drains a queue of
//! `{Edit, TaskStateUpdate, CancelExec}` events (spec.md §9's explicit
//! message-passing mandate, grounded on the teacher's single-writer
//! `WorkflowExecutor` in `durable/src/engine/executor.rs`). Serializing
//! all mutation through one task per branch is what gives the per-branch
//! exclusive lock of spec.md §4.3 "for free": there is nothing to lock
//! because only one task ever mutates this branch's live state.
//!
//! State ownership: the actor is the sole authority over which module is
//! `RUNNING` for its branch. Cancellation — whether from `cancel_exec` or
//! from an edit superseding the in-flight module — flips the module to
//! `CANCELED` in the store immediately, the way spec.md §5 requires
//! ("the local flip is immediate... independent of backend
//! responsiveness"); the backend's own cancel is then fire-and-forget,
//! and any success/error report that still arrives for that task id is
//! dropped because it no longer matches `active.task_id`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{info, instrument, warn};
use vizier_backend::{Backend, ProjectContext, TaskReport, TaskState, TaskStateSink};
use vizier_cache::ProjectCache;
use vizier_core::{Command, Identifier, ModuleState, VizierConfig, Workflow, WorkflowAction};
use vizier_store::{ModuleUpdate, ViztrailStore};

use crate::error::EngineError;
use crate::invalidation::{ConservativePolicy, ReusePolicy};
use crate::validation::validate_command;

/// The module currently occupying this branch's single execution slot.
#[derive(Clone)]
struct ActiveModule {
    workflow_id: Identifier,
    module_id: Identifier,
    task_id: Identifier,
    index: usize,
}

pub enum EditKind {
    Append { command: Command },
    Insert { before_module_id: Identifier, command: Command },
    Delete { module_id: Identifier },
    Replace { module_id: Identifier, command: Command },
}

pub enum BranchEvent {
    Edit { kind: EditKind, reply: oneshot::Sender<Result<Workflow, EngineError>> },
    TaskUpdate { task_id: Identifier, report: TaskReport },
    CancelExec { reply: oneshot::Sender<Result<(), EngineError>> },
}

/// Routes a `TaskStateSink::report` call back into the owning branch's
/// event queue, so a backend never touches branch state directly.
struct ChannelSink {
    sender: mpsc::UnboundedSender<BranchEvent>,
}

#[async_trait]
impl TaskStateSink for ChannelSink {
    async fn report(&self, task_id: Identifier, report: TaskReport) {
        let _ = self.sender.send(BranchEvent::TaskUpdate { task_id, report });
    }
}

pub struct BranchActor {
    branch_id: Identifier,
    store: Arc<dyn ViztrailStore>,
    cache: Arc<dyn ProjectCache>,
    backend: Arc<dyn Backend>,
    config: VizierConfig,
    policy: Box<dyn ReusePolicy>,
    task_routing: Arc<RwLock<HashMap<Identifier, mpsc::UnboundedSender<BranchEvent>>>>,
    self_sender: mpsc::UnboundedSender<BranchEvent>,
    receiver: mpsc::UnboundedReceiver<BranchEvent>,
    active: Option<ActiveModule>,
}

impl BranchActor {
    pub fn spawn(
        branch_id: Identifier,
        store: Arc<dyn ViztrailStore>,
        cache: Arc<dyn ProjectCache>,
        backend: Arc<dyn Backend>,
        config: VizierConfig,
        task_routing: Arc<RwLock<HashMap<Identifier, mpsc::UnboundedSender<BranchEvent>>>>,
    ) -> mpsc::UnboundedSender<BranchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = BranchActor {
            branch_id,
            store,
            cache,
            backend,
            config,
            policy: Box::new(ConservativePolicy),
            task_routing,
            self_sender: tx.clone(),
            receiver: rx,
            active: None,
        };
        tokio::spawn(actor.run());
        tx
    }

    #[instrument(skip(self), fields(branch_id = %self.branch_id))]
    async fn run(mut self) {
        info!("branch worker started");
        while let Some(event) = self.receiver.recv().await {
            match event {
                BranchEvent::Edit { kind, reply } => {
                    let result = self.handle_edit(kind).await;
                    let _ = reply.send(result);
                }
                BranchEvent::TaskUpdate { task_id, report } => {
                    self.handle_task_update(task_id, report).await;
                }
                BranchEvent::CancelExec { reply } => {
                    let result = self.handle_cancel_exec().await;
                    let _ = reply.send(result);
                }
            }
        }
        info!("branch worker shutting down: no more senders");
    }

    async fn supersede_active(&mut self) {
        if let Some(active) = self.active.take() {
            warn!(module_id = %active.module_id, task_id = %active.task_id, "edit supersedes in-flight module");
            let _ = self
                .store
                .update_module(
                    &active.module_id,
                    ModuleUpdate { state: Some(ModuleState::Canceled), finished_at: Some(Utc::now()), ..Default::default() },
                )
                .await;
            self.task_routing.write().await.remove(&active.task_id);
            let _ = self.backend.cancel(&active.task_id).await;
        }
    }

    async fn handle_edit(&mut self, kind: EditKind) -> Result<Workflow, EngineError> {
        self.supersede_active().await;

        let head = self.current_head_or_empty().await?;
        let existing_ids = head.as_ref().map(|w| w.modules.clone()).unwrap_or_default();

        let mut existing_commands = Vec::with_capacity(existing_ids.len());
        for id in &existing_ids {
            existing_commands.push(self.store.get_module(id).await?.command);
        }

        let (action, action_module_id, plan) = match kind {
            EditKind::Append { command } => {
                validate_command(&command)?;
                (WorkflowAction::Append, None, self.policy.plan_append(&existing_ids, command))
            }
            EditKind::Insert { before_module_id, command } => {
                validate_command(&command)?;
                let idx = existing_ids
                    .iter()
                    .position(|id| *id == before_module_id)
                    .ok_or_else(|| EngineError::ModuleNotFound(before_module_id.clone()))?;
                (
                    WorkflowAction::Insert,
                    Some(before_module_id),
                    self.policy.plan_insert(&existing_ids, &existing_commands, idx, command),
                )
            }
            EditKind::Delete { module_id } => {
                let idx = existing_ids
                    .iter()
                    .position(|id| *id == module_id)
                    .ok_or_else(|| EngineError::ModuleNotFound(module_id.clone()))?;
                (WorkflowAction::Delete, Some(module_id), self.policy.plan_delete(&existing_ids, idx, &existing_commands))
            }
            EditKind::Replace { module_id, command } => {
                validate_command(&command)?;
                let idx = existing_ids
                    .iter()
                    .position(|id| *id == module_id)
                    .ok_or_else(|| EngineError::ModuleNotFound(module_id.clone()))?;
                (
                    WorkflowAction::Replace,
                    Some(module_id),
                    self.policy.plan_replace(&existing_ids, &existing_commands, idx, command),
                )
            }
        };

        let workflow = self.store.append_workflow(&self.branch_id, action, action_module_id, plan.modules).await?;

        if plan.first_pending_index < workflow.modules.len() {
            self.start_module(&workflow, plan.first_pending_index).await?;
        }

        Ok(workflow)
    }

    async fn current_head_or_empty(&self) -> Result<Option<Workflow>, EngineError> {
        match self.store.get_workflow(&self.branch_id, None).await {
            Ok(workflow) => Ok(Some(workflow)),
            Err(vizier_store::StoreError::WorkflowNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fold dataset provenance from module 0 through `index - 1` of
    /// `workflow`, producing the visible dataset map for `index`.
    async fn visible_datasets_at(&self, workflow: &Workflow, index: usize) -> Result<std::collections::BTreeMap<String, Identifier>, EngineError> {
        if index == 0 {
            return Ok(Default::default());
        }
        let previous_module = self.store.get_module(&workflow.modules[index - 1]).await?;
        Ok(previous_module.datasets)
    }

    async fn start_module(&mut self, workflow: &Workflow, index: usize) -> Result<(), EngineError> {
        let module_id = workflow.modules[index].clone();
        let module = self.store.get_module(&module_id).await?;

        if module.state.is_terminal() {
            // Reused module already carries a terminal state; nothing to
            // schedule. This only happens for a reused prefix entry,
            // which callers never pass as a start index, but is handled
            // defensively in case a future reuse policy reuses a
            // non-prefix position.
            return Ok(());
        }

        let visible = self.visible_datasets_at(workflow, index).await?;
        let viztrail_id = self.store.owning_viztrail(&self.branch_id).await?;
        let project = self.cache.get_project(&viztrail_id).await?;

        let task_id = vizier_core::id::new_id();
        self.store
            .update_module(&module_id, ModuleUpdate { state: Some(ModuleState::Running), started_at: Some(Utc::now()), ..Default::default() })
            .await?;

        self.task_routing.write().await.insert(task_id.clone(), self.self_sender.clone());
        self.active = Some(ActiveModule { workflow_id: workflow.identifier.clone(), module_id: module_id.clone(), task_id: task_id.clone(), index });

        let sink: Arc<dyn TaskStateSink> = Arc::new(ChannelSink { sender: self.self_sender.clone() });
        let backend = self.backend.clone();
        let command = module.command.clone();

        match backend.execute(task_id.clone(), command, visible, project, sink).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Submission itself failed (BackendUnavailable): leave
                // the module PENDING, per spec.md §7 — the controller
                // resubmits on the next edit or explicit retry, it never
                // retries on its own.
                warn!(%module_id, error = %err, "backend rejected submission; module remains PENDING");
                self.active = None;
                self.task_routing.write().await.remove(&task_id);
                self.store
                    .update_module(&module_id, ModuleUpdate { state: Some(ModuleState::Pending), ..Default::default() })
                    .await?;
                Err(err.into())
            }
        }
    }

    async fn handle_task_update(&mut self, task_id: Identifier, report: TaskReport) {
        let Some(active) = self.active.clone() else {
            return; // No active module at all: a very late, fully superseded report.
        };
        if active.task_id != task_id {
            return; // Superseded: dropped silently per spec.md §4.3/§5.
        }

        match report.state {
            TaskState::Running => {
                // Already marked RUNNING when submitted; nothing to do.
            }
            TaskState::Success => {
                let _ = self
                    .store
                    .update_module(
                        &active.module_id,
                        ModuleUpdate {
                            state: Some(ModuleState::Success),
                            outputs: report.outputs,
                            provenance: report.provenance,
                            datasets: report.datasets,
                            finished_at: Some(Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await;
                self.task_routing.write().await.remove(&task_id);
                self.active = None;
                self.advance_past(&active).await;
            }
            TaskState::Error => {
                let _ = self
                    .store
                    .update_module(
                        &active.module_id,
                        ModuleUpdate { state: Some(ModuleState::Error), outputs: report.outputs, finished_at: Some(Utc::now()), ..Default::default() },
                    )
                    .await;
                self.task_routing.write().await.remove(&task_id);
                self.active = None;
                // Terminal ERROR halts the branch: modules after this one
                // stay PENDING forever until a subsequent edit supersedes
                // them (spec.md §4.3's module state machine).
            }
            TaskState::Canceled => {
                let _ = self
                    .store
                    .update_module(&active.module_id, ModuleUpdate { state: Some(ModuleState::Canceled), finished_at: Some(Utc::now()), ..Default::default() })
                    .await;
                self.task_routing.write().await.remove(&task_id);
                self.active = None;
            }
        }
    }

    /// After a module reaches SUCCESS, schedule the next PENDING module
    /// of the same workflow, if any.
    async fn advance_past(&mut self, finished: &ActiveModule) {
        let workflow = match self.store.get_workflow(&self.branch_id, Some(&finished.workflow_id)).await {
            Ok(w) => w,
            Err(_) => return, // Workflow superseded; nothing left to advance.
        };
        // A concurrent edit may have already replaced the head, in which
        // case this workflow id is no longer the head and advancing it
        // further would be racing a superseded lineage; only continue if
        // it is still the head.
        let Ok(head) = self.store.get_workflow(&self.branch_id, None).await else { return };
        if head.identifier != workflow.identifier {
            return;
        }

        let next_index = finished.index + 1;
        if next_index >= workflow.modules.len() {
            return;
        }
        if let Err(err) = self.start_module(&workflow, next_index).await {
            warn!(error = %err, "failed to advance to next pending module");
        }
    }

    async fn handle_cancel_exec(&mut self) -> Result<(), EngineError> {
        let head = match self.current_head_or_empty().await? {
            Some(w) => w,
            None => return Ok(()),
        };

        for module_id in &head.modules {
            let module = self.store.get_module(module_id).await?;
            if !module.state.is_terminal() {
                self.store
                    .update_module(module_id, ModuleUpdate { state: Some(ModuleState::Canceled), finished_at: Some(Utc::now()), ..Default::default() })
                    .await?;
            }
        }

        if let Some(active) = self.active.take() {
            self.task_routing.write().await.remove(&active.task_id);
            let _ = self.backend.cancel(&active.task_id).await;
        }

        Ok(())
    }
}
