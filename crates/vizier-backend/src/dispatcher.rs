//! Multi-queue dispatcher: an optional layer between the engine and a
//! remote execution engine that routes a command to a named queue based
//! on `(package_id, command_id) -> queue_name`; unknown commands fall
//! through to a default queue. Queues are independent; ordering is
//! per-queue and per-branch, matching spec.md §4.4.
//!
//! Implemented as a `Backend` that wraps other `Backend`s one per queue,
//! the way the teacher's `WorkerPoolConfig.activity_types` partitions a
//! single store's tasks across differently-configured pollers without
//! the pollers needing to know about each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use vizier_core::{Command, Identifier};

use crate::backend::{Backend, BackendError, ProjectContext, TaskStateSink};

const DEFAULT_QUEUE: &str = "default";

/// Routes commands to named queues, each backed by its own [`Backend`].
pub struct MultiQueueDispatcher {
    routes: BTreeMap<(String, String), String>,
    queues: BTreeMap<String, Arc<dyn Backend>>,
}

impl MultiQueueDispatcher {
    pub fn new(default_queue: Arc<dyn Backend>) -> Self {
        let mut queues = BTreeMap::new();
        queues.insert(DEFAULT_QUEUE.to_string(), default_queue);
        Self { routes: BTreeMap::new(), queues }
    }

    /// Register a queue and its backend.
    pub fn with_queue(mut self, name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        self.queues.insert(name.into(), backend);
        self
    }

    /// Route a `(package_id, command_id)` pair to a named queue. The
    /// queue must have been registered with [`Self::with_queue`] (or be
    /// `"default"`).
    pub fn route(mut self, package_id: impl Into<String>, command_id: impl Into<String>, queue: impl Into<String>) -> Self {
        self.routes.insert((package_id.into(), command_id.into()), queue.into());
        self
    }

    fn queue_name(&self, command: &Command) -> &str {
        self.routes
            .get(&(command.package_id.clone(), command.command_id.clone()))
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_QUEUE)
    }

    fn backend_for(&self, command: &Command) -> Option<&Arc<dyn Backend>> {
        self.queues.get(self.queue_name(command))
    }
}

#[async_trait]
impl Backend for MultiQueueDispatcher {
    fn can_execute(&self, command: &Command) -> bool {
        self.backend_for(command).map(|b| b.can_execute(command)).unwrap_or(false)
    }

    async fn execute(
        &self,
        task_id: Identifier,
        command: Command,
        visible_datasets: BTreeMap<String, Identifier>,
        project: ProjectContext,
        sink: Arc<dyn TaskStateSink>,
    ) -> Result<(), BackendError> {
        let backend = self
            .backend_for(&command)
            .ok_or_else(|| BackendError::Unsupported { package_id: command.package_id.clone(), command_id: command.command_id.clone() })?
            .clone();
        backend.execute(task_id, command, visible_datasets, project, sink).await
    }

    async fn cancel(&self, task_id: &Identifier) -> Result<(), BackendError> {
        // The dispatcher does not track which queue a task landed on
        // after submission succeeds, so cancellation is broadcast to
        // every queue; each backend's own cancel is a cheap no-op for
        // task ids it does not recognize.
        for backend in self.queues.values() {
            backend.cancel(task_id).await?;
        }
        Ok(())
    }

    fn task_routes(&self, command: &Command) -> Option<String> {
        Some(self.queue_name(command).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::PythonCellHandler;
    use crate::handler::HandlerRegistry;
    use crate::inprocess::InProcessBackend;

    fn python_backend() -> Arc<dyn Backend> {
        let mut handlers = HandlerRegistry::new();
        handlers.register(Arc::new(PythonCellHandler));
        Arc::new(InProcessBackend::new(handlers, 4))
    }

    #[test]
    fn unrouted_command_falls_through_to_default_queue() {
        let dispatcher = MultiQueueDispatcher::new(python_backend());
        let command = Command { package_id: "pycell".into(), command_id: "python_cell".into(), arguments: vec![] };
        assert_eq!(dispatcher.task_routes(&command).as_deref(), Some("default"));
        assert!(dispatcher.can_execute(&command));
    }

    #[test]
    fn routed_command_uses_named_queue() {
        let dispatcher = MultiQueueDispatcher::new(python_backend())
            .with_queue("heavy", python_backend())
            .route("vizual", "load_dataset", "heavy");

        let command = Command { package_id: "vizual".into(), command_id: "load_dataset".into(), arguments: vec![] };
        assert_eq!(dispatcher.task_routes(&command).as_deref(), Some("heavy"));
    }

    #[test]
    fn command_routed_to_unregistered_queue_cannot_execute() {
        let dispatcher = MultiQueueDispatcher::new(python_backend()).route("vizual", "load_dataset", "ghost");
        let command = Command { package_id: "vizual".into(), command_id: "load_dataset".into(), arguments: vec![] };
        assert!(!dispatcher.can_execute(&command));
    }
}
