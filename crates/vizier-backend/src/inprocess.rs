//! In-process, synchronous-transport backend.
//!
//! Runs commands on the controller's own task pool, one Tokio task per
//! submission; ordering across a branch is the engine's responsibility
//! (it only ever has one module in flight per branch), not this
//! backend's. Grounded on the teacher's worker pool
//! (`durable/src/worker/pool.rs`): a bounded `Semaphore` caps total
//! concurrency, and cancellation is implemented as a per-task
//! `CancellationToken`-style flag checked before the terminal report is
//! sent, mirroring the pool's "drop late events for completed work" rule
//! in `durable/src/engine/executor.rs`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tracing::{instrument, warn};
use vizier_core::{Command, Identifier};

use crate::backend::{Backend, BackendError, ProjectContext, TaskReport, TaskStateSink};
use crate::handler::HandlerRegistry;

struct InFlight {
    canceled: Arc<AtomicBool>,
}

/// In-process backend. Holds a [`HandlerRegistry`] of the package
/// commands it knows how to run and a semaphore bounding total
/// concurrent executions across all branches.
pub struct InProcessBackend {
    handlers: HandlerRegistry,
    semaphore: Arc<Semaphore>,
    in_flight: Mutex<HashMap<Identifier, InFlight>>,
}

impl InProcessBackend {
    pub fn new(handlers: HandlerRegistry, max_concurrency: usize) -> Self {
        Self { handlers, semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))), in_flight: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl Backend for InProcessBackend {
    fn can_execute(&self, command: &Command) -> bool {
        self.handlers.can_execute(command)
    }

    #[instrument(skip(self, command, visible_datasets, project, sink), fields(task_id = %task_id, package = %command.package_id, cmd = %command.command_id))]
    async fn execute(
        &self,
        task_id: Identifier,
        command: Command,
        visible_datasets: std::collections::BTreeMap<String, Identifier>,
        project: ProjectContext,
        sink: Arc<dyn TaskStateSink>,
    ) -> Result<(), BackendError> {
        if !self.handlers.can_execute(&command) {
            return Err(BackendError::Unsupported {
                package_id: command.package_id.clone(),
                command_id: command.command_id.clone(),
            });
        }

        let canceled = Arc::new(AtomicBool::new(false));
        self.in_flight.lock().await.insert(task_id.clone(), InFlight { canceled: canceled.clone() });

        let permit = self.semaphore.clone().acquire_owned().await.map_err(|e| BackendError::Unavailable(e.to_string()))?;
        sink.report(task_id.clone(), TaskReport::running()).await;

        // `HandlerRegistry::run` borrows `self.handlers`, which owns its
        // handlers for the backend's lifetime, so the task below borrows
        // `self` rather than cloning the registry.
        let outcome = self.handlers.run(&command, &visible_datasets, &project).await;
        drop(permit);

        if canceled.load(Ordering::SeqCst) {
            // A cancel arrived while we were running: the local flip to
            // CANCELED already happened in the engine, so any result we
            // computed here is dropped rather than overwriting it.
            self.in_flight.lock().await.remove(&task_id);
            return Ok(());
        }

        match outcome {
            Ok(Ok(result)) => {
                let datasets = vizier_core::Module::fold_datasets(&visible_datasets, &result.provenance);
                sink.report(task_id.clone(), TaskReport::success(result.outputs, result.provenance, datasets)).await;
            }
            Ok(Err(message)) => {
                warn!(%task_id, %message, "command execution failed");
                sink.report(task_id.clone(), TaskReport::error(vizier_core::Outputs { stdout: vec![], stderr: vec![message] })).await;
            }
            Err(err) => {
                self.in_flight.lock().await.remove(&task_id);
                return Err(err);
            }
        }

        self.in_flight.lock().await.remove(&task_id);
        Ok(())
    }

    async fn cancel(&self, task_id: &Identifier) -> Result<(), BackendError> {
        if let Some(entry) = self.in_flight.lock().await.get(task_id) {
            entry.canceled.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::PythonCellHandler;
    use std::sync::Mutex as StdMutex;
    use vizier_core::Argument;

    struct RecordingSink {
        reports: StdMutex<Vec<(Identifier, TaskReport)>>,
    }

    #[async_trait]
    impl TaskStateSink for RecordingSink {
        async fn report(&self, task_id: Identifier, report: TaskReport) {
            self.reports.lock().unwrap().push((task_id, report));
        }
    }

    fn project_context() -> ProjectContext {
        ProjectContext { project_id: Identifier::new("p1"), datastore_handle: "ds://p1".into(), filestore_handle: "fs://p1".into(), container_endpoint: None }
    }

    #[tokio::test]
    async fn executes_registered_command_and_reports_success() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(Arc::new(PythonCellHandler));
        let backend = InProcessBackend::new(handlers, 4);

        let sink = Arc::new(RecordingSink { reports: StdMutex::new(vec![]) });
        let command = Command {
            package_id: "pycell".into(),
            command_id: "python_cell".into(),
            arguments: vec![Argument::Scalar { name: "code".into(), value: serde_json::json!("print(1)") }],
        };

        backend
            .execute(Identifier::new("t1"), command, Default::default(), project_context(), sink.clone())
            .await
            .unwrap();

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].1.state, crate::backend::TaskState::Running);
        assert_eq!(reports[1].1.state, crate::backend::TaskState::Success);
        assert_eq!(reports[1].1.outputs.as_ref().unwrap().stdout, vec!["print(1)".to_string()]);
    }

    #[tokio::test]
    async fn unregistered_command_is_unsupported() {
        let backend = InProcessBackend::new(HandlerRegistry::new(), 1);
        let sink = Arc::new(RecordingSink { reports: StdMutex::new(vec![]) });
        let command = Command { package_id: "nope".into(), command_id: "nope".into(), arguments: vec![] };

        let err = backend
            .execute(Identifier::new("t1"), command, Default::default(), project_context(), sink)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn cancel_before_completion_suppresses_the_report() {
        struct SlowHandler;
        #[async_trait]
        impl crate::handler::CommandHandler for SlowHandler {
            fn package_id(&self) -> &str {
                "pkg"
            }
            fn command_id(&self) -> &str {
                "slow"
            }
            async fn run(
                &self,
                _c: &Command,
                _d: &std::collections::BTreeMap<String, Identifier>,
                _p: &ProjectContext,
            ) -> Result<crate::handler::CommandOutcome, String> {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(crate::handler::CommandOutcome::default())
            }
        }

        let mut handlers = HandlerRegistry::new();
        handlers.register(Arc::new(SlowHandler));
        let backend = Arc::new(InProcessBackend::new(handlers, 4));
        let sink = Arc::new(RecordingSink { reports: StdMutex::new(vec![]) });
        let command = Command { package_id: "pkg".into(), command_id: "slow".into(), arguments: vec![] };

        let backend2 = backend.clone();
        let sink2 = sink.clone();
        let task = tokio::spawn(async move {
            backend2.execute(Identifier::new("t1"), command, Default::default(), project_context(), sink2).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        backend.cancel(&Identifier::new("t1")).await.unwrap();
        task.await.unwrap().unwrap();

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].1.state, crate::backend::TaskState::Running);
    }
}
