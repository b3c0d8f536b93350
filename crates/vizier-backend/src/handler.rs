//! Pluggable command handlers for the in-process backend.
//!
//! The content of the Python runtime that executes user code is out of
//! scope for this repository (spec.md §1, Non-goals); what the engine
//! needs is a seam at which *some* executor can be plugged in and be
//! driven through the same visible-dataset-map contract every other
//! backend honors. `CommandHandler` is that seam, registered by
//! `(package_id, command_id)` the way the teacher's `WorkflowRegistry`
//! registers workflow factories by type name.

use std::collections::BTreeMap;

use async_trait::async_trait;
use vizier_core::{Command, Identifier, Outputs, Provenance};

use crate::backend::{BackendError, ProjectContext};

/// The result of a command handler running to completion. Carries
/// exactly the fields a module's terminal `SUCCESS` state needs.
#[derive(Debug, Clone, Default)]
pub struct CommandOutcome {
    pub outputs: Outputs,
    pub provenance: Provenance,
}

/// A single package command's executor.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn package_id(&self) -> &str;
    fn command_id(&self) -> &str;

    /// Run the command against the dataset map visible just before it
    /// executes. Returning `Err` records the module's terminal `ERROR`
    /// state with the error's message as stderr; it does not fail the
    /// edit operation that scheduled this module (spec.md §7).
    async fn run(
        &self,
        command: &Command,
        visible_datasets: &BTreeMap<String, Identifier>,
        project: &ProjectContext,
    ) -> Result<CommandOutcome, String>;
}

/// Registry of command handlers keyed by `(package_id, command_id)`.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<(String, String), std::sync::Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: std::sync::Arc<dyn CommandHandler>) {
        let key = (handler.package_id().to_string(), handler.command_id().to_string());
        self.handlers.insert(key, handler);
    }

    pub fn can_execute(&self, command: &Command) -> bool {
        self.handlers.contains_key(&(command.package_id.clone(), command.command_id.clone()))
    }

    /// `Ok(Err(message))` means the command ran and failed: a module
    /// `ERROR` state, not a `BackendError`. Only a missing handler is a
    /// `BackendError`, because that is a submission-time failure.
    pub async fn run(
        &self,
        command: &Command,
        visible_datasets: &BTreeMap<String, Identifier>,
        project: &ProjectContext,
    ) -> Result<Result<CommandOutcome, String>, BackendError> {
        let key = (command.package_id.clone(), command.command_id.clone());
        let handler = self.handlers.get(&key).ok_or_else(|| BackendError::Unsupported {
            package_id: command.package_id.clone(),
            command_id: command.command_id.clone(),
        })?;
        Ok(handler.run(command, visible_datasets, project).await)
    }
}
