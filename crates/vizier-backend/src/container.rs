//! Remote/container backend.
//!
//! Each project runs in its own worker at the `(url, port, container_id)`
//! endpoint the Project Cache resolved (spec.md §4.2, §6). Submission is
//! a plain POST to the worker's task endpoint; the worker reports
//! progress back by calling the controller's task-state callback, which
//! is wired up entirely outside this crate (`vizier-api`'s route handler
//! forwards into a [`TaskStateSink`]) — this backend only performs the
//! submit and cancel legs. Grounded on `everruns-worker/src/providers/
//! openai.rs`'s `reqwest::Client` usage and on `durable/src/worker/
//! poller.rs`'s retry-by-the-caller discipline: a connection failure
//! becomes `BackendError::Unavailable`, never a silent retry loop here.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use vizier_cache::ContainerEndpoint;
use vizier_core::{Command, Identifier};

use crate::backend::{Backend, BackendError, ProjectContext, TaskStateSink};

#[derive(Debug, Serialize)]
struct SubmitTaskRequest<'a> {
    #[serde(rename = "taskId")]
    task_id: &'a str,
    command: &'a Command,
    #[serde(rename = "visibleDatasets")]
    visible_datasets: &'a BTreeMap<String, Identifier>,
}

/// Submits commands to a per-project remote worker over HTTP. Progress
/// reports arrive out-of-band via the worker's callback to
/// `vizier-api`'s task-state route, not through this type — so `execute`
/// here only has to succeed or fail at *submission* time.
pub struct ContainerBackend {
    client: Client,
    /// Every command is accepted sight-unseen; a container backend trusts
    /// the remote worker to validate, unlike the in-process backend's
    /// local handler registry.
    accept_all: bool,
    /// task_id -> the endpoint it was submitted to, so `cancel` knows
    /// where to POST without the caller having to resolve the project
    /// again.
    active: Mutex<std::collections::HashMap<Identifier, ContainerEndpoint>>,
}

impl ContainerBackend {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_else(|_| Client::new()),
            accept_all: true,
            active: Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn endpoint_url(endpoint: &ContainerEndpoint, path: &str) -> String {
        format!("{}:{}{}", endpoint.url.trim_end_matches('/'), endpoint.port, path)
    }
}

#[async_trait]
impl Backend for ContainerBackend {
    fn can_execute(&self, _command: &Command) -> bool {
        self.accept_all
    }

    #[instrument(skip(self, command, visible_datasets, project, _sink), fields(task_id = %task_id))]
    async fn execute(
        &self,
        task_id: Identifier,
        command: Command,
        visible_datasets: BTreeMap<String, Identifier>,
        project: ProjectContext,
        _sink: Arc<dyn TaskStateSink>,
    ) -> Result<(), BackendError> {
        let endpoint = project
            .container_endpoint
            .as_ref()
            .ok_or_else(|| BackendError::Unavailable(format!("project {} has no container endpoint", project.project_id)))?;

        let url = Self::endpoint_url(endpoint, "/tasks");
        let body = SubmitTaskRequest { task_id: task_id.as_str(), command: &command, visible_datasets: &visible_datasets };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(format!("worker unreachable at {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(BackendError::Unavailable(format!("worker rejected task {task_id}: HTTP {}", response.status())));
        }

        self.active.lock().await.insert(task_id, endpoint.clone());
        Ok(())
    }

    async fn cancel(&self, task_id: &Identifier) -> Result<(), BackendError> {
        let Some(endpoint) = self.active.lock().await.remove(task_id) else {
            // Never submitted here, or already finished; nothing to cancel.
            return Ok(());
        };

        let url = Self::endpoint_url(&endpoint, &format!("/tasks/{task_id}/cancel"));
        // Best-effort: the caller has already flipped the module to
        // CANCELED locally, so a failure to reach the worker here is
        // logged, not propagated — any late success/error report the
        // worker still sends is dropped by the engine regardless.
        if let Err(e) = self.client.post(&url).send().await {
            warn!(%task_id, error = %e, "failed to deliver cancel to worker; module is already CANCELED locally");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_joins_scheme_port_and_path() {
        let endpoint = ContainerEndpoint { url: "http://worker1".into(), port: 8080, container_id: "c1".into() };
        assert_eq!(ContainerBackend::endpoint_url(&endpoint, "/tasks"), "http://worker1:8080/tasks");
    }
}
