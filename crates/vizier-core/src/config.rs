//! Process-wide configuration, loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Configuration shared by every Vizier binary (`vizier-api`, `vizier-cli`
/// against a remote server, and any future worker binary).
///
/// Loaded once at process start with [`VizierConfig::from_env`], following
/// the same `dotenvy::dotenv().ok()` + `std::env::var` + `.context(...)`
/// discipline the teacher's API server uses for `DATABASE_URL`. Every
/// field has a default so a bare `vizier-api` run against a fresh
/// directory works with no configuration at all.
#[derive(Debug, Clone)]
pub struct VizierConfig {
    /// Base directory of the filesystem Viztrail Store (see the persisted
    /// layout in the external interfaces section of the spec).
    pub storage_base: PathBuf,

    /// Address `vizier-api` binds to.
    pub bind_addr: String,

    /// Path to the container-backend manifest file, if container-backed
    /// projects are enabled.
    pub container_manifest: Option<PathBuf>,

    /// Maximum number of modules in-flight per branch. The spec requires
    /// exactly one; this exists as a safety valve, not a knob meant to be
    /// raised above 1 in production.
    pub max_concurrent_modules_per_branch: usize,

    /// Bound on workflow length the engine will accept before refusing
    /// further edits on a branch, mirroring the teacher's
    /// `ExecutorConfig::max_events_per_workflow` guard against runaway
    /// replay.
    pub max_modules_per_workflow: usize,

    /// How long the engine waits for a backend to acknowledge a task
    /// before treating it as unavailable.
    pub task_timeout: Duration,

    /// Poll backoff bounds for the container backend's adaptive retry,
    /// mirroring the teacher's `PollerConfig`.
    pub poll_min_interval: Duration,
    pub poll_max_interval: Duration,
}

impl Default for VizierConfig {
    fn default() -> Self {
        Self {
            storage_base: PathBuf::from("./vizier-data"),
            bind_addr: "0.0.0.0:9100".to_string(),
            container_manifest: None,
            max_concurrent_modules_per_branch: 1,
            max_modules_per_workflow: 10_000,
            task_timeout: Duration::from_secs(300),
            poll_min_interval: Duration::from_millis(100),
            poll_max_interval: Duration::from_secs(5),
        }
    }
}

impl VizierConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset. Reads a `.env` file if present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(base) = std::env::var("VIZIER_STORAGE_BASE") {
            config.storage_base = PathBuf::from(base);
        }
        if let Ok(addr) = std::env::var("VIZIER_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(manifest) = std::env::var("VIZIER_CONTAINER_MANIFEST") {
            config.container_manifest = Some(PathBuf::from(manifest));
        }
        if let Ok(raw) = std::env::var("VIZIER_MAX_MODULES_PER_WORKFLOW") {
            config.max_modules_per_workflow = raw
                .parse()
                .context("VIZIER_MAX_MODULES_PER_WORKFLOW must be a positive integer")?;
        }
        if let Ok(raw) = std::env::var("VIZIER_TASK_TIMEOUT_SECS") {
            let secs: u64 = raw
                .parse()
                .context("VIZIER_TASK_TIMEOUT_SECS must be a positive integer")?;
            config.task_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_storage_base(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_base = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_any_env() {
        let config = VizierConfig::default();
        assert_eq!(config.max_concurrent_modules_per_branch, 1);
        assert_eq!(config.storage_base, PathBuf::from("./vizier-data"));
    }
}
