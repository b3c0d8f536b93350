//! Container-backed `ProjectCache`, read-through over a manifest file.
//!
//! Grounded on the teacher's `TaskPoller`/`WorkerPoolConfig` read-through
//! discipline (`durable/src/worker/poller.rs`): this cache never starts a
//! container itself, it only reads the manifest that an external
//! orchestrator maintains and reconciles its view on each access, the way
//! the poller re-reads store state on every tick rather than caching a
//! stale snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use vizier_core::model::Properties;
use vizier_core::Identifier;

use crate::cache::{CacheError, ContainerEndpoint, ProjectCache, ProjectHandle};

/// One row of the container-backend manifest file: `{projectId, url, port,
/// containerId}` per spec.md §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerManifestEntry {
    #[serde(rename = "projectId")]
    pub project_id: Identifier,
    pub url: String,
    pub port: u16,
    #[serde(rename = "containerId")]
    pub container_id: String,
}

/// A `ProjectCache` backed by a persisted manifest of remote worker
/// endpoints. Read-through: every call re-reads the manifest file and
/// reconciles against it rather than trusting an in-memory copy, because
/// the manifest is owned and mutated by an external orchestrator that
/// starts and stops containers outside this process.
pub struct ContainerProjectCache {
    manifest_path: PathBuf,
    cached: RwLock<HashMap<Identifier, ContainerManifestEntry>>,
}

impl ContainerProjectCache {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self { manifest_path: manifest_path.into(), cached: RwLock::new(HashMap::new()) }
    }

    async fn reload(&self) -> Result<HashMap<Identifier, ContainerManifestEntry>, CacheError> {
        let entries = read_manifest(&self.manifest_path).await?;
        let map: HashMap<_, _> = entries.into_iter().map(|e| (e.project_id.clone(), e)).collect();
        *self.cached.write().await = map.clone();
        Ok(map)
    }

    fn to_handle(entry: &ContainerManifestEntry) -> ProjectHandle {
        ProjectHandle {
            project_id: entry.project_id.clone(),
            datastore_handle: format!("datastore://{}", entry.project_id),
            filestore_handle: format!("filestore://{}", entry.project_id),
            container_endpoint: Some(ContainerEndpoint {
                url: entry.url.clone(),
                port: entry.port,
                container_id: entry.container_id.clone(),
            }),
        }
    }
}

async fn read_manifest(path: &Path) -> Result<Vec<ContainerManifestEntry>, CacheError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Io(format!("malformed manifest: {e}")))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(CacheError::Io(e.to_string())),
    }
}

#[async_trait]
impl ProjectCache for ContainerProjectCache {
    async fn get_project(&self, id: &Identifier) -> Result<ProjectHandle, CacheError> {
        let map = self.reload().await?;
        map.get(id).map(Self::to_handle).ok_or_else(|| CacheError::NotFound(id.clone()))
    }

    async fn list_projects(&self) -> Result<Vec<ProjectHandle>, CacheError> {
        let map = self.reload().await?;
        Ok(map.values().map(Self::to_handle).collect())
    }

    /// The container cache never starts containers itself; it has no
    /// mechanism to mint a new manifest row. Creation is the external
    /// orchestrator's job, reached through a different collaborator.
    async fn create_project(&self, _properties: Properties) -> Result<ProjectHandle, CacheError> {
        Err(CacheError::Io("container-backed projects are provisioned externally; this cache is read-only".into()))
    }

    async fn delete_project(&self, _id: &Identifier) -> Result<bool, CacheError> {
        Err(CacheError::Io("container-backed projects are deprovisioned externally; this cache is read-only".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_manifest(dir: &tempfile::TempDir, entries: &[ContainerManifestEntry]) -> PathBuf {
        let path = dir.path().join("manifest.json");
        tokio::fs::write(&path, serde_json::to_vec(entries).unwrap()).await.unwrap();
        path
    }

    #[tokio::test]
    async fn list_projects_reflects_manifest_contents() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            ContainerManifestEntry { project_id: Identifier::new("P1"), url: "API1".into(), port: 80, container_id: "ID1".into() },
            ContainerManifestEntry { project_id: Identifier::new("P2"), url: "API2".into(), port: 81, container_id: "ID2".into() },
        ];
        let path = write_manifest(&dir, &entries).await;

        let cache = ContainerProjectCache::new(path);
        let projects = cache.list_projects().await.unwrap();
        assert_eq!(projects.len(), 2);

        let p1 = cache.get_project(&Identifier::new("P1")).await.unwrap();
        assert_eq!(p1.container_endpoint.unwrap().url, "API1");
    }

    #[tokio::test]
    async fn missing_manifest_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContainerProjectCache::new(dir.path().join("does-not-exist.json"));
        assert_eq!(cache.list_projects().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(&dir, &[]).await;
        let cache = ContainerProjectCache::new(path);
        let err = cache.get_project(&Identifier::new("ghost")).await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound(_)));
    }

    #[tokio::test]
    async fn reconciles_when_manifest_changes_between_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(&dir, &[]).await;
        let cache = ContainerProjectCache::new(path.clone());
        assert_eq!(cache.list_projects().await.unwrap().len(), 0);

        let entries = vec![ContainerManifestEntry {
            project_id: Identifier::new("P1"),
            url: "API1".into(),
            port: 80,
            container_id: "ID1".into(),
        }];
        tokio::fs::write(&path, serde_json::to_vec(&entries).unwrap()).await.unwrap();

        assert_eq!(cache.list_projects().await.unwrap().len(), 1);
    }
}
