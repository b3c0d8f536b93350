//! `ProjectCache` trait definition.

use async_trait::async_trait;
use vizier_core::model::Properties;
use vizier_core::Identifier;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("project not found: {0}")]
    NotFound(Identifier),

    /// Backing storage for a project is missing or corrupt. Surfaced
    /// rather than silently omitted, so operators can repair it.
    #[error("project unavailable: {0}")]
    Unavailable(Identifier),

    #[error("io error: {0}")]
    Io(String),
}

/// A remote worker endpoint for a container-backed project.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ContainerEndpoint {
    pub url: String,
    pub port: u16,
    pub container_id: String,
}

/// Live, per-project state held by the cache.
#[derive(Debug, Clone)]
pub struct ProjectHandle {
    pub project_id: Identifier,
    /// Opaque handle to the project's datastore (the concrete storage
    /// backend is out of scope for this crate; it is looked up by the
    /// external datastore collaborator).
    pub datastore_handle: String,
    /// Opaque handle to the project's filestore.
    pub filestore_handle: String,
    /// Present for container-backed projects; `None` for in-process ones.
    pub container_endpoint: Option<ContainerEndpoint>,
}

/// The Project Cache contract.
///
/// `get_project` lazy-loads on first access and must not double-initialize
/// a project under concurrent callers (single-flight). A project whose
/// backing storage is missing or corrupt is surfaced as
/// [`CacheError::Unavailable`], never silently dropped from
/// [`ProjectCache::list_projects`].
#[async_trait]
pub trait ProjectCache: Send + Sync {
    async fn get_project(&self, id: &Identifier) -> Result<ProjectHandle, CacheError>;
    async fn list_projects(&self) -> Result<Vec<ProjectHandle>, CacheError>;
    async fn create_project(&self, properties: Properties) -> Result<ProjectHandle, CacheError>;
    async fn delete_project(&self, id: &Identifier) -> Result<bool, CacheError>;
}
