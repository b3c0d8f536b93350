//! Per-process `ProjectCache` with single-flight lazy initialization.
//!
//! Grounded on the idempotent-start discipline of the teacher's worker
//! pool: two concurrent `get_project` calls for the same id must not
//! double-initialize it. A `tokio::sync::OnceCell` per project id gives
//! that for free — the first caller to reach the cell runs the
//! initializer, every other caller awaits its result.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OnceCell, RwLock};
use vizier_core::model::Properties;
use vizier_core::Identifier;
use vizier_store::ViztrailStore;

use crate::cache::{CacheError, ProjectCache, ProjectHandle};

/// Per-process, load-on-demand project cache backed by a `ViztrailStore`.
/// A project is a viztrail plus its derived datastore/filestore handles.
pub struct CommonProjectCache {
    store: Arc<dyn ViztrailStore>,
    handles: RwLock<HashMap<Identifier, Arc<OnceCell<Arc<ProjectHandle>>>>>,
}

impl CommonProjectCache {
    pub fn new(store: Arc<dyn ViztrailStore>) -> Self {
        Self { store, handles: RwLock::new(HashMap::new()) }
    }

    async fn cell_for(&self, id: &Identifier) -> Arc<OnceCell<Arc<ProjectHandle>>> {
        if let Some(cell) = self.handles.read().await.get(id) {
            return cell.clone();
        }
        let mut handles = self.handles.write().await;
        handles.entry(id.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
    }

    fn derive_handle(project_id: &Identifier) -> ProjectHandle {
        ProjectHandle {
            project_id: project_id.clone(),
            datastore_handle: format!("datastore://{}", project_id),
            filestore_handle: format!("filestore://{}", project_id),
            container_endpoint: None,
        }
    }
}

#[async_trait]
impl ProjectCache for CommonProjectCache {
    async fn get_project(&self, id: &Identifier) -> Result<ProjectHandle, CacheError> {
        let cell = self.cell_for(id).await;
        let handle = cell
            .get_or_try_init(|| async {
                self.store
                    .get_viztrail(id)
                    .await
                    .map(|_| Arc::new(Self::derive_handle(id)))
                    .map_err(|_| CacheError::Unavailable(id.clone()))
            })
            .await?;
        Ok((**handle).clone())
    }

    async fn list_projects(&self) -> Result<Vec<ProjectHandle>, CacheError> {
        let viztrails = self.store.list_viztrails().await.map_err(|e| CacheError::Io(e.to_string()))?;
        let mut out = Vec::with_capacity(viztrails.len());
        for vt in viztrails {
            out.push(self.get_project(&vt.identifier).await?);
        }
        Ok(out)
    }

    async fn create_project(&self, properties: Properties) -> Result<ProjectHandle, CacheError> {
        let viztrail = self
            .store
            .create_viztrail(properties)
            .await
            .map_err(|e| CacheError::Io(e.to_string()))?;
        let handle = Self::derive_handle(&viztrail.identifier);
        let cell = self.cell_for(&viztrail.identifier).await;
        let _ = cell.set(Arc::new(handle.clone()));
        Ok(handle)
    }

    async fn delete_project(&self, id: &Identifier) -> Result<bool, CacheError> {
        let deleted = self.store.delete_viztrail(id).await.map_err(|e| CacheError::Io(e.to_string()))?;
        self.handles.write().await.remove(id);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vizier_store::InMemoryViztrailStore;

    #[tokio::test]
    async fn create_then_get_returns_same_project() {
        let store: Arc<dyn ViztrailStore> = Arc::new(InMemoryViztrailStore::new());
        let cache = CommonProjectCache::new(store);

        let created = cache.create_project(Properties::new()).await.unwrap();
        let fetched = cache.get_project(&created.project_id).await.unwrap();

        assert_eq!(created.project_id, fetched.project_id);
    }

    #[tokio::test]
    async fn get_project_on_unknown_id_is_unavailable() {
        let store: Arc<dyn ViztrailStore> = Arc::new(InMemoryViztrailStore::new());
        let cache = CommonProjectCache::new(store);

        let result = cache.get_project(&Identifier::new("missing")).await;
        assert!(matches!(result, Err(CacheError::Unavailable(_))));
    }

    #[tokio::test]
    async fn concurrent_get_project_calls_single_flight() {
        let store: Arc<dyn ViztrailStore> = Arc::new(InMemoryViztrailStore::new());
        let cache = Arc::new(CommonProjectCache::new(store));
        let created = cache.create_project(Properties::new()).await.unwrap();

        // Force-clear the cell so both tasks race to initialize it.
        cache.handles.write().await.remove(&created.project_id);

        let calls = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let id = created.project_id.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                cache.get_project(&id).await
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }
}
