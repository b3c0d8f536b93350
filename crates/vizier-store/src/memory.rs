//! In-memory `ViztrailStore`, used by tests and by `vizier-engine`'s own
//! test suite. Modeled on the teacher's `InMemoryWorkflowEventStore`:
//! `parking_lot::RwLock`-guarded maps, plus a handful of test-only
//! inspection helpers.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use vizier_core::model::Properties;
use vizier_core::{id::new_id, Branch, Identifier, Module, Viztrail, Workflow, WorkflowAction};

use crate::store::{BranchSource, ModuleRef, ModuleUpdate, StoreError, ViztrailStore};

#[derive(Default)]
struct State {
    viztrails: HashMap<Identifier, Viztrail>,
    branches: HashMap<Identifier, Branch>,
    workflows: HashMap<Identifier, Workflow>,
    modules: HashMap<Identifier, Module>,
}

/// A process-local, non-durable `ViztrailStore`.
pub struct InMemoryViztrailStore {
    state: RwLock<State>,
}

impl InMemoryViztrailStore {
    pub fn new() -> Self {
        Self { state: RwLock::new(State::default()) }
    }

    /// Number of viztrails currently stored. Test helper.
    pub fn viztrail_count(&self) -> usize {
        self.state.read().viztrails.len()
    }

    /// Drop all state. Test helper.
    pub fn clear(&self) {
        *self.state.write() = State::default();
    }

    fn seed_workflow_modules(
        state: &State,
        source: &BranchSource,
    ) -> Result<Vec<Identifier>, StoreError> {
        let branch = state
            .branches
            .get(&source.source_branch)
            .ok_or_else(|| StoreError::BranchNotFound(source.source_branch.clone()))?;

        let workflow_id = match &source.source_workflow {
            Some(id) => id.clone(),
            None => branch
                .head_workflow_id
                .clone()
                .ok_or_else(|| StoreError::WorkflowNotFound(source.source_branch.clone()))?,
        };

        let workflow = state
            .workflows
            .get(&workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.clone()))?;

        let modules = match &source.source_module {
            Some(module_id) => {
                let cut = workflow
                    .modules
                    .iter()
                    .position(|id| id == module_id)
                    .ok_or_else(|| StoreError::ModuleNotFound(module_id.clone()))?;
                workflow.modules[..=cut].to_vec()
            }
            None => workflow.modules.clone(),
        };

        Ok(modules)
    }
}

impl Default for InMemoryViztrailStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ViztrailStore for InMemoryViztrailStore {
    async fn create_viztrail(&self, properties: Properties) -> Result<Viztrail, StoreError> {
        let mut state = self.state.write();

        let branch_id = new_id();
        let branch = Branch {
            identifier: branch_id.clone(),
            viztrail_id: Identifier::new(""), // patched below
            properties: Properties::new(),
            head_workflow_id: None,
            workflow_history: vec![],
        };

        let viztrail_id = new_id();
        let viztrail = Viztrail {
            identifier: viztrail_id.clone(),
            properties,
            created_at: Utc::now(),
            branches: vec![branch_id.clone()],
            default_branch: branch_id.clone(),
        };

        let mut branch = branch;
        branch.viztrail_id = viztrail_id.clone();

        state.branches.insert(branch_id, branch);
        state.viztrails.insert(viztrail_id, viztrail.clone());

        Ok(viztrail)
    }

    async fn delete_viztrail(&self, id: &Identifier) -> Result<bool, StoreError> {
        let mut state = self.state.write();
        let Some(viztrail) = state.viztrails.remove(id) else {
            return Ok(false);
        };

        for branch_id in &viztrail.branches {
            if let Some(branch) = state.branches.remove(branch_id) {
                for workflow_id in &branch.workflow_history {
                    if let Some(workflow) = state.workflows.remove(workflow_id) {
                        for module_id in &workflow.modules {
                            state.modules.remove(module_id);
                        }
                    }
                }
            }
        }

        Ok(true)
    }

    async fn list_viztrails(&self) -> Result<Vec<Viztrail>, StoreError> {
        Ok(self.state.read().viztrails.values().cloned().collect())
    }

    async fn get_viztrail(&self, id: &Identifier) -> Result<Viztrail, StoreError> {
        self.state
            .read()
            .viztrails
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ViztrailNotFound(id.clone()))
    }

    async fn create_branch(
        &self,
        viztrail_id: &Identifier,
        properties: Properties,
        source: Option<BranchSource>,
    ) -> Result<Branch, StoreError> {
        let mut state = self.state.write();

        if !state.viztrails.contains_key(viztrail_id) {
            return Err(StoreError::ViztrailNotFound(viztrail_id.clone()));
        }

        let seed_modules = match &source {
            Some(source) => Some(Self::seed_workflow_modules(&state, source)?),
            None => None,
        };

        let branch_id = new_id();
        let mut branch = Branch {
            identifier: branch_id.clone(),
            viztrail_id: viztrail_id.clone(),
            properties,
            head_workflow_id: None,
            workflow_history: vec![],
        };

        if let Some(modules) = seed_modules {
            let workflow_id = new_id();
            let workflow = Workflow {
                identifier: workflow_id.clone(),
                branch_id: branch_id.clone(),
                action: WorkflowAction::Create,
                action_module_id: None,
                created_at: Utc::now(),
                modules,
            };
            branch.head_workflow_id = Some(workflow_id.clone());
            branch.workflow_history.push(workflow_id.clone());
            state.workflows.insert(workflow_id, workflow);
        }

        state.branches.insert(branch_id.clone(), branch.clone());

        let viztrail = state.viztrails.get_mut(viztrail_id).unwrap();
        viztrail.branches.push(branch_id);

        Ok(branch)
    }

    async fn delete_branch(&self, viztrail_id: &Identifier, branch_id: &Identifier) -> Result<bool, StoreError> {
        let mut state = self.state.write();

        let viztrail = state
            .viztrails
            .get(viztrail_id)
            .ok_or_else(|| StoreError::ViztrailNotFound(viztrail_id.clone()))?;

        if viztrail.branches.len() <= 1 {
            return Err(StoreError::LastBranch);
        }

        let Some(branch) = state.branches.remove(branch_id) else {
            return Ok(false);
        };

        for workflow_id in &branch.workflow_history {
            state.workflows.remove(workflow_id);
        }

        let viztrail = state.viztrails.get_mut(viztrail_id).unwrap();
        viztrail.branches.retain(|id| id != branch_id);
        if viztrail.default_branch == *branch_id {
            if let Some(next) = viztrail.branches.first().cloned() {
                viztrail.default_branch = next;
            }
        }

        Ok(true)
    }

    async fn get_branch(&self, _viztrail_id: &Identifier, branch_id: &Identifier) -> Result<Branch, StoreError> {
        self.state
            .read()
            .branches
            .get(branch_id)
            .cloned()
            .ok_or_else(|| StoreError::BranchNotFound(branch_id.clone()))
    }

    async fn list_branches(&self, viztrail_id: &Identifier) -> Result<Vec<Branch>, StoreError> {
        let state = self.state.read();
        let viztrail = state
            .viztrails
            .get(viztrail_id)
            .ok_or_else(|| StoreError::ViztrailNotFound(viztrail_id.clone()))?;
        Ok(viztrail
            .branches
            .iter()
            .filter_map(|id| state.branches.get(id).cloned())
            .collect())
    }

    async fn owning_viztrail(&self, branch_id: &Identifier) -> Result<Identifier, StoreError> {
        self.state
            .read()
            .branches
            .get(branch_id)
            .map(|b| b.viztrail_id.clone())
            .ok_or_else(|| StoreError::BranchNotFound(branch_id.clone()))
    }

    async fn append_workflow(
        &self,
        branch_id: &Identifier,
        action: WorkflowAction,
        action_module_id: Option<Identifier>,
        modules: Vec<ModuleRef>,
    ) -> Result<Workflow, StoreError> {
        let mut state = self.state.write();

        if !state.branches.contains_key(branch_id) {
            return Err(StoreError::BranchNotFound(branch_id.clone()));
        }

        // Phase 1: durably write every brand new module record.
        let mut module_ids = Vec::with_capacity(modules.len());
        for module_ref in modules {
            match module_ref {
                ModuleRef::Existing(id) => {
                    if !state.modules.contains_key(&id) {
                        return Err(StoreError::ModuleNotFound(id));
                    }
                    module_ids.push(id);
                }
                ModuleRef::New(module) => {
                    let id = module.identifier.clone();
                    state.modules.insert(id.clone(), module);
                    module_ids.push(id);
                }
            }
        }

        // Phase 2: write the workflow record referencing them.
        let workflow_id = new_id();
        let workflow = Workflow {
            identifier: workflow_id.clone(),
            branch_id: branch_id.clone(),
            action,
            action_module_id,
            created_at: Utc::now(),
            modules: module_ids,
        };
        state.workflows.insert(workflow_id.clone(), workflow.clone());

        // Phase 3: swap the branch head pointer.
        let branch = state.branches.get_mut(branch_id).unwrap();
        branch.head_workflow_id = Some(workflow_id.clone());
        branch.workflow_history.push(workflow_id);

        Ok(workflow)
    }

    async fn get_workflow(&self, branch_id: &Identifier, workflow_id: Option<&Identifier>) -> Result<Workflow, StoreError> {
        let state = self.state.read();

        let workflow_id = match workflow_id {
            Some(id) => id.clone(),
            None => {
                let branch = state
                    .branches
                    .get(branch_id)
                    .ok_or_else(|| StoreError::BranchNotFound(branch_id.clone()))?;
                branch
                    .head_workflow_id
                    .clone()
                    .ok_or_else(|| StoreError::WorkflowNotFound(branch_id.clone()))?
            }
        };

        state
            .workflows
            .get(&workflow_id)
            .cloned()
            .ok_or(StoreError::WorkflowNotFound(workflow_id))
    }

    async fn get_module(&self, module_id: &Identifier) -> Result<Module, StoreError> {
        self.state
            .read()
            .modules
            .get(module_id)
            .cloned()
            .ok_or_else(|| StoreError::ModuleNotFound(module_id.clone()))
    }

    async fn update_module(&self, module_id: &Identifier, update: ModuleUpdate) -> Result<Module, StoreError> {
        let mut state = self.state.write();
        let module = state
            .modules
            .get_mut(module_id)
            .ok_or_else(|| StoreError::ModuleNotFound(module_id.clone()))?;

        if module.state.is_terminal() {
            return Ok(module.clone());
        }

        if let Some(state_update) = update.state {
            module.state = state_update;
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

        Ok(module.clone())
    }

    async fn update_viztrail_properties(&self, id: &Identifier, properties: Properties) -> Result<Viztrail, StoreError> {
        let mut state = self.state.write();
        let viztrail = state.viztrails.get_mut(id).ok_or_else(|| StoreError::ViztrailNotFound(id.clone()))?;
        viztrail.properties = properties;
        Ok(viztrail.clone())
    }

    async fn update_branch_properties(
        &self,
        _viztrail_id: &Identifier,
        branch_id: &Identifier,
        properties: Properties,
    ) -> Result<Branch, StoreError> {
        let mut state = self.state.write();
        let branch = state.branches.get_mut(branch_id).ok_or_else(|| StoreError::BranchNotFound(branch_id.clone()))?;
        branch.properties = properties;
        Ok(branch.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vizier_core::model::{Command, Module as ModuleModel, ModuleState, Outputs as OutputsModel, Provenance as ProvenanceModel, Timestamps};

    fn blank_module(state: vizier_core::ModuleState) -> ModuleModel {
        ModuleModel {
            identifier: new_id(),
            command: Command { package_id: "pkg".into(), command_id: "cmd".into(), arguments: vec![] },
            external_form: "cmd()".into(),
            state,
            timestamps: Timestamps { created_at: Utc::now(), started_at: None, finished_at: None },
            outputs: OutputsModel::default(),
            provenance: ProvenanceModel::default(),
            datasets: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn create_and_get_viztrail_round_trips() {
        let store = InMemoryViztrailStore::new();
        let vt = store.create_viztrail(Properties::new()).await.unwrap();
        let fetched = store.get_viztrail(&vt.identifier).await.unwrap();
        assert_eq!(vt.identifier, fetched.identifier);
        assert_eq!(fetched.branches.len(), 1);
    }

    #[tokio::test]
    async fn append_workflow_publishes_new_head_atomically() {
        let store = InMemoryViztrailStore::new();
        let vt = store.create_viztrail(Properties::new()).await.unwrap();
        let branch_id = vt.default_branch.clone();

        let module = blank_module(ModuleState::Pending);
        let module_id = module.identifier.clone();

        let workflow = store
            .append_workflow(&branch_id, WorkflowAction::Append, None, vec![ModuleRef::New(module)])
            .await
            .unwrap();

        assert_eq!(workflow.modules, vec![module_id]);

        let branch = store.get_branch(&vt.identifier, &branch_id).await.unwrap();
        assert_eq!(branch.head_workflow_id, Some(workflow.identifier));
        assert!(branch.head_matches_history());
    }

    #[tokio::test]
    async fn delete_branch_forbidden_when_it_is_the_only_one() {
        let store = InMemoryViztrailStore::new();
        let vt = store.create_viztrail(Properties::new()).await.unwrap();
        let result = store.delete_branch(&vt.identifier, &vt.default_branch).await;
        assert!(matches!(result, Err(StoreError::LastBranch)));
    }

    #[tokio::test]
    async fn terminal_module_state_is_monotonic() {
        let store = InMemoryViztrailStore::new();
        let vt = store.create_viztrail(Properties::new()).await.unwrap();
        let branch_id = vt.default_branch.clone();

        let module = blank_module(ModuleState::Running);
        let module_id = module.identifier.clone();
        store
            .append_workflow(&branch_id, WorkflowAction::Append, None, vec![ModuleRef::New(module)])
            .await
            .unwrap();

        store
            .update_module(&module_id, ModuleUpdate { state: Some(ModuleState::Success), ..Default::default() })
            .await
            .unwrap();

        // A late, superseding report must be dropped: terminal states never change.
        let after = store
            .update_module(&module_id, ModuleUpdate { state: Some(ModuleState::Error), ..Default::default() })
            .await
            .unwrap();

        assert_eq!(after.state, ModuleState::Success);
    }

    #[tokio::test]
    async fn create_branch_seeds_prefix_from_source() {
        let store = InMemoryViztrailStore::new();
        let vt = store.create_viztrail(Properties::new()).await.unwrap();
        let branch_id = vt.default_branch.clone();

        let m1 = blank_module(ModuleState::Success);
        let m1_id = m1.identifier.clone();
        let m2 = blank_module(ModuleState::Success);

        store
            .append_workflow(&branch_id, WorkflowAction::Append, None, vec![ModuleRef::New(m1), ModuleRef::New(m2)])
            .await
            .unwrap();

        let new_branch = store
            .create_branch(
                &vt.identifier,
                Properties::new(),
                Some(BranchSource { source_branch: branch_id.clone(), source_workflow: None, source_module: Some(m1_id.clone()) }),
            )
            .await
            .unwrap();

        let workflow = store.get_workflow(&new_branch.identifier, None).await.unwrap();
        assert_eq!(workflow.modules, vec![m1_id]);
    }
}
