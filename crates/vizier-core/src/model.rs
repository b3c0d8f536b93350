//! The Vizier data model: viztrails, branches, workflows, modules and the
//! typed command/provenance types that drive invalidation and reuse.
//!
//! Every entity is keyed by an [`Identifier`] minted by a `ViztrailStore`
//! implementation. Workflows reference modules by id rather than embedding
//! them, because modules are independently addressable and shared between
//! workflow snapshots (a workflow's history never rewrites a module body,
//! only the set of modules it observes at that point).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Identifier;

/// Well-known property key used for display in CLIs and UIs.
pub const PROPERTY_NAME: &str = "name";

/// A scalar or scalar-list property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(untagged)]
#[schema(value_type = Object)]
pub enum PropertyValue {
    Scalar(serde_json::Value),
    List(Vec<serde_json::Value>),
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// The complete edit history of a project, organized into branches.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Viztrail {
    pub identifier: Identifier,
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub branches: Vec<Identifier>,
    pub default_branch: Identifier,
}

/// A named linear history of workflows sharing a common ancestry.
///
/// Invariant: `head_workflow_id` is always the last entry of
/// `workflow_history`, or both are empty.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Branch {
    pub identifier: Identifier,
    pub viztrail_id: Identifier,
    pub properties: Properties,
    pub head_workflow_id: Option<Identifier>,
    pub workflow_history: Vec<Identifier>,
}

impl Branch {
    /// Check the store invariant that `head == last(history)`.
    pub fn head_matches_history(&self) -> bool {
        match (&self.head_workflow_id, self.workflow_history.last()) {
            (None, None) => true,
            (Some(head), Some(last)) => head == last,
            _ => false,
        }
    }
}

/// The action that produced a workflow, recorded for audit/CLI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowAction {
    Create,
    Append,
    Insert,
    Delete,
    Replace,
}

/// An immutable snapshot of a notebook: an ordered sequence of modules at
/// commit time. A workflow, once committed, never changes.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Workflow {
    pub identifier: Identifier,
    pub branch_id: Identifier,
    pub action: WorkflowAction,
    /// The module the action targeted (insertion/deletion/replacement
    /// point); `None` for the workflow created alongside a new branch.
    pub action_module_id: Option<Identifier>,
    pub created_at: DateTime<Utc>,
    /// Ordered references into the module store; modules are addressed
    /// independently and may be shared between workflows.
    pub modules: Vec<Identifier>,
}

/// A typed invocation of a package-defined operation, e.g.
/// `vizual.load_dataset` or `pycell.python_cell`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Command {
    pub package_id: String,
    pub command_id: String,
    pub arguments: Vec<Argument>,
}

/// A single named argument, typed by its declared kind.
///
/// Replaces the dynamic argument dictionaries of the source system with a
/// sum type: validation rejects unknown kinds up front instead of
/// discovering a type mismatch at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Argument {
    Scalar { name: String, value: serde_json::Value },
    ColumnRef { name: String, column: String },
    RowRef { name: String, row: i64 },
    FileRef { name: String, path: String },
    List { name: String, items: Vec<Argument> },
    Record { name: String, fields: BTreeMap<String, Argument> },
}

impl Argument {
    pub fn name(&self) -> &str {
        match self {
            Argument::Scalar { name, .. }
            | Argument::ColumnRef { name, .. }
            | Argument::RowRef { name, .. }
            | Argument::FileRef { name, .. }
            | Argument::List { name, .. }
            | Argument::Record { name, .. } => name,
        }
    }
}

/// Module execution state.
///
/// ```text
///   PENDING ──start──▶ RUNNING ──success──▶ SUCCESS
///      │                   │
///      │                   ├──failure──▶ ERROR    (terminal; stops branch)
///      │                   └──cancel───▶ CANCELED (terminal; stops branch)
///      └──cancel──▶ CANCELED
/// ```
///
/// Terminal states (`Canceled`, `Error`, `Success`) are monotonic: once
/// reached, a module's state never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleState {
    Pending,
    Running,
    Canceled,
    Error,
    Success,
}

impl ModuleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ModuleState::Canceled | ModuleState::Error | ModuleState::Success)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Outputs {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// A dataset written by a module: the new content-addressed id plus any
/// descriptive metadata the writing command attached.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DatasetDescriptor {
    pub dataset_id: Identifier,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// The triple (read, write, delete) of dataset names a module touched,
/// used to compute the visible dataset map and to drive reuse.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Provenance {
    pub read: BTreeMap<String, Identifier>,
    pub write: BTreeMap<String, DatasetDescriptor>,
    pub delete: Vec<String>,
    #[serde(default)]
    pub resources: serde_json::Value,
}

/// A single notebook cell: command + state + outputs + provenance.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Module {
    pub identifier: Identifier,
    pub command: Command,
    /// The rendered, human-readable form of `command` (retained across
    /// reuse even when outputs are discarded).
    pub external_form: String,
    pub state: ModuleState,
    pub timestamps: Timestamps,
    pub outputs: Outputs,
    pub provenance: Provenance,
    /// name -> dataset id visible just before this module executed:
    /// `datasets(i) = datasets(i-1) ∪ provenance.write - provenance.delete`.
    pub datasets: BTreeMap<String, Identifier>,
}

impl Module {
    /// Fold this module's provenance onto the dataset map visible before
    /// it ran, producing the map visible to the next module.
    ///
    /// `datasets(i) = datasets(i-1) ∪ provenance.write - provenance.delete`,
    /// evaluated left to right: a name written and deleted by the same
    /// module ends up absent, because `delete` applies last.
    pub fn fold_datasets(
        previous: &BTreeMap<String, Identifier>,
        provenance: &Provenance,
    ) -> BTreeMap<String, Identifier> {
        let mut next = previous.clone();
        for (name, descriptor) in &provenance.write {
            next.insert(name.clone(), descriptor.dataset_id.clone());
        }
        for name in &provenance.delete {
            next.remove(name);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_head_invariant_holds_for_empty_branch() {
        let branch = Branch {
            identifier: Identifier::new("b1"),
            viztrail_id: Identifier::new("vt1"),
            properties: Properties::new(),
            head_workflow_id: None,
            workflow_history: vec![],
        };
        assert!(branch.head_matches_history());
    }

    #[test]
    fn branch_head_invariant_holds_for_nonempty_branch() {
        let branch = Branch {
            identifier: Identifier::new("b1"),
            viztrail_id: Identifier::new("vt1"),
            properties: Properties::new(),
            head_workflow_id: Some(Identifier::new("w2")),
            workflow_history: vec![Identifier::new("w1"), Identifier::new("w2")],
        };
        assert!(branch.head_matches_history());
    }

    #[test]
    fn branch_head_invariant_detects_mismatch() {
        let branch = Branch {
            identifier: Identifier::new("b1"),
            viztrail_id: Identifier::new("vt1"),
            properties: Properties::new(),
            head_workflow_id: Some(Identifier::new("stale")),
            workflow_history: vec![Identifier::new("w1"), Identifier::new("w2")],
        };
        assert!(!branch.head_matches_history());
    }

    #[test]
    fn fold_datasets_deletes_a_name_not_touched_by_write() {
        let mut previous = BTreeMap::new();
        previous.insert("a".to_string(), Identifier::new("ds-a"));

        let mut provenance = Provenance::default();
        provenance.write.insert(
            "b".to_string(),
            DatasetDescriptor { dataset_id: Identifier::new("ds-b"), metadata: serde_json::Value::Null },
        );
        provenance.delete.push("a".to_string());

        let next = Module::fold_datasets(&previous, &provenance);
        assert_eq!(next.get("a"), None);
        assert_eq!(next.get("b").unwrap().as_str(), "ds-b");
    }

    #[test]
    fn fold_datasets_delete_wins_over_write_for_the_same_name() {
        let previous = BTreeMap::new();

        let mut provenance = Provenance::default();
        provenance.write.insert(
            "a".to_string(),
            DatasetDescriptor { dataset_id: Identifier::new("ds-a"), metadata: serde_json::Value::Null },
        );
        provenance.delete.push("a".to_string());

        let next = Module::fold_datasets(&previous, &provenance);
        assert_eq!(next.get("a"), None);
    }

    #[test]
    fn terminal_states_are_identified() {
        assert!(ModuleState::Success.is_terminal());
        assert!(ModuleState::Error.is_terminal());
        assert!(ModuleState::Canceled.is_terminal());
        assert!(!ModuleState::Pending.is_terminal());
        assert!(!ModuleState::Running.is_terminal());
    }

    #[test]
    fn argument_serialization_is_tagged_by_kind() {
        let arg = Argument::ColumnRef { name: "col".into(), column: "age".into() };
        let json = serde_json::to_string(&arg).unwrap();
        assert!(json.contains("\"kind\":\"column_ref\""));
        let parsed: Argument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, arg);
    }
}
