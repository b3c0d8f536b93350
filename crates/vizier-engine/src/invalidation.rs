//! Invalidation & reuse: the heart of the design (spec.md §4.3).
//!
//! Canonical, conservative policy: modules above the edit point are
//! reused verbatim; the edited/inserted module and everything after it
//! is reset to `PENDING` with fresh module records. Exposed as a trait so
//! a future finer-grained reuse implementation (command-identity +
//! dataset-map matching) can be swapped in without touching
//! [`crate::branch_actor::BranchActor`] — spec.md §4.3 and §9 both leave
//! that as an optimization, not a requirement, so only the conservative
//! policy is implemented here.

use chrono::Utc;
use vizier_core::{id::new_id, Command, Module, ModuleState, Outputs, Provenance, Timestamps};
use vizier_store::ModuleRef;

/// A plan for the new workflow an edit produces: which existing modules
/// are reused verbatim, and which are brand new `PENDING` records.
/// `first_pending_index` is the position of the first module the engine
/// must schedule; every module before it is a terminal reuse.
pub struct EditPlan {
    pub modules: Vec<ModuleRef>,
    pub first_pending_index: usize,
}

/// Build the module record for a brand new, not-yet-run command.
fn pending_module(command: Command) -> Module {
    let external_form = render_external_form(&command);
    Module {
        identifier: new_id(),
        command,
        external_form,
        state: ModuleState::Pending,
        timestamps: Timestamps { created_at: Utc::now(), started_at: None, finished_at: None },
        outputs: Outputs::default(),
        provenance: Provenance::default(),
        datasets: Default::default(),
    }
}

/// Render a command's external form. A faithful reimplementation would
/// consult the package's display template; this renders
/// `package.command(arg=..., ...)`, which is enough for CLI/UI display
/// and is stable across re-runs of the same command.
pub fn render_external_form(command: &Command) -> String {
    let args: Vec<String> = command.arguments.iter().map(|a| a.name().to_string()).collect();
    format!("{}.{}({})", command.package_id, command.command_id, args.join(", "))
}

/// Reuse policy seam. `ReusePolicy::Conservative` is the only
/// implementation built; the trait exists so a finer-grained policy can
/// be substituted later without changing callers.
pub trait ReusePolicy: Send + Sync {
    /// `existing` is the head workflow's current module list (in order).
    /// Implementations decide, for an edit at `edit_index` in `kind`, how
    /// much of `existing` survives verbatim.
    fn plan_append(&self, existing: &[vizier_core::Identifier], command: Command) -> EditPlan;
    fn plan_insert(&self, existing: &[vizier_core::Identifier], existing_commands: &[Command], edit_index: usize, command: Command) -> EditPlan;
    fn plan_delete(&self, existing: &[vizier_core::Identifier], edit_index: usize, existing_commands: &[Command]) -> EditPlan;
    fn plan_replace(&self, existing: &[vizier_core::Identifier], existing_commands: &[Command], edit_index: usize, command: Command) -> EditPlan;
}

/// The conservative reuse policy spec.md §4.3 prescribes: reuse strictly
/// the prefix above the edit point; re-run everything from the edit
/// point onward, even when a finer analysis could prove some of those
/// modules' visible dataset maps are unchanged.
pub struct ConservativePolicy;

impl ReusePolicy for ConservativePolicy {
    fn plan_append(&self, existing: &[vizier_core::Identifier], command: Command) -> EditPlan {
        let mut modules: Vec<ModuleRef> = existing.iter().cloned().map(ModuleRef::Existing).collect();
        let first_pending_index = modules.len();
        modules.push(ModuleRef::New(pending_module(command)));
        EditPlan { modules, first_pending_index }
    }

    fn plan_insert(
        &self,
        existing: &[vizier_core::Identifier],
        existing_commands: &[Command],
        edit_index: usize,
        command: Command,
    ) -> EditPlan {
        let mut modules: Vec<ModuleRef> = existing[..edit_index].iter().cloned().map(ModuleRef::Existing).collect();
        let first_pending_index = modules.len();
        modules.push(ModuleRef::New(pending_module(command)));
        for tail_command in &existing_commands[edit_index..] {
            modules.push(ModuleRef::New(pending_module(tail_command.clone())));
        }
        EditPlan { modules, first_pending_index }
    }

    fn plan_delete(&self, existing: &[vizier_core::Identifier], edit_index: usize, existing_commands: &[Command]) -> EditPlan {
        let mut modules: Vec<ModuleRef> = existing[..edit_index].iter().cloned().map(ModuleRef::Existing).collect();
        let first_pending_index = modules.len();
        for tail_command in &existing_commands[edit_index + 1..] {
            modules.push(ModuleRef::New(pending_module(tail_command.clone())));
        }
        EditPlan { modules, first_pending_index }
    }

    fn plan_replace(
        &self,
        existing: &[vizier_core::Identifier],
        existing_commands: &[Command],
        edit_index: usize,
        command: Command,
    ) -> EditPlan {
        let mut modules: Vec<ModuleRef> = existing[..edit_index].iter().cloned().map(ModuleRef::Existing).collect();
        let first_pending_index = modules.len();
        modules.push(ModuleRef::New(pending_module(command)));
        for tail_command in &existing_commands[edit_index + 1..] {
            modules.push(ModuleRef::New(pending_module(tail_command.clone())));
        }
        EditPlan { modules, first_pending_index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vizier_core::Identifier;

    fn cmd(id: &str) -> Command {
        Command { package_id: "pkg".into(), command_id: id.into(), arguments: vec![] }
    }

    #[test]
    fn append_reuses_all_existing_and_adds_one_pending() {
        let existing = vec![Identifier::new("m1"), Identifier::new("m2")];
        let plan = ConservativePolicy.plan_append(&existing, cmd("new"));
        assert_eq!(plan.modules.len(), 3);
        assert_eq!(plan.first_pending_index, 2);
        assert!(matches!(plan.modules[0], ModuleRef::Existing(_)));
        assert!(matches!(plan.modules[2], ModuleRef::New(_)));
    }

    #[test]
    fn insert_reuses_prefix_and_resets_everything_from_edit_point() {
        let existing = vec![Identifier::new("m1"), Identifier::new("m2")];
        let commands = vec![cmd("load"), cmd("update")];
        let plan = ConservativePolicy.plan_insert(&existing, &commands, 1, cmd("noop"));

        // [m1 existing, new-noop, new-update(reset)]
        assert_eq!(plan.modules.len(), 3);
        assert_eq!(plan.first_pending_index, 1);
        assert!(matches!(plan.modules[0], ModuleRef::Existing(_)));
        assert!(matches!(plan.modules[1], ModuleRef::New(_)));
        assert!(matches!(plan.modules[2], ModuleRef::New(_)));
        if let ModuleRef::New(m) = &plan.modules[2] {
            assert_eq!(m.command.command_id, "update");
            assert_eq!(m.state, ModuleState::Pending);
        }
    }

    #[test]
    fn delete_drops_the_target_and_resets_the_tail() {
        let existing = vec![Identifier::new("m1"), Identifier::new("m2"), Identifier::new("m3")];
        let commands = vec![cmd("load"), cmd("project"), cmd("sort")];
        let plan = ConservativePolicy.plan_delete(&existing, 1, &commands);

        // [m1 existing, new-sort(reset)]
        assert_eq!(plan.modules.len(), 2);
        assert_eq!(plan.first_pending_index, 1);
        if let ModuleRef::New(m) = &plan.modules[1] {
            assert_eq!(m.command.command_id, "sort");
        }
    }

    #[test]
    fn replace_substitutes_the_target_and_resets_the_tail() {
        let existing = vec![Identifier::new("m1"), Identifier::new("m2")];
        let commands = vec![cmd("load"), cmd("update")];
        let plan = ConservativePolicy.plan_replace(&existing, &commands, 0, cmd("load2"));

        assert_eq!(plan.modules.len(), 2);
        assert_eq!(plan.first_pending_index, 0);
        if let ModuleRef::New(m) = &plan.modules[0] {
            assert_eq!(m.command.command_id, "load2");
        }
        if let ModuleRef::New(m) = &plan.modules[1] {
            assert_eq!(m.command.command_id, "update");
        }
    }
}
