//! Toy `CommandHandler`s covering the commands named in spec.md's
//! end-to-end scenarios (§8): `pycell.python_cell` and a handful of
//! `vizual.*` dataset operations. These are deliberately simple — the
//! real Python runtime and Mimir/vizual engine are external collaborators
//! (spec.md §1) — but they are deterministic functions of their visible
//! dataset map, which is all `vizier-engine`'s reuse policy requires of a
//! handler to exercise it end-to-end in tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use vizier_core::{Argument, Command, DatasetDescriptor, Identifier, Outputs, Provenance};

use crate::backend::ProjectContext;
use crate::handler::{CommandHandler, CommandOutcome};

fn scalar_arg<'a>(command: &'a Command, name: &str) -> Option<&'a serde_json::Value> {
    command.arguments.iter().find_map(|a| match a {
        Argument::Scalar { name: n, value } if n == name => Some(value),
        _ => None,
    })
}

fn string_arg(command: &Command, name: &str) -> Option<String> {
    scalar_arg(command, name).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// `pycell.python_cell { code: string }`. Does not touch datasets; writes
/// the literal `code` argument to stdout, which is enough determinism for
/// reuse tests without pretending to run Python.
pub struct PythonCellHandler;

#[async_trait]
impl CommandHandler for PythonCellHandler {
    fn package_id(&self) -> &str {
        "pycell"
    }

    fn command_id(&self) -> &str {
        "python_cell"
    }

    async fn run(
        &self,
        command: &Command,
        _visible_datasets: &BTreeMap<String, Identifier>,
        _project: &ProjectContext,
    ) -> Result<CommandOutcome, String> {
        let code = string_arg(command, "code").unwrap_or_default();
        Ok(CommandOutcome { outputs: Outputs { stdout: vec![code], stderr: vec![] }, provenance: Provenance::default() })
    }
}

/// `vizual.load_dataset { name: string, file: file_ref }`. Mints a fresh
/// content-addressed dataset id and writes it under `name`.
pub struct LoadDatasetHandler {
    next_id: AtomicU64,
}

impl LoadDatasetHandler {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1) }
    }
}

impl Default for LoadDatasetHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandHandler for LoadDatasetHandler {
    fn package_id(&self) -> &str {
        "vizual"
    }

    fn command_id(&self) -> &str {
        "load_dataset"
    }

    async fn run(
        &self,
        command: &Command,
        _visible_datasets: &BTreeMap<String, Identifier>,
        _project: &ProjectContext,
    ) -> Result<CommandOutcome, String> {
        let name = string_arg(command, "name").ok_or("missing 'name' argument")?;
        let file = command
            .arguments
            .iter()
            .find_map(|a| match a {
                Argument::FileRef { name: n, path } if n == "file" => Some(path.clone()),
                _ => None,
            })
            .ok_or("missing 'file' argument")?;

        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let dataset_id = Identifier::new(format!("ds-{name}-{seq}"));

        let mut provenance = Provenance::default();
        provenance.write.insert(
            name,
            DatasetDescriptor { dataset_id, metadata: serde_json::json!({"source": file}) },
        );

        Ok(CommandOutcome { outputs: Outputs::default(), provenance })
    }
}

/// `vizual.update_cell { dataset: string, column: column_ref, row: row_ref,
/// value: scalar }`. Reads the current dataset id under `dataset` and
/// writes a new one under the same name, simulating the content-addressed
/// rewrite every mutating vizual operation performs.
pub struct UpdateCellHandler {
    next_id: AtomicU64,
}

impl UpdateCellHandler {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1) }
    }
}

impl Default for UpdateCellHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandHandler for UpdateCellHandler {
    fn package_id(&self) -> &str {
        "vizual"
    }

    fn command_id(&self) -> &str {
        "update_cell"
    }

    async fn run(
        &self,
        command: &Command,
        visible_datasets: &BTreeMap<String, Identifier>,
        _project: &ProjectContext,
    ) -> Result<CommandOutcome, String> {
        let dataset = string_arg(command, "dataset").ok_or("missing 'dataset' argument")?;
        let current = visible_datasets.get(&dataset).ok_or(format!("unknown dataset '{dataset}'"))?;

        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let dataset_id = Identifier::new(format!("{}-upd{}", current.as_str(), seq));

        let mut provenance = Provenance::default();
        provenance.read.insert(dataset.clone(), current.clone());
        provenance
            .write
            .insert(dataset, DatasetDescriptor { dataset_id, metadata: serde_json::Value::Null });

        Ok(CommandOutcome { outputs: Outputs::default(), provenance })
    }
}

/// `vizual.drop_dataset { name: string }`. Removes a name from the
/// visible dataset map.
pub struct DropDatasetHandler;

#[async_trait]
impl CommandHandler for DropDatasetHandler {
    fn package_id(&self) -> &str {
        "vizual"
    }

    fn command_id(&self) -> &str {
        "drop_dataset"
    }

    async fn run(
        &self,
        command: &Command,
        visible_datasets: &BTreeMap<String, Identifier>,
        _project: &ProjectContext,
    ) -> Result<CommandOutcome, String> {
        let name = string_arg(command, "name").ok_or("missing 'name' argument")?;
        if !visible_datasets.contains_key(&name) {
            return Err(format!("unknown dataset '{name}'"));
        }
        Ok(CommandOutcome { outputs: Outputs::default(), provenance: Provenance { delete: vec![name], ..Default::default() } })
    }
}
