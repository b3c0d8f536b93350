// Dataset mutation commands

use crate::client::{Client, ClientError};
use crate::output::OutputFormat;
use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use super::show::Workflow;

#[derive(Subcommand)]
pub enum LoadSource {
    /// Load from a local file path
    File {
        /// Path to the source file
        path: String,
    },
    /// Load from a URL
    Url {
        /// Source URL
        url: String,
    },
}

#[derive(Debug, Serialize)]
struct AppendModuleRequest {
    command: Command,
}

#[derive(Debug, Serialize)]
struct Command {
    package_id: &'static str,
    command_id: &'static str,
    arguments: Vec<Argument>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Argument {
    Scalar { name: String, value: serde_json::Value },
    ColumnRef { name: String, column: String },
    RowRef { name: String, row: i64 },
    FileRef { name: String, path: String },
}

pub async fn load(
    client: &Client,
    output: OutputFormat,
    quiet: bool,
    branch_id: String,
    name: String,
    source: LoadSource,
) -> Result<()> {
    let path = match source {
        LoadSource::File { path } => path,
        LoadSource::Url { url } => url,
    };

    let request = AppendModuleRequest {
        command: Command {
            package_id: "vizual",
            command_id: "load_dataset",
            arguments: vec![
                Argument::Scalar { name: "name".to_string(), value: serde_json::Value::String(name) },
                Argument::FileRef { name: "file".to_string(), path },
            ],
        },
    };

    append(client, output, quiet, branch_id, request).await
}

#[allow(clippy::too_many_arguments)]
pub async fn update(
    client: &Client,
    output: OutputFormat,
    quiet: bool,
    branch_id: String,
    dataset: String,
    column: String,
    row: i64,
    value: String,
) -> Result<()> {
    let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));

    let request = AppendModuleRequest {
        command: Command {
            package_id: "vizual",
            command_id: "update_cell",
            arguments: vec![
                Argument::Scalar { name: "dataset".to_string(), value: serde_json::Value::String(dataset) },
                Argument::ColumnRef { name: "column".to_string(), column },
                Argument::RowRef { name: "row".to_string(), row },
                Argument::Scalar { name: "value".to_string(), value },
            ],
        },
    };

    append(client, output, quiet, branch_id, request).await
}

async fn append(client: &Client, output: OutputFormat, quiet: bool, branch_id: String, request: AppendModuleRequest) -> Result<()> {
    let workflow: Workflow = client
        .post(&format!("/v1/branches/{branch_id}/modules"), &request)
        .await
        .map_err(|e| match e {
            ClientError::NotFound => anyhow::anyhow!("Branch not found: {}", branch_id),
            e => e.into(),
        })?;

    let module_id = workflow.modules.last().cloned().unwrap_or_default();

    if output.is_text() {
        if quiet {
            println!("{module_id}");
        } else {
            println!("Appended module: {module_id}");
            println!("Workflow: {}", workflow.identifier);
        }
    } else {
        output.print_value(&workflow);
    }

    Ok(())
}
