// Cell execution commands

use crate::client::{Client, ClientError};
use crate::output::OutputFormat;
use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use super::show::Workflow;

#[derive(Subcommand)]
pub enum RunCommand {
    /// Append a Python cell. `target` is read as a file path if it
    /// exists on disk, otherwise treated as literal code.
    Python {
        /// File path or literal code
        target: String,
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
}

pub async fn run(command: RunCommand, client: &Client, output: OutputFormat, quiet: bool, branch_id: String) -> Result<()> {
    match command {
        RunCommand::Python { target } => python(client, output, quiet, branch_id, target).await,
    }
}

async fn python(client: &Client, output: OutputFormat, quiet: bool, branch_id: String, target: String) -> Result<()> {
    let code = match std::fs::read_to_string(&target) {
        Ok(contents) => contents,
        Err(_) => target,
    };

    let request = AppendModuleRequest {
        command: Command {
            package_id: "pycell",
            command_id: "python_cell",
            arguments: vec![Argument::Scalar { name: "code".to_string(), value: serde_json::Value::String(code) }],
        },
    };

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
