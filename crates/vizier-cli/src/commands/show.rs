// Branch history and notebook inspection commands

use crate::client::{Client, ClientError};
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};
use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};

use super::branch::Branch;

#[derive(Subcommand)]
pub enum ShowCommand {
    /// List the sequence of workflow snapshots committed to a branch
    History,

    /// Show every workflow snapshot on a branch, each with its module count
    Notebooks,

    /// Show a single workflow snapshot's modules (defaults to the head)
    Notebook {
        /// Workflow id (defaults to the branch head)
        workflow_id: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub identifier: String,
    pub branch_id: String,
    pub action: String,
    pub action_module_id: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub modules: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub identifier: String,
    pub external_form: String,
    pub state: String,
}

pub async fn run(
    command: ShowCommand,
    client: &Client,
    output: OutputFormat,
    project_id: String,
    branch_id: String,
) -> Result<()> {
    match command {
        ShowCommand::History => history(client, output, project_id, branch_id).await,
        ShowCommand::Notebooks => notebooks(client, output, project_id, branch_id).await,
        ShowCommand::Notebook { workflow_id } => notebook(client, output, branch_id, workflow_id).await,
    }
}

async fn fetch_branch(client: &Client, project_id: &str, branch_id: &str) -> Result<Branch> {
    Ok(client.get(&format!("/v1/projects/{project_id}/branches/{branch_id}")).await?)
}

async fn fetch_workflow(client: &Client, branch_id: &str, workflow_id: Option<&str>) -> Result<Workflow> {
    let url = match workflow_id {
        Some(id) => format!("/v1/branches/{branch_id}/workflow?workflow_id={id}"),
        None => format!("/v1/branches/{branch_id}/workflow"),
    };
    client.get(&url).await.map_err(|e| match e {
        ClientError::NotFound => anyhow::anyhow!("Workflow not found"),
        e => e.into(),
    })
}

async fn history(client: &Client, output: OutputFormat, project_id: String, branch_id: String) -> Result<()> {
    let branch = fetch_branch(client, &project_id, &branch_id).await?;

    if output.is_text() {
        if branch.workflow_history.is_empty() {
            println!("No workflows on this branch yet");
            return Ok(());
        }
        print_table_header(&[("WORKFLOW", 36), ("HEAD", 6)]);
        for workflow_id in &branch.workflow_history {
            let is_head = branch.head_workflow_id.as_deref() == Some(workflow_id.as_str());
            print_table_row(&[(workflow_id, 36), (if is_head { "*" } else { "" }, 6)]);
        }
    } else {
        output.print_value(&branch.workflow_history);
    }

    Ok(())
}

async fn notebooks(client: &Client, output: OutputFormat, project_id: String, branch_id: String) -> Result<()> {
    let branch = fetch_branch(client, &project_id, &branch_id).await?;

    let mut workflows = Vec::with_capacity(branch.workflow_history.len());
    for workflow_id in &branch.workflow_history {
        workflows.push(fetch_workflow(client, &branch_id, Some(workflow_id)).await?);
    }

    if output.is_text() {
        if workflows.is_empty() {
            println!("No workflows on this branch yet");
            return Ok(());
        }
        print_table_header(&[("WORKFLOW", 36), ("ACTION", 10), ("MODULES", 8)]);
        for workflow in &workflows {
            print_table_row(&[(&workflow.identifier, 36), (&workflow.action, 10), (&workflow.modules.len().to_string(), 8)]);
        }
    } else {
        output.print_value(&workflows);
    }

    Ok(())
}

async fn notebook(client: &Client, output: OutputFormat, branch_id: String, workflow_id: Option<String>) -> Result<()> {
    let workflow = fetch_workflow(client, &branch_id, workflow_id.as_deref()).await?;

    let mut modules = Vec::with_capacity(workflow.modules.len());
    for module_id in &workflow.modules {
        let module: Module = client.get(&format!("/v1/modules/{module_id}")).await?;
        modules.push(module);
    }

    if output.is_text() {
        print_field("Workflow", &workflow.identifier);
        print_field("Action", &workflow.action);
        print_field("Created", &workflow.created_at);
        println!();
        if modules.is_empty() {
            println!("No modules");
            return Ok(());
        }
        print_table_header(&[("#", 3), ("MODULE", 36), ("STATE", 10), ("COMMAND", 40)]);
        for (i, module) in modules.iter().enumerate() {
            print_table_row(&[(&(i + 1).to_string(), 3), (&module.identifier, 36), (&module.state, 10), (&module.external_form, 40)]);
        }
    } else {
        output.print_value(&serde_json::json!({ "workflow": workflow, "modules": modules }));
    }

    Ok(())
}
