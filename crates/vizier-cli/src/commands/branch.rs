// Branch management commands

use crate::client::{Client, ClientError};
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};
use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};

#[derive(Subcommand)]
pub enum BranchCommand {
    /// Create a new branch
    Create {
        /// Owning project id
        project_id: String,

        /// Human-readable branch name
        #[arg(long)]
        name: Option<String>,

        /// Seed the new branch from a prefix of another branch's workflow
        #[arg(long)]
        source_branch: Option<String>,

        /// Workflow to copy from (defaults to `source_branch`'s head)
        #[arg(long, requires = "source_branch")]
        source_workflow: Option<String>,

        /// Truncate the copied prefix at this module, inclusive
        #[arg(long, requires = "source_branch")]
        source_module: Option<String>,
    },

    /// List all branches of a project
    List {
        /// Project id
        project_id: String,
    },

    /// Rename a branch
    Rename {
        /// Project id
        project_id: String,

        /// Branch id
        branch_id: String,

        /// New branch name
        name: String,
    },

    /// Delete a branch
    Delete {
        /// Project id
        project_id: String,

        /// Branch id
        branch_id: String,
    },
}

#[derive(Debug, Serialize)]
struct CreateBranchRequest {
    properties: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_workflow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_module: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub identifier: String,
    pub viztrail_id: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    pub head_workflow_id: Option<String>,
    #[serde(default)]
    pub workflow_history: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

fn name_property(name: Option<String>) -> serde_json::Value {
    match name {
        Some(name) => serde_json::json!({ "name": name }),
        None => serde_json::json!({}),
    }
}

fn display_name(branch: &Branch) -> &str {
    branch.properties.get("name").and_then(|v| v.as_str()).unwrap_or("-")
}

pub async fn run(command: BranchCommand, client: &Client, output: OutputFormat, quiet: bool) -> Result<()> {
    match command {
        BranchCommand::Create { project_id, name, source_branch, source_workflow, source_module } => {
            create(client, output, quiet, project_id, name, source_branch, source_workflow, source_module).await
        }
        BranchCommand::List { project_id } => list(client, output, project_id).await,
        BranchCommand::Rename { project_id, branch_id, name } => rename(client, output, project_id, branch_id, name).await,
        BranchCommand::Delete { project_id, branch_id } => delete(client, output, quiet, project_id, branch_id).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn create(
    client: &Client,
    output: OutputFormat,
    quiet: bool,
    project_id: String,
    name: Option<String>,
    source_branch: Option<String>,
    source_workflow: Option<String>,
    source_module: Option<String>,
) -> Result<()> {
    let request =
        CreateBranchRequest { properties: name_property(name), source_branch, source_workflow, source_module };
    let branch: Branch = client.post(&format!("/v1/projects/{project_id}/branches"), &request).await?;

    if output.is_text() {
        if quiet {
            println!("{}", branch.identifier);
        } else {
            println!("Created branch: {}", branch.identifier);
            print_field("Name", display_name(&branch));
        }
    } else {
        output.print_value(&branch);
    }

    Ok(())
}

async fn list(client: &Client, output: OutputFormat, project_id: String) -> Result<()> {
    let response: ListResponse<Branch> = client.get(&format!("/v1/projects/{project_id}/branches")).await?;

    if output.is_text() {
        if response.data.is_empty() {
            println!("No branches found");
            return Ok(());
        }

        print_table_header(&[("ID", 36), ("NAME", 20), ("HEAD WORKFLOW", 36)]);
        for branch in &response.data {
            print_table_row(&[
                (&branch.identifier, 36),
                (display_name(branch), 20),
                (branch.head_workflow_id.as_deref().unwrap_or("-"), 36),
            ]);
        }
    } else {
        output.print_value(&response);
    }

    Ok(())
}

async fn rename(client: &Client, output: OutputFormat, project_id: String, branch_id: String, name: String) -> Result<()> {
    let request = serde_json::json!({ "properties": name_property(Some(name)) });
    let branch: Branch = client
        .patch(&format!("/v1/projects/{project_id}/branches/{branch_id}"), &request)
        .await
        .map_err(|e| match e {
            ClientError::NotFound => anyhow::anyhow!("Branch not found: {}", branch_id),
            e => e.into(),
        })
        .context("failed to rename branch")?;

    if output.is_text() {
        println!("Renamed branch: {}", branch.identifier);
        print_field("Name", display_name(&branch));
    } else {
        output.print_value(&branch);
    }

    Ok(())
}

async fn delete(client: &Client, output: OutputFormat, quiet: bool, project_id: String, branch_id: String) -> Result<()> {
    client
        .delete(&format!("/v1/projects/{project_id}/branches/{branch_id}"))
        .await
        .map_err(|e| match e {
            ClientError::NotFound => anyhow::anyhow!("Branch not found: {}", branch_id),
            ClientError::Api { status: 409, .. } => anyhow::anyhow!("Cannot delete the only branch of a project"),
            e => e.into(),
        })?;

    if output.is_text() && !quiet {
        println!("Deleted branch: {}", branch_id);
    } else if !output.is_text() {
        output.print_value(&serde_json::json!({ "branch_id": branch_id, "status": "deleted" }));
    }

    Ok(())
}
