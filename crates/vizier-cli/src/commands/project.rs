// Project management commands

use crate::client::{Client, ClientError};
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};
use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};

#[derive(Subcommand)]
pub enum ProjectCommand {
    /// Create a new project
    Create {
        /// Human-readable project name
        #[arg(long)]
        name: Option<String>,
    },

    /// List all projects
    List,

    /// Rename a project
    Rename {
        /// Project id
        project_id: String,

        /// New project name
        name: String,
    },

    /// Delete a project
    Delete {
        /// Project id
        project_id: String,
    },
}

#[derive(Debug, Serialize)]
struct CreateProjectRequest {
    properties: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    pub datastore_handle: String,
    pub filestore_handle: String,
    #[serde(default)]
    pub container_endpoint: Option<serde_json::Value>,
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

fn display_name(project: &Project) -> &str {
    project.properties.get("name").and_then(|v| v.as_str()).unwrap_or("-")
}

pub async fn run(command: ProjectCommand, client: &Client, output: OutputFormat, quiet: bool) -> Result<()> {
    match command {
        ProjectCommand::Create { name } => create(client, output, quiet, name).await,
        ProjectCommand::List => list(client, output).await,
        ProjectCommand::Rename { project_id, name } => rename(client, output, project_id, name).await,
        ProjectCommand::Delete { project_id } => delete(client, output, quiet, project_id).await,
    }
}

async fn create(client: &Client, output: OutputFormat, quiet: bool, name: Option<String>) -> Result<()> {
    let request = CreateProjectRequest { properties: name_property(name) };
    let project: Project = client.post("/v1/projects", &request).await?;

    if output.is_text() {
        if quiet {
            println!("{}", project.project_id);
        } else {
            println!("Created project: {}", project.project_id);
            print_field("Name", display_name(&project));
        }
    } else {
        output.print_value(&project);
    }

    Ok(())
}

async fn list(client: &Client, output: OutputFormat) -> Result<()> {
    let response: ListResponse<Project> = client.get("/v1/projects").await?;

    if output.is_text() {
        if response.data.is_empty() {
            println!("No projects found");
            return Ok(());
        }

        print_table_header(&[("ID", 36), ("NAME", 24)]);
        for project in &response.data {
            print_table_row(&[(&project.project_id, 36), (display_name(project), 24)]);
        }
    } else {
        output.print_value(&response);
    }

    Ok(())
}

async fn rename(client: &Client, output: OutputFormat, project_id: String, name: String) -> Result<()> {
    let request = CreateProjectRequest { properties: name_property(Some(name)) };
    let project: Project = client
        .patch(&format!("/v1/projects/{project_id}"), &request)
        .await
        .map_err(|e| match e {
            ClientError::NotFound => anyhow::anyhow!("Project not found: {}", project_id),
            e => e.into(),
        })
        .context("failed to rename project")?;

    if output.is_text() {
        println!("Renamed project: {}", project.project_id);
        print_field("Name", display_name(&project));
    } else {
        output.print_value(&project);
    }

    Ok(())
}

async fn delete(client: &Client, output: OutputFormat, quiet: bool, project_id: String) -> Result<()> {
    client
        .delete(&format!("/v1/projects/{project_id}"))
        .await
        .map_err(|e| match e {
            ClientError::NotFound => anyhow::anyhow!("Project not found: {}", project_id),
            e => e.into(),
        })?;

    if output.is_text() && !quiet {
        println!("Deleted project: {}", project_id);
    } else if !output.is_text() {
        output.print_value(&serde_json::json!({ "project_id": project_id, "status": "deleted" }));
    }

    Ok(())
}
