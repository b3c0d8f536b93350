// Vizier CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Use reqwest for HTTP client (already in workspace).

mod client;
mod commands;
mod output;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vizier")]
#[command(about = "Vizier CLI - Manage projects, branches, and notebook execution")]
#[command(version)]
pub struct Cli {
    /// API base URL
    #[arg(long, env = "VIZIER_API_URL", default_value = "http://localhost:9100")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage projects (viztrails)
    Project {
        #[command(subcommand)]
        command: commands::project::ProjectCommand,
    },

    /// Manage branches
    Branch {
        #[command(subcommand)]
        command: commands::branch::BranchCommand,
    },

    /// Inspect a branch's history and notebook snapshots
    Show {
        /// Project id
        #[arg(long, short)]
        project: String,

        /// Branch id
        #[arg(long, short)]
        branch: String,

        #[command(subcommand)]
        command: commands::show::ShowCommand,
    },

    /// Append and execute a cell
    Run {
        /// Branch id
        #[arg(long, short)]
        branch: String,

        #[command(subcommand)]
        command: commands::run::RunCommand,
    },

    /// Load a dataset onto a branch
    Load {
        /// Branch id
        #[arg(long, short)]
        branch: String,

        /// Dataset name
        name: String,

        #[command(subcommand)]
        source: commands::datasets::LoadSource,
    },

    /// Update a single cell of a dataset
    Update {
        /// Branch id
        #[arg(long, short)]
        branch: String,

        /// Dataset name
        dataset: String,

        /// Column name
        column: String,

        /// Row index
        row: i64,

        /// New value (parsed as JSON if possible, else treated as a string)
        value: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = client::Client::new(&cli.api_url);
    let output_format = output::OutputFormat::from_str(&cli.output);

    match cli.command {
        Commands::Project { command } => commands::project::run(command, &client, output_format, cli.quiet).await,
        Commands::Branch { command } => commands::branch::run(command, &client, output_format, cli.quiet).await,
        Commands::Show { project, branch, command } => {
            commands::show::run(command, &client, output_format, project, branch).await
        }
        Commands::Run { branch, command } => commands::run::run(command, &client, output_format, cli.quiet, branch).await,
        Commands::Load { branch, name, source } => {
            commands::datasets::load(&client, output_format, cli.quiet, branch, name, source).await
        }
        Commands::Update { branch, dataset, column, row, value } => {
            commands::datasets::update(&client, output_format, cli.quiet, branch, dataset, column, row, value).await
        }
    }
}
