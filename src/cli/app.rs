//! Main CLI application structure

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use super::output::{Output, OutputFormat};
use super::session::Session;
use super::{doctor, task};
use crate::domain::Strategy;
use crate::mcp::McpServer;
use crate::storage::{Config, Project};

#[derive(Parser)]
#[command(name = "backlog")]
#[command(author, version, about = "Git-native task tracking with markdown files")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Task folder
    #[arg(long, short = 'd', global = true, env = "BACKLOG_FOLDER", default_value = ".backlog")]
    pub folder: PathBuf,

    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Commit task changes to git (overrides the project config)
    #[arg(long, global = true, env = "BACKLOG_AUTO_COMMIT")]
    pub auto_commit: Option<bool>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the task folder and a default config
    Init,

    /// Manage tasks
    #[command(subcommand)]
    Task(task::TaskCommands),

    /// Check the task folder for ID conflicts and optionally repair them
    Doctor {
        /// Apply a resolution plan
        #[arg(long)]
        fix: bool,

        /// chronological, auto or manual (defaults to the project config)
        #[arg(long, requires = "fix")]
        strategy: Option<Strategy>,

        /// Show what --fix would do without writing
        #[arg(long, requires = "fix")]
        dry_run: bool,
    },

    /// Serve the task tools to MCP clients over stdio
    Mcp,
}

/// Runs a parsed command line
pub fn run(cli: Cli) -> Result<()> {
    let format = match cli.format {
        Some(format) => format,
        None => Config::for_folder(&cli.folder)?.global.default_format.into(),
    };
    let output = Output::new(format);

    tracing::debug!(folder = %cli.folder.display(), "backlog starting");

    match cli.command {
        Commands::Init => {
            let project = Project::init(&cli.folder)?;
            output.success(&format!("Initialized task folder at {}", project.dir().display()));
        }

        Commands::Task(cmd) => {
            let session = Session::open(cli.folder, cli.auto_commit)?;
            task::run(cmd, &session, &output)?
        }

        Commands::Doctor {
            fix,
            strategy,
            dry_run,
        } => {
            let session = Session::open(cli.folder, cli.auto_commit)?;
            doctor::run(&session, &output, fix, strategy, dry_run)?
        }

        Commands::Mcp => {
            let session = Session::open(cli.folder, cli.auto_commit)?;
            let config = session.config().project.clone();
            let (store, commits) = session.into_parts();

            tracing::info!(folder = %store.dir().display(), "serving MCP on stdio");
            let stdin = std::io::stdin();
            McpServer::new(store, config, commits)
                .serve(stdin.lock(), std::io::stdout().lock())
                .context("MCP transport failed")?
        }
    }

    Ok(())
}
