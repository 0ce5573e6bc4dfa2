//! tm command-line interface library

pub mod config;
pub mod context;
pub mod notify;
pub mod render;
pub mod resources;
pub mod task;

use anyhow::Result;
use context::CliContext;
use std::path::PathBuf;

// Re-export CLI types for testing
pub use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tm")]
#[command(about = "Run and track background jobs in tmux sessions")]
#[command(version, long_about = None)]
pub struct Cli {
    /// State directory (defaults to $TM_HOME, then the per-user state directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Diagnostic log filter written to stderr (e.g. `debug`, `tm_core=trace`)
    #[arg(long = "log-level", global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a task and start it in its own session
    Run(task::RunArgs),
    /// List tasks, running first
    List(task::ListArgs),
    /// Stop one or more tasks
    Kill(task::KillArgs),
    /// Follow a task's live output until it finishes
    Monitor(task::MonitorArgs),
    /// Show everything known about a task
    Status(task::IdArgs),
    /// Show a task's recent output
    Output(task::OutputArgs),
    /// Show the tail of a task's log file
    Logs(task::LogsArgs),
    /// Remove tasks and their log files
    Cleanup(task::CleanupArgs),
    /// Completion notification settings
    Notify {
        #[command(subcommand)]
        subcommand: notify::NotifyCommands,
    },
    /// Configuration file management
    Config {
        #[command(subcommand)]
        subcommand: config::ConfigCommands,
    },
    /// Show host CPU, memory, disk and GPU usage
    Resources(resources::ResourcesArgs),
    /// Settle a task once its job has exited (run inside the task's session)
    #[command(name = "_finalize", hide = true)]
    Finalize(task::IdArgs),
}

impl Commands {
    pub async fn run(self, ctx: &CliContext) -> Result<()> {
        match self {
            Commands::Run(args) => args.run(ctx),
            Commands::List(args) => args.run(ctx),
            Commands::Kill(args) => args.run(ctx),
            Commands::Monitor(args) => args.run(ctx).await,
            Commands::Status(args) => args.status(ctx),
            Commands::Output(args) => args.run(ctx),
            Commands::Logs(args) => args.run(ctx),
            Commands::Cleanup(args) => args.run(ctx),
            Commands::Notify { subcommand } => subcommand.run(ctx),
            Commands::Config { subcommand } => subcommand.run(ctx),
            Commands::Resources(args) => args.run(),
            Commands::Finalize(args) => args.finalize(ctx),
        }
    }
}
