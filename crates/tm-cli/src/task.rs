use crate::context::CliContext;
use crate::render;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tm_core::resources::{ResourceSampler, SystemSampler};
use tm_core::{NewTask, TaskOutput, TaskStatus};

/// Arguments for creating and starting a task
#[derive(Args)]
pub struct RunArgs {
    /// Short name for the task
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Shell command to run (quote it as one argument)
    #[arg(value_name = "COMMAND")]
    pub command: String,

    /// Display priority; higher sorts first in `tm list`
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    pub priority: i64,

    /// Restart the job up to N times when it exits non-zero
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub retries: u32,

    /// Line-buffer the job's output so it shows up immediately
    #[arg(short = 'r', long)]
    pub realtime: bool,

    /// Working directory for the job (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,
}

impl RunArgs {
    pub fn run(self, ctx: &CliContext) -> Result<()> {
        let ctl = ctx.controller()?;
        let working_dir = match self.cwd {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to read the current directory")?,
        };

        let task = ctl
            .create(NewTask {
                name: self.name,
                command: self.command,
                priority: self.priority,
                max_retries: self.retries,
                realtime: self.realtime,
                working_dir: Some(working_dir),
            })
            .context("Failed to create task")?;

        let task = ctl
            .start(&task.id)
            .with_context(|| format!("Failed to start task {}", task.id))?;
        if task.status == TaskStatus::Failed {
            bail!(
                "Failed to start task {}: {}",
                task.id,
                task.error_message.as_deref().unwrap_or("unknown error")
            );
        }

        println!("Task {} started in session {}", task.id, task.session_handle);
        println!("  Command: {}", task.command);
        println!("  Log:     {}", ctl.logs().log_path(&task.id).display());
        Ok(())
    }
}

/// Arguments for listing tasks
#[derive(Args)]
pub struct ListArgs {
    /// Only show tasks in this status (pending, running, completed, failed, killed)
    #[arg(value_name = "STATUS")]
    pub status: Option<TaskStatus>,

    /// Also show host resource usage
    #[arg(long)]
    pub resources: bool,
}

impl ListArgs {
    pub fn run(self, ctx: &CliContext) -> Result<()> {
        let ctl = ctx.controller()?;

        if self.resources {
            let snapshot = SystemSampler::new().sample();
            println!("{}", render::resource_summary(&snapshot));
        }

        let tasks = ctl.list(self.status).context("Failed to list tasks")?;
        if tasks.is_empty() {
            println!("No tasks found");
        } else {
            println!("{}", render::task_table(&tasks, Utc::now()));
        }
        Ok(())
    }
}

/// Arguments for stopping tasks
#[derive(Args)]
pub struct KillArgs {
    /// Task ids to stop
    #[arg(value_name = "ID", required_unless_present = "all")]
    pub ids: Vec<String>,

    /// Stop every running task
    #[arg(long, conflicts_with = "ids")]
    pub all: bool,

    /// Tear sessions down without interrupting the job first
    #[arg(short, long)]
    pub force: bool,
}

impl KillArgs {
    pub fn run(self, ctx: &CliContext) -> Result<()> {
        let ctl = ctx.controller()?;

        let results = if self.all {
            let results = ctl.stop_all(self.force)?;
            if results.is_empty() {
                println!("No running tasks");
            }
            results
        } else {
            self.ids
                .into_iter()
                .map(|id| {
                    let result = ctl.stop(&id, self.force);
                    (id, result)
                })
                .collect()
        };

        let mut failed = 0;
        for (id, result) in results {
            match result {
                Ok(_) => println!("Stopped task {}", id),
                Err(e) => {
                    eprintln!("Failed to stop task {}: {}", id, e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            bail!("{} task(s) could not be stopped", failed);
        }
        Ok(())
    }
}

/// Arguments for following a task
#[derive(Args)]
pub struct MonitorArgs {
    /// Task id
    #[arg(value_name = "ID")]
    pub id: String,

    /// Lines of output to show (0 for all)
    #[arg(short = 'n', long, default_value_t = 50, allow_negative_numbers = true)]
    pub lines: i64,

    /// Seconds between refreshes
    #[arg(long, value_name = "SECS", default_value_t = 2.0)]
    pub refresh: f64,
}

impl MonitorArgs {
    pub async fn run(self, ctx: &CliContext) -> Result<()> {
        let ctl = ctx.controller()?;
        let interval = Duration::try_from_secs_f64(self.refresh.max(0.1))
            .with_context(|| format!("Invalid refresh interval: {}", self.refresh))?;

        loop {
            let task = ctl.reconcile(&self.id)?;
            let output = ctl.capture_output(&self.id, self.lines)?;

            let mut stdout = std::io::stdout();
            write!(stdout, "\x1b[2J\x1b[H")?;
            writeln!(stdout, "{}", render::monitor_header(&task, Utc::now()))?;
            writeln!(stdout, "{}", "-".repeat(80))?;
            writeln!(stdout, "{}", output.text().unwrap_or("(no output yet)"))?;
            stdout.flush()?;

            if task.status.is_terminal() {
                println!("\nTask {} {}", task.id, task.status);
                return Ok(());
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("\nStopped monitoring; task {} keeps running", task.id);
                    return Ok(());
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

/// A single task id
#[derive(Args)]
pub struct IdArgs {
    /// Task id
    #[arg(value_name = "ID")]
    pub id: String,
}

impl IdArgs {
    pub fn status(self, ctx: &CliContext) -> Result<()> {
        let task = ctx.controller()?.get(&self.id)?;
        println!("{}", render::task_details(&task, Utc::now()));
        Ok(())
    }

    pub fn finalize(self, ctx: &CliContext) -> Result<()> {
        ctx.controller()?.finalize(&self.id)?;
        Ok(())
    }
}

/// Arguments for showing recent output
#[derive(Args)]
pub struct OutputArgs {
    /// Task id
    #[arg(value_name = "ID")]
    pub id: String,

    /// Lines of output to show (0 for all)
    #[arg(short = 'n', long, default_value_t = 50, allow_negative_numbers = true)]
    pub lines: i64,
}

impl OutputArgs {
    pub fn run(self, ctx: &CliContext) -> Result<()> {
        match ctx.controller()?.capture_output(&self.id, self.lines)? {
            TaskOutput::Live(text) | TaskOutput::Logged(text) => {
                println!("{}", text);
                Ok(())
            }
            TaskOutput::Unavailable => bail!("No output available for task {}", self.id),
        }
    }
}

/// Arguments for showing the log file
#[derive(Args)]
pub struct LogsArgs {
    /// Task id
    #[arg(value_name = "ID")]
    pub id: String,

    /// Lines to show from the end of the log (0 for all)
    #[arg(short = 'n', long, default_value_t = 100, allow_negative_numbers = true)]
    pub lines: i64,
}

impl LogsArgs {
    pub fn run(self, ctx: &CliContext) -> Result<()> {
        match ctx.controller()?.read_log(&self.id, self.lines)? {
            Some(text) => {
                println!("{}", text);
                Ok(())
            }
            None => bail!("No log file for task {}", self.id),
        }
    }
}

/// Arguments for removing tasks
#[derive(Args)]
pub struct CleanupArgs {
    /// Task ids to remove; without ids, finished tasks older than --hours are removed
    #[arg(value_name = "ID")]
    pub ids: Vec<String>,

    /// Age threshold in hours for finished tasks
    #[arg(short = 't', long, value_name = "HOURS", conflicts_with = "ids")]
    pub hours: Option<u64>,
}

impl CleanupArgs {
    pub const DEFAULT_HOURS: u64 = 24;

    pub fn run(self, ctx: &CliContext) -> Result<()> {
        let ctl = ctx.controller()?;

        if self.ids.is_empty() {
            let hours = self.hours.unwrap_or(Self::DEFAULT_HOURS);
            let max_age = i64::try_from(hours)
                .ok()
                .and_then(chrono::Duration::try_hours)
                .with_context(|| format!("Age threshold of {} hours is out of range", hours))?;
            let cleaned = ctl.cleanup_by_age(max_age)?;
            if cleaned.is_empty() {
                println!("No finished tasks older than {} hours", hours);
            } else {
                println!("Cleaned up {} task(s): {}", cleaned.len(), cleaned.join(", "));
            }
            return Ok(());
        }

        let mut failed = 0;
        for id in &self.ids {
            match ctl.cleanup(id) {
                Ok(removed) => println!("Cleaned up task {} ({} file(s) removed)", id, removed),
                Err(e) => {
                    eprintln!("Failed to clean up task {}: {}", id, e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            bail!("{} task(s) could not be cleaned up", failed);
        }
        Ok(())
    }
}
