//! Per-invocation state shared by all commands.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tm_core::{TaskController, TaskManagerConfig};
use tracing::warn;

pub struct CliContext {
    root: PathBuf,
}

impl CliContext {
    /// Use `root` if given, otherwise the default state directory.
    pub fn resolve(root: Option<PathBuf>) -> Result<Self> {
        let root = match root {
            Some(root) => root,
            None => TaskManagerConfig::default_root().context("Failed to determine state directory")?,
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration for this root, with this binary as the in-session
    /// finalize program.
    pub fn config(&self) -> TaskManagerConfig {
        let config = TaskManagerConfig::load(&self.root);
        match std::env::current_exe() {
            Ok(exe) => config.with_finalize_program(exe),
            Err(e) => {
                warn!(error = %e, "Cannot locate own executable, tasks will settle on the next query");
                config
            }
        }
    }

    pub fn controller(&self) -> Result<TaskController> {
        TaskController::from_config(self.config())
            .with_context(|| format!("Failed to open task state in {}", self.root.display()))
    }
}
