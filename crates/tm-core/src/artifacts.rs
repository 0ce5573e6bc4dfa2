//! Per-task files in the log directory.
//!
//! Each task owns `<id>.log` (header plus mirrored session output) and, once
//! its job has exited, `<id>.exit` holding the job's exit status. Every file
//! whose name starts with a task id belongs to that task.

use crate::task::Task;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HEADER_RULE_WIDTH: usize = 80;

/// Access to the log-artifact directory.
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
}

impl LogStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.log", id))
    }

    pub fn exit_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.exit", id))
    }

    /// Append the start header for a (re)started task.
    pub fn write_header(&self, task: &Task) -> crate::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.log_path(&task.id);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        let now = Utc::now().to_rfc3339();
        writeln!(file, "[{}] Task started: {}", now, task.name)?;
        writeln!(file, "[{}] Command: {}", now, task.command)?;
        writeln!(file, "[{}] Session: {}", now, task.session_handle)?;
        if task.retry_count > 0 {
            writeln!(
                file,
                "[{}] Retry: {}/{}",
                now, task.retry_count, task.max_retries
            )?;
        }
        writeln!(file, "{}", "=".repeat(HEADER_RULE_WIDTH))?;
        Ok(path)
    }

    /// Last `max_lines` lines of the task's log, or `None` if it has none.
    pub fn tail(&self, id: &str, max_lines: i64) -> crate::Result<Option<String>> {
        match fs::read(self.log_path(id)) {
            Ok(bytes) => Ok(Some(tail_lines(&String::from_utf8_lossy(&bytes), max_lines))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Exit status recorded by the job wrapper, if any.
    pub fn read_exit_code(&self, id: &str) -> Option<i32> {
        let path = self.exit_path(id);
        match fs::read_to_string(&path) {
            Ok(content) => match content.trim().parse() {
                Ok(code) => Some(code),
                Err(_) => {
                    warn!(path = %path.display(), "Exit status file is malformed");
                    None
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read exit status");
                None
            }
        }
    }

    pub fn clear_exit_code(&self, id: &str) {
        if let Err(e) = fs::remove_file(self.exit_path(id)) {
            if e.kind() != ErrorKind::NotFound {
                warn!(task = id, error = %e, "Failed to remove stale exit status");
            }
        }
    }

    /// Whether any file in the directory is named with `prefix`.
    ///
    /// A missing directory holds no artifacts; any other enumeration error
    /// is returned so the caller can decide how conservative to be.
    pub fn has_artifacts(&self, prefix: &str) -> std::io::Result<bool> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        for entry in entries {
            if entry?.file_name().to_string_lossy().starts_with(prefix) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Delete every file named with `prefix`; returns how many were removed.
    pub fn remove_all(&self, prefix: &str) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(dir = %self.dir.display(), error = %e, "Failed to scan log directory");
                }
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            if !entry.file_name().to_string_lossy().starts_with(prefix) {
                continue;
            }
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed log artifact");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove log artifact"),
            }
        }
        removed
    }
}

/// Keep the last `max_lines` lines of `text`; zero or negative keeps all.
pub fn tail_lines(text: &str, max_lines: i64) -> String {
    let text = text.trim_end_matches('\n');
    if max_lines <= 0 {
        return text.to_string();
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let keep = (max_lines as usize).min(lines.len());
    lines[lines.len() - keep..].join("\n")
}
