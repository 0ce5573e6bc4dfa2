//! Task identifier allocation.
//!
//! Ids must be unique against the registry and against residual files in the
//! log directory: artifacts can outlive their registry entry, and reusing
//! such an id would append a new job's output to an unrelated log. Callers
//! must hold the exclusive registry lock.

use crate::artifacts::LogStore;
use crate::registry::TaskMap;
use crate::task::format_task_id;
use tracing::{debug, warn};

/// Consecutive collisions tolerated before allocation gives up.
pub const MAX_ALLOCATION_ATTEMPTS: u64 = 10_000;

/// Produce the next free task id.
///
/// Candidates start one above the highest numeric id in the registry. A
/// candidate is skipped if it is a registry key or prefixes any file in the
/// log directory; a failed directory scan also skips it.
pub fn allocate(tasks: &TaskMap, logs: &LogStore) -> crate::Result<String> {
    let first = next_counter(tasks);

    for counter in first..first.saturating_add(MAX_ALLOCATION_ATTEMPTS) {
        let candidate = format_task_id(counter);

        if tasks.contains_key(&candidate) {
            debug!(id = %candidate, "Id already registered, skipping");
            continue;
        }

        match logs.has_artifacts(&candidate) {
            Ok(false) => return Ok(candidate),
            Ok(true) => debug!(id = %candidate, "Residual log artifacts found, skipping"),
            Err(e) => warn!(
                id = %candidate,
                dir = %logs.dir().display(),
                error = %e,
                "Cannot scan log directory, skipping candidate"
            ),
        }
    }

    Err(crate::Error::task(format!(
        "no free task id in {} candidates starting at {}",
        MAX_ALLOCATION_ATTEMPTS,
        format_task_id(first)
    )))
}

fn next_counter(tasks: &TaskMap) -> u64 {
    tasks
        .keys()
        .filter_map(|id| id.parse::<u64>().ok())
        .max()
        .map_or(1, |max| max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{NewTask, Task};
    use std::fs;
    use tempfile::TempDir;

    fn registry_with(ids: &[&str]) -> TaskMap {
        ids.iter()
            .map(|id| (id.to_string(), Task::new(id.to_string(), NewTask::new("t", "true"))))
            .collect()
    }

    #[test]
    fn test_first_id() {
        let dir = TempDir::new().unwrap();
        let logs = LogStore::new(dir.path().join("logs"));
        assert_eq!(allocate(&TaskMap::new(), &logs).unwrap(), "00001");
    }

    #[test]
    fn test_follows_highest_registered_id() {
        let dir = TempDir::new().unwrap();
        let logs = LogStore::new(dir.path());
        let tasks = registry_with(&["00002", "00009", "legacy"]);
        assert_eq!(allocate(&tasks, &logs).unwrap(), "00010");
    }

    #[test]
    fn test_skips_residual_artifacts() {
        let dir = TempDir::new().unwrap();
        let logs = LogStore::new(dir.path());
        fs::write(dir.path().join("00001.log"), "orphan").unwrap();
        fs::write(dir.path().join("00002.exit"), "0").unwrap();
        fs::write(dir.path().join("notify.log"), "").unwrap();

        assert_eq!(allocate(&TaskMap::new(), &logs).unwrap(), "00003");
    }

    #[test]
    fn test_unreadable_log_directory_never_yields_an_id() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("logs");
        fs::write(&not_a_dir, "").unwrap();

        let result = allocate(&TaskMap::new(), &LogStore::new(not_a_dir));
        assert!(matches!(result, Err(crate::Error::Task { .. })));
    }
}
