//! Persistent task registry.
//!
//! The registry is one JSON object keyed by task id, rewritten as a complete
//! snapshot after every mutation. Writes go to a temporary file in the same
//! directory which is then renamed over the registry, so readers never see a
//! partial snapshot. Load-mutate-save cycles hold an exclusive advisory lock
//! on a sibling lock file for their whole duration.

use crate::config::TaskManagerConfig;
use crate::task::Task;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Registry contents, ordered by id.
pub type TaskMap = BTreeMap<String, Task>;

/// Advisory lock on the registry; released when dropped.
#[derive(Debug)]
pub struct RegistryLock {
    file: File,
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!(error = %e, "Failed to release registry lock");
        }
    }
}

/// File-backed store of every known task.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    path: PathBuf,
    lock_path: PathBuf,
}

impl TaskRegistry {
    pub fn new<P: Into<PathBuf>, L: Into<PathBuf>>(path: P, lock_path: L) -> Self {
        Self {
            path: path.into(),
            lock_path: lock_path.into(),
        }
    }

    pub fn from_config(config: &TaskManagerConfig) -> Self {
        Self::new(config.registry_path(), config.lock_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry, degrading to an empty one if the file is missing
    /// or cannot be parsed.
    pub fn load(&self) -> TaskMap {
        match self.try_load() {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to load tasks, starting empty");
                TaskMap::new()
            }
        }
    }

    /// Load the registry, reporting parse and I/O failures.
    pub fn try_load(&self) -> crate::Result<TaskMap> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TaskMap::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(TaskMap::new());
        }

        let tasks: TaskMap = serde_json::from_str(&content)?;
        Ok(tasks)
    }

    /// Write a complete snapshot atomically.
    pub fn save(&self, tasks: &TaskMap) -> crate::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(tasks)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), count = tasks.len(), "Saved task registry");
        Ok(())
    }

    /// Block until the exclusive registry lock is held.
    pub fn lock_exclusive(&self) -> crate::Result<RegistryLock> {
        let file = self.open_lock_file()?;
        fs2::FileExt::lock_exclusive(&file)
            .map_err(|e| crate::Error::Lock(format!("{}: {}", self.lock_path.display(), e)))?;
        Ok(RegistryLock { file })
    }

    /// Block until a shared (read) registry lock is held.
    pub fn lock_shared(&self) -> crate::Result<RegistryLock> {
        let file = self.open_lock_file()?;
        fs2::FileExt::lock_shared(&file)
            .map_err(|e| crate::Error::Lock(format!("{}: {}", self.lock_path.display(), e)))?;
        Ok(RegistryLock { file })
    }

    fn open_lock_file(&self) -> crate::Result<File> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?)
    }

    /// Consistent read-only view of the registry.
    pub fn snapshot(&self) -> crate::Result<TaskMap> {
        let _lock = self.lock_shared()?;
        Ok(self.load())
    }

    /// Load, mutate and save under the exclusive lock.
    ///
    /// The snapshot is written only when `f` succeeds; on error the
    /// registry on disk is left untouched.
    pub fn update<T, F>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&mut TaskMap) -> crate::Result<T>,
    {
        let _lock = self.lock_exclusive()?;
        let mut tasks = self.load();
        let result = f(&mut tasks)?;
        self.save(&tasks)?;
        Ok(result)
    }
}
