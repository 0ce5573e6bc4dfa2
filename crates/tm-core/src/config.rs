//! Configuration: where state lives and how the controller behaves.
//!
//! All state for one user sits under a single root directory:
//!
//! ```text
//! <root>/tasks.json   task registry
//! <root>/tasks.lock   advisory lock guarding the registry
//! <root>/config.json  persisted user settings
//! <root>/logs/        per-task log artifacts and the notification journal
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Environment variable overriding the state root.
pub const HOME_ENV: &str = "TM_HOME";

const DEFAULT_BACKEND: &str = "tmux";
const DEFAULT_GRACE_MS: u64 = 1_000;
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;

/// Where and how terminal transitions are announced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub enabled: bool,
    /// JSON POST endpoint receiving every completion event.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Shell hook run with `TM_TASK_*` variables describing the event.
    #[serde(default)]
    pub hook_command: Option<String>,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

fn default_notify_timeout() -> u64 {
    DEFAULT_NOTIFY_TIMEOUT_SECS
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            hook_command: None,
            timeout_secs: DEFAULT_NOTIFY_TIMEOUT_SECS,
        }
    }
}

/// User settings persisted in `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Multiplexer backend name (`tmux`).
    #[serde(default)]
    pub mux_backend: Option<String>,
    /// Grace window between interrupt and forced teardown, in milliseconds.
    #[serde(default)]
    pub grace_period_ms: Option<u64>,
    #[serde(default)]
    pub notify: NotificationSettings,
}

impl Settings {
    /// Read settings; a missing file yields defaults and a damaged one is
    /// reported and replaced by defaults.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable settings file");
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read settings file");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Resolved configuration threaded into the controller.
#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    pub root_dir: PathBuf,
    pub mux_backend: String,
    pub grace_period: Duration,
    /// Program the job wrapper invokes as `<program> --root <root> _finalize <id>`
    /// once the job exits. `None` leaves settling to reconciliation.
    pub finalize_program: Option<PathBuf>,
    pub notify: NotificationSettings,
}

impl TaskManagerConfig {
    /// Default state root.
    ///
    /// Priority order:
    /// 1. `TM_HOME` environment variable
    /// 2. `${XDG_STATE_HOME:-~/.local/state}/tmux-tasks`
    /// 3. `~/.tmux-tasks` on platforms without a state directory
    pub fn default_root() -> crate::Result<PathBuf> {
        if let Ok(home) = std::env::var(HOME_ENV) {
            if !home.is_empty() {
                return Ok(PathBuf::from(home));
            }
        }

        if let Some(state) = dirs::state_dir() {
            return Ok(state.join("tmux-tasks"));
        }

        dirs::home_dir()
            .map(|home| home.join(".tmux-tasks"))
            .ok_or_else(|| crate::Error::config("cannot determine a home directory"))
    }

    /// Defaults for `root`, ignoring any settings file.
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self::from_settings(root.into(), Settings::default())
    }

    /// Configuration for `root`, merged with its `config.json`.
    pub fn load<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        let settings = Settings::load(&Self::settings_path_in(&root));
        Self::from_settings(root, settings)
    }

    pub fn from_settings(root_dir: PathBuf, settings: Settings) -> Self {
        Self {
            root_dir,
            mux_backend: settings
                .mux_backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            grace_period: Duration::from_millis(
                settings.grace_period_ms.unwrap_or(DEFAULT_GRACE_MS),
            ),
            finalize_program: None,
            notify: settings.notify,
        }
    }

    pub fn with_finalize_program<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.finalize_program = Some(program.into());
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// The settings this configuration persists as.
    pub fn settings(&self) -> Settings {
        Settings {
            mux_backend: Some(self.mux_backend.clone()),
            grace_period_ms: Some(self.grace_period.as_millis() as u64),
            notify: self.notify.clone(),
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root_dir.join("tasks.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root_dir.join("tasks.lock")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root_dir.join("logs")
    }

    pub fn settings_path(&self) -> PathBuf {
        Self::settings_path_in(&self.root_dir)
    }

    fn settings_path_in(root: &Path) -> PathBuf {
        root.join("config.json")
    }

    /// Create the root and log directories.
    pub fn ensure_dirs(&self) -> crate::Result<()> {
        fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_under_root() {
        let config = TaskManagerConfig::with_root("/state");
        assert_eq!(config.registry_path(), PathBuf::from("/state/tasks.json"));
        assert_eq!(config.lock_path(), PathBuf::from("/state/tasks.lock"));
        assert_eq!(config.logs_dir(), PathBuf::from("/state/logs"));
        assert_eq!(config.settings_path(), PathBuf::from("/state/config.json"));
        assert_eq!(config.mux_backend, "tmux");
        assert_eq!(config.grace_period, Duration::from_secs(1));
        assert!(config.finalize_program.is_none());
        assert!(!config.notify.enabled);
    }

    #[test]
    fn test_settings_round_trip_through_config() {
        let dir = TempDir::new().unwrap();
        let mut config = TaskManagerConfig::with_root(dir.path());
        config.notify.enabled = true;
        config.notify.webhook_url = Some("http://localhost:9/hook".to_string());
        config.grace_period = Duration::from_millis(250);
        config.settings().save(&config.settings_path()).unwrap();

        let reloaded = TaskManagerConfig::load(dir.path());
        assert_eq!(reloaded.notify, config.notify);
        assert_eq!(reloaded.grace_period, Duration::from_millis(250));
    }

    #[test]
    fn test_missing_or_corrupt_settings_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(Settings::load(&path), Settings::default());

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"notify": {"enabled": true}}"#).unwrap();

        let settings = Settings::load(&path);
        assert!(settings.notify.enabled);
        assert_eq!(settings.notify.timeout_secs, 10);
        assert!(settings.mux_backend.is_none());
    }
}
