//! tmux multiplexer implementation
//!
//! Implements the SessionMultiplexer trait for tmux using its command-line
//! interface. Each task owns one detached session; targets are always
//! prefixed with `=` so tmux matches the session name exactly instead of
//! falling back to prefix matching (`task_0001` must never hit `task_00012`).

use std::path::Path;
use std::process::{Command, Stdio};
use tm_mux_core::*;
use tracing::debug;

/// tmux multiplexer implementation
#[derive(Debug, Clone, Default)]
pub struct TmuxMultiplexer {
    /// Dedicated server socket (`tmux -L`); `None` uses the user's default server.
    socket_name: Option<String>,
}

impl TmuxMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Talk to an isolated tmux server instead of the default one
    pub fn with_socket_name(socket_name: String) -> Self {
        Self {
            socket_name: Some(socket_name),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("tmux");
        if let Some(socket) = &self.socket_name {
            cmd.args(["-L", socket]);
        }
        cmd
    }

    /// Run a tmux command and return its output
    fn run_tmux_command(&self, args: &[&str]) -> Result<String, MuxError> {
        debug!(args = ?args, "tmux");
        let output = self.command().args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MuxError::NotAvailable("tmux")
            } else {
                MuxError::Io(e)
            }
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(MuxError::CommandFailed(format!(
                "tmux {} failed: {}",
                args.join(" "),
                stderr.trim()
            )))
        }
    }

    fn session_target(name: &str) -> String {
        format!("={}", name)
    }

    fn pane_target(name: &str) -> String {
        format!("={}:", name)
    }
}

impl SessionMultiplexer for TmuxMultiplexer {
    fn id(&self) -> &'static str {
        "tmux"
    }

    fn is_available(&self) -> bool {
        Command::new("tmux")
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn open_session(&self, name: &str, opts: &SessionOptions) -> Result<(), MuxError> {
        let mut args = vec![
            "new-session".to_string(),
            "-d".to_string(),
            "-s".to_string(),
            name.to_string(),
        ];

        // Add working directory if specified
        if let Some(cwd) = opts.cwd {
            args.extend_from_slice(&["-c".to_string(), cwd.to_string_lossy().to_string()]);
        }

        if let Some(env) = opts.env {
            for (key, value) in env {
                args.extend_from_slice(&["-e".to_string(), format!("{}={}", key, value)]);
            }
        }

        let args_str: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        self.run_tmux_command(&args_str)?;
        Ok(())
    }

    fn has_session(&self, name: &str) -> bool {
        self.command()
            .args(["has-session", "-t", &Self::session_target(name)])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn capture_pane(&self, name: &str) -> Result<String, MuxError> {
        self.run_tmux_command(&["capture-pane", "-p", "-t", &Self::pane_target(name)])
    }

    fn send_text(&self, name: &str, text: &str) -> Result<(), MuxError> {
        // -l disables key-name lookup so the text is typed verbatim
        self.run_tmux_command(&["send-keys", "-t", &Self::pane_target(name), "-l", text])?;
        Ok(())
    }

    fn send_key(&self, name: &str, key: ControlKey) -> Result<(), MuxError> {
        let key = match key {
            ControlKey::Interrupt => "C-c",
            ControlKey::Enter => "C-m",
        };
        self.run_tmux_command(&["send-keys", "-t", &Self::pane_target(name), key])?;
        Ok(())
    }

    fn pipe_output(&self, name: &str, log_path: &Path) -> Result<(), MuxError> {
        let sink = format!("cat >> {}", shell_quote(&log_path.to_string_lossy()));
        self.run_tmux_command(&["pipe-pane", "-o", "-t", &Self::pane_target(name), &sink])?;
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        self.run_tmux_command(&["kill-session", "-t", &Self::session_target(name)])?;
        Ok(())
    }

    fn pane_pid(&self, name: &str) -> Result<u32, MuxError> {
        let output = self.run_tmux_command(&[
            "list-panes",
            "-t",
            &Self::session_target(name),
            "-F",
            "#{pane_pid}",
        ])?;

        output
            .lines()
            .next()
            .and_then(|line| line.trim().parse().ok())
            .ok_or(MuxError::NotFound)
    }
}
