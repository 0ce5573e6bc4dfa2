//! Low-level, backend-agnostic session multiplexer trait and shared types
//!
//! This crate defines the primitives every terminal multiplexer backend must
//! provide to host background jobs: named detached sessions, existence probes,
//! pane capture, keystroke delivery, output mirroring and teardown. It carries
//! no knowledge of tasks or registries.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::path::Path;

/// Opaque session name; backends address sessions by it.
pub type SessionName = String;

/// Control keys that can be delivered to a session in addition to literal text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlKey {
    /// Interrupt the foreground process (Ctrl-C).
    Interrupt,
    /// Submit the current line (Enter).
    Enter,
}

#[derive(Clone, Debug, Default)]
pub struct SessionOptions<'a> {
    pub cwd: Option<&'a Path>,
    pub env: Option<&'a [(&'a str, &'a str)]>,
}

#[derive(thiserror::Error, Debug)]
pub enum MuxError {
    #[error("multiplexer not available: {0}")]
    NotAvailable(&'static str),
    #[error("not found")]
    NotFound,
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("other: {0}")]
    Other(String),
}

/// Core multiplexer trait that all backends must provide.
///
/// Every operation is a point failure: a non-zero status from the backend
/// tool surfaces as an `Err` (or `false` for probes), never as a panic.
pub trait SessionMultiplexer {
    /// Backend identifier (e.g., "tmux", "screen").
    fn id(&self) -> &'static str;

    /// Check whether the backend is installed and usable on this system.
    fn is_available(&self) -> bool;

    /// Create a new detached session with the given name.
    fn open_session(&self, name: &str, opts: &SessionOptions) -> Result<(), MuxError>;

    /// Whether a session with this name currently exists.
    fn has_session(&self, name: &str) -> bool;

    /// Return the visible text of the session's active pane.
    fn capture_pane(&self, name: &str) -> Result<String, MuxError>;

    /// Send literal text to the session without submitting it.
    fn send_text(&self, name: &str, text: &str) -> Result<(), MuxError>;

    /// Send a control key to the session.
    fn send_key(&self, name: &str, key: ControlKey) -> Result<(), MuxError>;

    /// Mirror everything the session prints into `log_path` (append).
    fn pipe_output(&self, name: &str, log_path: &Path) -> Result<(), MuxError>;

    /// Destroy the session and every process it hosts.
    fn kill_session(&self, name: &str) -> Result<(), MuxError>;

    /// Process id of the session's shell. Optional to implement; may return NotAvailable.
    fn pane_pid(&self, name: &str) -> Result<u32, MuxError> {
        let _ = name;
        Err(MuxError::NotAvailable(self.id()))
    }

    /// Type a command line into the session and submit it.
    fn run_command(&self, name: &str, cmd: &str) -> Result<(), MuxError> {
        self.send_text(name, cmd)?;
        self.send_key(name, ControlKey::Enter)
    }

    /// Submit an arbitrary shell script to the session.
    ///
    /// The script travels base64-encoded so its quoting can never interfere
    /// with the keystroke channel, and the session's shell exits once the
    /// script returns, so the session never outlives it. An interrupted
    /// script leaves the shell (and the session) alive.
    fn submit_script(&self, name: &str, script: &str) -> Result<(), MuxError> {
        self.run_command(name, &detached_script_line(script))
    }
}

/// Build a single shell line that decodes and runs `script` under bash.
///
/// The line only contains base64 alphabet characters plus a fixed pipeline,
/// whatever the script holds.
pub fn encoded_script_line(script: &str) -> String {
    format!("echo {} | base64 -d | bash", STANDARD.encode(script.as_bytes()))
}

/// Like [`encoded_script_line`], followed by `exit` so the hosting shell
/// terminates after the script.
pub fn detached_script_line(script: &str) -> String {
    format!("{}; exit", encoded_script_line(script))
}

/// Quote a string for safe inclusion as a single bash word.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
