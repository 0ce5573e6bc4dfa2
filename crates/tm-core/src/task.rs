//! Task data model and the lifecycle state machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Width of the zero-padded textual task id (`00001`).
pub const TASK_ID_WIDTH: usize = 5;

/// Format a counter value as a task id.
pub fn format_task_id(n: u64) -> String {
    format!("{:0width$}", n, width = TASK_ID_WIDTH)
}

/// Name of the multiplexer session hosting the task with this id.
pub fn session_handle(id: &str) -> String {
    format!("task_{}", id)
}

/// Status of a task in its lifecycle.
///
/// `pending → running → {completed | failed | killed}`; a pending task may
/// also go straight to `failed` (its session could not be opened) or
/// `killed` (stopped before it ever ran). Terminal states have no outgoing
/// edges except the bounded retry `failed → pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Task has been created but not yet started.
    Pending,
    /// Task is running inside its session.
    Running,
    /// The job exited with status 0 (or its status could not be read).
    Completed,
    /// The session could not be started, or the job exited non-zero.
    Failed,
    /// The task was stopped by the user.
    Killed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Killed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Killed => "killed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Killed
        )
    }

    fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Killed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Killed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::task(format!("unknown task status: {}", s)))
    }
}

/// How a finished task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The job ran to completion; `None` when its exit status was not recorded.
    Completed { exit_code: Option<i32> },
    /// The user stopped the task.
    Stopped,
    /// The session failed to start or the job exited non-zero.
    Failed { reason: String },
}

/// Represents a background job hosted in its own multiplexer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub command: String,
    pub session_handle: String,
    pub status: TaskStatus,
    /// Display ordering only; never gates execution.
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub retry_count: u32,
    /// Run the job line-buffered so mirrored output appears promptly.
    #[serde(default)]
    pub realtime: bool,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Caller-supplied parameters for a new task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub name: String,
    pub command: String,
    pub priority: i64,
    pub max_retries: u32,
    pub realtime: bool,
    pub working_dir: Option<PathBuf>,
}

impl NewTask {
    pub fn new<N: Into<String>, C: Into<String>>(name: N, command: C) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Default::default()
        }
    }
}

impl Task {
    /// Create a pending task with the given id.
    pub fn new(id: String, spec: NewTask) -> Self {
        Self {
            session_handle: session_handle(&id),
            id,
            name: spec.name,
            command: spec.command,
            status: TaskStatus::Pending,
            priority: spec.priority,
            max_retries: spec.max_retries,
            retry_count: 0,
            realtime: spec.realtime,
            working_dir: spec.working_dir,
            created_time: Utc::now(),
            start_time: None,
            end_time: None,
            pid: None,
            exit_code: None,
            error_message: None,
        }
    }

    /// Move to `next`, stamping start/end times on the way.
    pub fn transition(&mut self, next: TaskStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(crate::Error::task(format!(
                "task {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }

        let now = Utc::now();
        if next == TaskStatus::Running {
            self.start_time = Some(now);
        }
        if next.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(now);
        }
        self.status = next;
        Ok(())
    }

    /// Whether a failed task still has automatic restarts left.
    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_count < self.max_retries
    }

    /// Bounded automatic restart: `failed → pending`.
    pub fn requeue_for_retry(&mut self) -> crate::Result<()> {
        if !self.can_retry() {
            return Err(crate::Error::task(format!(
                "task {} has no retries left ({}/{})",
                self.id, self.retry_count, self.max_retries
            )));
        }
        self.retry_count += 1;
        self.status = TaskStatus::Pending;
        self.start_time = None;
        self.end_time = None;
        self.pid = None;
        Ok(())
    }

    /// Whether this pending task is waiting for an automatic restart.
    pub fn awaiting_retry(&self) -> bool {
        self.status == TaskStatus::Pending && self.retry_count > 0
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        match self.status {
            TaskStatus::Pending | TaskStatus::Running => None,
            TaskStatus::Completed => Some(TaskOutcome::Completed {
                exit_code: self.exit_code,
            }),
            TaskStatus::Killed => Some(TaskOutcome::Stopped),
            TaskStatus::Failed => Some(TaskOutcome::Failed {
                reason: self
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            }),
        }
    }

    /// Wall time spent running: start to end, or start to `now` while running.
    pub fn duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        let start = self.start_time?;
        Some(self.end_time.unwrap_or(now) - start)
    }
}

/// Render a duration as `HH:MM:SS`, or `Dd HH:MM:SS` past one day.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}
