//! Completion notifications.
//!
//! The controller calls [`NotificationTrigger::on_terminal_transition`] after
//! a terminal transition has been persisted. Delivery is best effort: any
//! notifier error is logged and recorded in the journal, never returned.

use crate::config::NotificationSettings;
use crate::task::{format_duration, Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Read-only description of a finished task handed to notifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionEvent {
    pub task_id: String,
    pub name: String,
    pub status: TaskStatus,
    /// Formatted run time (`HH:MM:SS`), absent if the task never started.
    pub duration: Option<String>,
    pub duration_secs: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub command: String,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
}

impl CompletionEvent {
    pub fn from_task(task: &Task) -> Self {
        let duration = task.duration(task.end_time.unwrap_or_else(Utc::now));
        Self {
            task_id: task.id.clone(),
            name: task.name.clone(),
            status: task.status,
            duration: duration.map(format_duration),
            duration_secs: duration.map(|d| d.num_seconds()),
            start_time: task.start_time,
            end_time: task.end_time,
            command: task.command.clone(),
            exit_code: task.exit_code,
            error_message: task.error_message.clone(),
        }
    }

    pub fn subject(&self) -> String {
        format!("Task {}: {} ({})", self.status, self.name, self.task_id)
    }

    pub fn body(&self) -> String {
        fn time(t: Option<DateTime<Utc>>) -> String {
            t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "N/A".to_string())
        }

        let mut body = format!(
            "Task ID: {}\nName: {}\nStatus: {}\nDuration: {}\nStart: {}\nEnd: {}\nCommand: {}\n",
            self.task_id,
            self.name,
            self.status,
            self.duration.as_deref().unwrap_or("N/A"),
            time(self.start_time),
            time(self.end_time),
            self.command,
        );
        if let Some(code) = self.exit_code {
            body.push_str(&format!("Exit code: {}\n", code));
        }
        if let Some(error) = &self.error_message {
            body.push_str(&format!("Error: {}\n", error));
        }
        body
    }
}

/// Delivery channel for completion events.
pub trait Notifier: Send + Sync {
    /// Short channel name used in logs and the journal.
    fn id(&self) -> &'static str;

    fn notify(&self, event: &CompletionEvent) -> crate::Result<()>;
}

/// Used when notifications are disabled.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn id(&self) -> &'static str {
        "noop"
    }

    fn notify(&self, event: &CompletionEvent) -> crate::Result<()> {
        debug!(task = %event.task_id, "Notifications disabled");
        Ok(())
    }
}

/// POSTs each event as JSON.
pub struct WebhookNotifier {
    url: String,
    agent: ureq::Agent,
}

impl WebhookNotifier {
    pub fn new<S: Into<String>>(url: S, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn id(&self) -> &'static str {
        "webhook"
    }

    fn notify(&self, event: &CompletionEvent) -> crate::Result<()> {
        self.agent
            .post(&self.url)
            .send_json(event)
            .map_err(|e| crate::Error::notify(format!("POST {} failed: {}", self.url, e)))?;
        Ok(())
    }
}

/// Runs a user shell hook with the event in `TM_TASK_*` variables.
pub struct CommandNotifier {
    command: String,
}

impl CommandNotifier {
    pub fn new<S: Into<String>>(command: S) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Notifier for CommandNotifier {
    fn id(&self) -> &'static str {
        "hook"
    }

    fn notify(&self, event: &CompletionEvent) -> crate::Result<()> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .env("TM_TASK_ID", &event.task_id)
            .env("TM_TASK_NAME", &event.name)
            .env("TM_TASK_STATUS", event.status.as_str())
            .env("TM_TASK_COMMAND", &event.command)
            .env("TM_TASK_SUBJECT", event.subject())
            .env("TM_TASK_DURATION", event.duration.as_deref().unwrap_or(""))
            .env(
                "TM_TASK_EXIT_CODE",
                event.exit_code.map(|c| c.to_string()).unwrap_or_default(),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let status = cmd.status()?;
        if status.success() {
            Ok(())
        } else {
            Err(crate::Error::notify(format!(
                "hook `{}` exited with {}",
                self.command, status
            )))
        }
    }
}

/// Delivers to every channel; fails if any channel fails.
pub struct FanoutNotifier {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

impl Notifier for FanoutNotifier {
    fn id(&self) -> &'static str {
        "fanout"
    }

    fn notify(&self, event: &CompletionEvent) -> crate::Result<()> {
        let failures: Vec<String> = self
            .notifiers
            .iter()
            .filter_map(|n| n.notify(event).err().map(|e| format!("{}: {}", n.id(), e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(crate::Error::notify(failures.join("; ")))
        }
    }
}

/// Build the notifier described by the user's settings.
pub fn notifier_from_settings(settings: &NotificationSettings) -> Box<dyn Notifier> {
    if !settings.enabled {
        return Box::new(NoopNotifier);
    }

    let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
    if let Some(url) = &settings.webhook_url {
        channels.push(Box::new(WebhookNotifier::new(
            url.clone(),
            Duration::from_secs(settings.timeout_secs),
        )));
    }
    if let Some(hook) = &settings.hook_command {
        channels.push(Box::new(CommandNotifier::new(hook.clone())));
    }

    match channels.len() {
        0 => {
            warn!("Notifications enabled but no webhook or hook configured");
            Box::new(NoopNotifier)
        }
        1 => channels.remove(0),
        _ => Box::new(FanoutNotifier::new(channels)),
    }
}

/// Hands terminal transitions to a notifier and journals each attempt.
pub struct NotificationTrigger {
    notifier: Box<dyn Notifier>,
    journal: Option<PathBuf>,
}

impl NotificationTrigger {
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        Self {
            notifier,
            journal: None,
        }
    }

    /// Append one line per attempt to `path`.
    pub fn with_journal<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.journal = Some(path.into());
        self
    }

    pub fn on_terminal_transition(&self, task: &Task) {
        if !task.status.is_terminal() {
            debug!(task = %task.id, status = %task.status, "Not terminal, nothing to announce");
            return;
        }

        let event = CompletionEvent::from_task(task);
        let result = self.notifier.notify(&event);
        match &result {
            Ok(()) => info!(task = %event.task_id, channel = self.notifier.id(), "{}", event.subject()),
            Err(e) => warn!(task = %event.task_id, channel = self.notifier.id(), error = %e, "Notification failed"),
        }
        self.record(&event, &result);
    }

    /// Deliver a synthetic event, returning the notifier's result.
    pub fn send_test(&self) -> crate::Result<()> {
        let now = Utc::now();
        let event = CompletionEvent {
            task_id: "00000".to_string(),
            name: "notification test".to_string(),
            status: TaskStatus::Completed,
            duration: Some(format_duration(chrono::Duration::zero())),
            duration_secs: Some(0),
            start_time: Some(now),
            end_time: Some(now),
            command: "true".to_string(),
            exit_code: Some(0),
            error_message: None,
        };
        let result = self.notifier.notify(&event);
        self.record(&event, &result);
        result
    }

    fn record(&self, event: &CompletionEvent, result: &crate::Result<()>) {
        let Some(path) = &self.journal else {
            return;
        };

        let outcome = match result {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("error: {}", e),
        };
        let line = format!(
            "[{}] {} {} via {}: {}\n",
            Utc::now().to_rfc3339(),
            event.task_id,
            event.status,
            self.notifier.id(),
            outcome
        );

        let written = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(path))
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "Failed to write notification journal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::NewTask;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct Failing;

    impl Notifier for Failing {
        fn id(&self) -> &'static str {
            "failing"
        }

        fn notify(&self, _: &CompletionEvent) -> crate::Result<()> {
            Err(crate::Error::notify("mail server on fire"))
        }
    }

    #[derive(Clone, Default)]
    struct Recording(Arc<Mutex<Vec<CompletionEvent>>>);

    impl Notifier for Recording {
        fn id(&self) -> &'static str {
            "recording"
        }

        fn notify(&self, event: &CompletionEvent) -> crate::Result<()> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn finished_task() -> Task {
        let mut task = Task::new("00003".to_string(), NewTask::new("build", "make all"));
        task.transition(TaskStatus::Running).unwrap();
        task.exit_code = Some(0);
        task.transition(TaskStatus::Completed).unwrap();
        task
    }

    #[test]
    fn test_event_describes_task() {
        let event = CompletionEvent::from_task(&finished_task());
        assert_eq!(event.subject(), "Task completed: build (00003)");
        assert_eq!(event.duration.as_deref(), Some("00:00:00"));

        let body = event.body();
        assert!(body.contains("Task ID: 00003"));
        assert!(body.contains("Command: make all"));
        assert!(body.contains("Exit code: 0"));
    }

    #[test]
    fn test_failure_is_swallowed_and_journaled() {
        let dir = TempDir::new().unwrap();
        let journal = dir.path().join("logs").join("notify.log");
        let trigger = NotificationTrigger::new(Box::new(Failing)).with_journal(&journal);

        trigger.on_terminal_transition(&finished_task());

        let content = fs::read_to_string(&journal).unwrap();
        assert!(content.contains("00003 completed via failing: error:"));
        assert!(content.contains("mail server on fire"));
    }

    #[test]
    fn test_non_terminal_tasks_are_not_announced() {
        let recording = Recording::default();
        let trigger = NotificationTrigger::new(Box::new(recording.clone()));

        let mut task = Task::new("00001".to_string(), NewTask::new("x", "true"));
        trigger.on_terminal_transition(&task);
        task.transition(TaskStatus::Running).unwrap();
        trigger.on_terminal_transition(&task);

        assert!(recording.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_send_test_reports_notifier_result() {
        assert!(NotificationTrigger::new(Box::new(Failing)).send_test().is_err());
        assert!(NotificationTrigger::new(Box::new(NoopNotifier)).send_test().is_ok());
    }

    #[test]
    fn test_fanout_reaches_every_channel() {
        let recording = Recording::default();
        let fanout = FanoutNotifier::new(vec![
            Box::new(Failing),
            Box::new(recording.clone()),
        ]);

        let err = fanout
            .notify(&CompletionEvent::from_task(&finished_task()))
            .unwrap_err();
        assert!(err.to_string().contains("failing"));
        assert_eq!(recording.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_settings_select_channels() {
        let mut settings = NotificationSettings::default();
        assert_eq!(notifier_from_settings(&settings).id(), "noop");

        settings.enabled = true;
        assert_eq!(notifier_from_settings(&settings).id(), "noop");

        settings.hook_command = Some("true".to_string());
        assert_eq!(notifier_from_settings(&settings).id(), "hook");

        settings.webhook_url = Some("http://127.0.0.1:9/".to_string());
        assert_eq!(notifier_from_settings(&settings).id(), "fanout");
    }

    #[cfg(unix)]
    #[test]
    fn test_hook_receives_event_environment() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("hook.out");
        let hook = CommandNotifier::new(format!(
            "echo \"$TM_TASK_ID $TM_TASK_STATUS $TM_TASK_EXIT_CODE\" > '{}'",
            out.display()
        ));

        hook.notify(&CompletionEvent::from_task(&finished_task())).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "00003 completed 0");

        assert!(CommandNotifier::new("exit 7")
            .notify(&CompletionEvent::from_task(&finished_task()))
            .is_err());
    }
}
