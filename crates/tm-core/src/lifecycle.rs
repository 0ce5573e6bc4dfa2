//! Lifecycle controller.
//!
//! Orchestrates the allocator, registry, log store and multiplexer to move
//! tasks through their state machine. Each public operation is one
//! load-mutate-save cycle under the exclusive registry lock; notifications
//! for terminal transitions are delivered after that cycle has committed and
//! the lock has been released.

use crate::allocator;
use crate::artifacts::{tail_lines, LogStore};
use crate::config::TaskManagerConfig;
use crate::notify::{notifier_from_settings, NotificationTrigger, Notifier};
use crate::registry::{TaskMap, TaskRegistry};
use crate::task::{NewTask, Task, TaskStatus};
use crate::Error;
use chrono::Utc;
use std::cmp::Ordering;
use tm_mux_core::{shell_quote, ControlKey, SessionMultiplexer, SessionOptions};
use tracing::{debug, info, warn};

/// Environment variable carrying the task id inside its session.
pub const TASK_ID_ENV: &str = "TM_TASK_ID";

/// Notification journal file name inside the log directory.
pub const NOTIFY_JOURNAL: &str = "notify.log";

/// Boxed multiplexer backend used by the controller.
pub type Multiplexer = Box<dyn SessionMultiplexer + Send + Sync>;

/// Output retrieved for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    /// Captured from the still-open session.
    Live(String),
    /// Read from the tail of the log artifact.
    Logged(String),
    /// No session and no log artifact.
    Unavailable,
}

impl TaskOutput {
    pub fn text(&self) -> Option<&str> {
        match self {
            TaskOutput::Live(text) | TaskOutput::Logged(text) => Some(text),
            TaskOutput::Unavailable => None,
        }
    }
}

pub struct TaskController {
    config: TaskManagerConfig,
    registry: TaskRegistry,
    logs: LogStore,
    mux: Multiplexer,
    trigger: NotificationTrigger,
}

impl TaskController {
    pub fn new(
        config: TaskManagerConfig,
        mux: Multiplexer,
        notifier: Box<dyn Notifier>,
    ) -> crate::Result<Self> {
        config.ensure_dirs()?;
        let logs_dir = config.logs_dir();
        Ok(Self {
            registry: TaskRegistry::from_config(&config),
            logs: LogStore::new(&logs_dir),
            trigger: NotificationTrigger::new(notifier).with_journal(logs_dir.join(NOTIFY_JOURNAL)),
            mux,
            config,
        })
    }

    /// Controller using the configured backend and notification settings.
    pub fn from_config(config: TaskManagerConfig) -> crate::Result<Self> {
        let mux = tm_mux::multiplexer_by_name(&config.mux_backend)?;
        if !mux.is_available() {
            warn!(backend = mux.id(), "Multiplexer does not appear to be installed");
        }
        let notifier = notifier_from_settings(&config.notify);
        Self::new(config, mux, notifier)
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.config
    }

    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Register a new pending task. Does not touch the multiplexer.
    pub fn create(&self, spec: NewTask) -> crate::Result<Task> {
        let task = self.registry.update(|tasks| {
            let id = allocator::allocate(tasks, &self.logs)?;
            let task = Task::new(id.clone(), spec);
            tasks.insert(id, task.clone());
            Ok(task)
        })?;

        info!(task = %task.id, name = %task.name, "Created task");
        Ok(task)
    }

    /// Start a pending task in a new session.
    ///
    /// A session that cannot be set up leaves the task `failed` with the
    /// backend's diagnostic; that is reported through the returned snapshot,
    /// not as an `Err`.
    pub fn start(&self, id: &str) -> crate::Result<Task> {
        let task = self.registry.update(|tasks| {
            let task = entry(tasks, id)?;
            self.launch(task)?;
            Ok(task.clone())
        })?;

        if task.status.is_terminal() {
            self.trigger.on_terminal_transition(&task);
        }
        Ok(task)
    }

    /// Refresh a task from its session and return the result.
    pub fn reconcile(&self, id: &str) -> crate::Result<Task> {
        let (task, settled) = self.registry.update(|tasks| {
            let task = entry(tasks, id)?;
            let settled = self.reconcile_entry(task)?;
            Ok((task.clone(), settled))
        })?;

        if settled {
            self.trigger.on_terminal_transition(&task);
        }
        Ok(task)
    }

    pub fn get(&self, id: &str) -> crate::Result<Task> {
        self.reconcile(id)
    }

    /// Settle a running task from its recorded exit status.
    ///
    /// Called from inside the task's session right after the job exits, so
    /// the session is normally still alive. Tasks that are no longer running
    /// are returned unchanged.
    pub fn finalize(&self, id: &str) -> crate::Result<Task> {
        let (task, settled) = self.registry.update(|tasks| {
            let task = entry(tasks, id)?;
            let settled = if task.status == TaskStatus::Running {
                self.settle(task)?
            } else {
                debug!(task = id, status = %task.status, "Nothing to finalize");
                false
            };
            Ok((task.clone(), settled))
        })?;

        if settled {
            self.trigger.on_terminal_transition(&task);
        }
        Ok(task)
    }

    /// Reconcile every task and return them ordered for display: running
    /// first, then by priority, then newest first.
    pub fn list(&self, filter: Option<TaskStatus>) -> crate::Result<Vec<Task>> {
        let (mut all, settled) = self.registry.update(|tasks| {
            let mut settled = Vec::new();
            for task in tasks.values_mut() {
                match self.reconcile_entry(task) {
                    Ok(true) => settled.push(task.clone()),
                    Ok(false) => {}
                    Err(e) => warn!(task = %task.id, error = %e, "Failed to reconcile task"),
                }
            }
            Ok((tasks.values().cloned().collect::<Vec<_>>(), settled))
        })?;

        for task in &settled {
            self.trigger.on_terminal_transition(task);
        }

        if let Some(status) = filter {
            all.retain(|task| task.status == status);
        }
        all.sort_by(display_order);
        Ok(all)
    }

    /// Stop a pending or running task; the task ends `killed`.
    ///
    /// A graceful stop interrupts the job, waits the grace period and tears
    /// the session down if it is still there. A forced stop tears it down
    /// immediately. A task waiting for a retry is killed without being
    /// relaunched.
    pub fn stop(&self, id: &str, force: bool) -> crate::Result<Task> {
        let (task, announce, stopped) = self.registry.update(|tasks| {
            let task = entry(tasks, id)?;
            let mut settled = false;
            if task.status == TaskStatus::Running && !self.mux.has_session(&task.session_handle)
            {
                settled = self.settle(task)?;
            }
            if task.status.is_terminal() {
                return Ok((task.clone(), settled, false));
            }
            if self.mux.has_session(&task.session_handle) {
                self.terminate(&task.session_handle, force)?;
            }
            task.transition(TaskStatus::Killed)?;
            Ok((task.clone(), true, true))
        })?;

        if announce {
            self.trigger.on_terminal_transition(&task);
        }
        if !stopped {
            return Err(already_finished(&task));
        }
        info!(task = %task.id, force, "Stopped task");
        Ok(task)
    }

    /// Stop every running task, reporting each outcome.
    pub fn stop_all(&self, force: bool) -> crate::Result<Vec<(String, crate::Result<Task>)>> {
        let running = self.list(Some(TaskStatus::Running))?;
        Ok(running
            .into_iter()
            .map(|task| {
                let result = self.stop(&task.id, force);
                (task.id, result)
            })
            .collect())
    }

    /// Remove a task and every log artifact named after it.
    ///
    /// Any lingering session is torn down first. Returns how many artifacts
    /// were deleted.
    pub fn cleanup(&self, id: &str) -> crate::Result<usize> {
        let removed = self.registry.update(|tasks| {
            let task = tasks.remove(id).ok_or_else(|| Error::not_found(id))?;
            if self.mux.has_session(&task.session_handle) {
                if let Err(e) = self.mux.kill_session(&task.session_handle) {
                    warn!(task = id, error = %e, "Failed to tear down lingering session");
                }
            }
            Ok(self.logs.remove_all(&task.id))
        })?;

        info!(task = id, artifacts = removed, "Cleaned up task");
        Ok(removed)
    }

    /// Clean up every finished task whose end time is older than `max_age`.
    ///
    /// A negative `max_age` or a cutoff before the representable range
    /// matches nothing.
    pub fn cleanup_by_age(&self, max_age: chrono::Duration) -> crate::Result<Vec<String>> {
        if max_age < chrono::Duration::zero() {
            return Ok(Vec::new());
        }
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return Ok(Vec::new());
        };
        let expired: Vec<String> = self
            .registry
            .snapshot()?
            .into_values()
            .filter(|task| task.status.is_terminal() && task.end_time.is_some_and(|end| end < cutoff))
            .map(|task| task.id)
            .collect();

        let mut cleaned = Vec::with_capacity(expired.len());
        for id in expired {
            match self.cleanup(&id) {
                Ok(_) => cleaned.push(id),
                Err(e) => warn!(task = %id, error = %e, "Failed to clean up expired task"),
            }
        }
        Ok(cleaned)
    }

    /// Last `max_lines` lines of output, live from the session when it is
    /// still open and from the log artifact otherwise.
    pub fn capture_output(&self, id: &str, max_lines: i64) -> crate::Result<TaskOutput> {
        let task = self.snapshot_of(id)?;

        if self.mux.has_session(&task.session_handle) {
            match self.mux.capture_pane(&task.session_handle) {
                Ok(text) => return Ok(TaskOutput::Live(tail_lines(&text, max_lines))),
                Err(e) => warn!(task = id, error = %e, "Live capture failed, reading log"),
            }
        }

        Ok(match self.logs.tail(id, max_lines)? {
            Some(text) => TaskOutput::Logged(text),
            None => TaskOutput::Unavailable,
        })
    }

    /// Tail of the task's log artifact, ignoring any live session.
    pub fn read_log(&self, id: &str, max_lines: i64) -> crate::Result<Option<String>> {
        self.snapshot_of(id)?;
        self.logs.tail(id, max_lines)
    }

    /// Deliver a synthetic event through the configured notifier.
    pub fn send_test_notification(&self) -> crate::Result<()> {
        self.trigger.send_test()
    }

    fn snapshot_of(&self, id: &str) -> crate::Result<Task> {
        self.registry
            .snapshot()?
            .remove(id)
            .ok_or_else(|| Error::not_found(id))
    }

    /// Returns whether the task reached a terminal state that must be announced.
    fn reconcile_entry(&self, task: &mut Task) -> crate::Result<bool> {
        match task.status {
            TaskStatus::Running if !self.mux.has_session(&task.session_handle) => {
                debug!(task = %task.id, "Session is gone, settling task");
                let settled = self.settle(task)?;
                if task.awaiting_retry() {
                    self.launch(task)?;
                    return Ok(task.status.is_terminal());
                }
                Ok(settled)
            }
            TaskStatus::Pending
                if task.awaiting_retry() && !self.mux.has_session(&task.session_handle) =>
            {
                self.launch(task)?;
                Ok(task.status.is_terminal())
            }
            _ => Ok(false),
        }
    }

    /// Move a running task to its terminal state from the exit status file.
    ///
    /// A non-zero exit with retries left requeues the task instead; that is
    /// not announced.
    fn settle(&self, task: &mut Task) -> crate::Result<bool> {
        match self.logs.read_exit_code(&task.id) {
            Some(0) => {
                task.exit_code = Some(0);
                task.transition(TaskStatus::Completed)?;
            }
            Some(code) => {
                task.exit_code = Some(code);
                task.error_message = Some(format!("job exited with status {}", code));
                task.transition(TaskStatus::Failed)?;

                if task.can_retry() {
                    task.requeue_for_retry()?;
                    self.logs.clear_exit_code(&task.id);
                    info!(
                        task = %task.id,
                        exit_code = code,
                        attempt = task.retry_count,
                        max_retries = task.max_retries,
                        "Job failed, queued for retry"
                    );
                    return Ok(false);
                }
            }
            None => {
                warn!(task = %task.id, "No exit status recorded, assuming completion");
                task.transition(TaskStatus::Completed)?;
            }
        }

        info!(task = %task.id, status = %task.status, exit_code = ?task.exit_code, "Task finished");
        Ok(true)
    }

    fn launch(&self, task: &mut Task) -> crate::Result<()> {
        if task.status != TaskStatus::Pending {
            return Err(Error::task(format!(
                "task {} is {}, only pending tasks can be started",
                task.id, task.status
            )));
        }
        self.logs.clear_exit_code(&task.id);

        let env = [(TASK_ID_ENV, task.id.as_str())];
        let opts = SessionOptions {
            cwd: task.working_dir.as_deref(),
            env: Some(&env),
        };
        if let Err(e) = self.mux.open_session(&task.session_handle, &opts) {
            warn!(task = %task.id, error = %e, "Failed to open session");
            task.error_message = Some(e.to_string());
            return task.transition(TaskStatus::Failed);
        }

        if let Err(e) = self.attach_job(task) {
            warn!(task = %task.id, error = %e, "Failed to submit job, tearing session down");
            if let Err(kill) = self.mux.kill_session(&task.session_handle) {
                debug!(task = %task.id, error = %kill, "Session teardown after failed submit");
            }
            task.error_message = Some(e.to_string());
            return task.transition(TaskStatus::Failed);
        }

        task.transition(TaskStatus::Running)?;
        task.exit_code = None;
        task.error_message = None;
        task.pid = match self.mux.pane_pid(&task.session_handle) {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!(task = %task.id, error = %e, "No pid available");
                None
            }
        };

        info!(
            task = %task.id,
            session = %task.session_handle,
            pid = ?task.pid,
            "Started task"
        );
        Ok(())
    }

    fn attach_job(&self, task: &Task) -> crate::Result<()> {
        let log_path = self.logs.write_header(task)?;
        self.mux.pipe_output(&task.session_handle, &log_path)?;
        self.mux
            .submit_script(&task.session_handle, &self.job_script(task))?;
        Ok(())
    }

    /// Script run inside the session: the job, then its exit status, then
    /// the in-session finalize call when a finalize program is configured.
    fn job_script(&self, task: &Task) -> String {
        let mut script = String::new();
        if task.realtime {
            script.push_str("export PYTHONUNBUFFERED=1\n");
            script.push_str(&format!(
                "(\nstdbuf -oL -eL bash -c {}\n) </dev/null 2>&1\n",
                shell_quote(&task.command)
            ));
        } else {
            // The script itself arrives on bash's stdin; keep the job off it.
            script.push_str(&format!("(\n{}\n) </dev/null 2>&1\n", task.command));
        }
        script.push_str("__tm_rc=$?\n");
        script.push_str(&format!(
            "echo \"$__tm_rc\" > {}\n",
            shell_quote(&self.logs.exit_path(&task.id).to_string_lossy())
        ));

        if let Some(program) = &self.config.finalize_program {
            script.push_str(&format!(
                "{} --root {} _finalize {}\n",
                shell_quote(&program.to_string_lossy()),
                shell_quote(&self.config.root_dir.to_string_lossy()),
                task.id
            ));
        }
        script
    }

    fn terminate(&self, session: &str, force: bool) -> crate::Result<()> {
        if !force {
            match self.mux.send_key(session, ControlKey::Interrupt) {
                Ok(()) => {
                    std::thread::sleep(self.config.grace_period);
                    if !self.mux.has_session(session) {
                        debug!(session, "Session exited after interrupt");
                        return Ok(());
                    }
                    debug!(session, "Session survived the grace period, escalating");
                }
                Err(e) => warn!(session, error = %e, "Failed to interrupt session, escalating"),
            }
        }

        if let Err(e) = self.mux.kill_session(session) {
            if self.mux.has_session(session) {
                return Err(e.into());
            }
            debug!(session, "Session vanished before teardown");
        }
        Ok(())
    }
}

fn entry<'a>(tasks: &'a mut TaskMap, id: &str) -> crate::Result<&'a mut Task> {
    tasks.get_mut(id).ok_or_else(|| Error::not_found(id))
}

fn already_finished(task: &Task) -> Error {
    Error::task(format!("task {} is already {}", task.id, task.status))
}

fn display_order(a: &Task, b: &Task) -> Ordering {
    let running = |t: &Task| t.status == TaskStatus::Running;
    let numeric = |t: &Task| t.id.parse::<u64>().unwrap_or(0);

    running(b)
        .cmp(&running(a))
        .then(b.priority.cmp(&a.priority))
        .then(numeric(b).cmp(&numeric(a)))
        .then_with(|| b.id.cmp(&a.id))
}
