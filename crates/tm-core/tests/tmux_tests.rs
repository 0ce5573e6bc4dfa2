//! End-to-end lifecycle against a real tmux server.
//!
//! Each test talks to its own tmux socket and is skipped when tmux is not
//! installed.

use std::fs;
use std::process::Command;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tm_core::{NewTask, NoopNotifier, TaskController, TaskManagerConfig, TaskStatus};
use tm_mux::tmux::TmuxMultiplexer;
use tm_mux_core::SessionMultiplexer;

struct Server {
    socket: String,
    tmux: TmuxMultiplexer,
}

impl Server {
    fn isolated(tag: &str) -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis();
        let socket = format!("tm-core-{}-{}", tag, millis);
        Self {
            tmux: TmuxMultiplexer::with_socket_name(socket.clone()),
            socket,
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = Command::new("tmux")
            .args(["-L", &self.socket, "kill-server"])
            .output();
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    cond()
}

fn controller(dir: &TempDir, server: &Server) -> TaskController {
    let config = TaskManagerConfig::with_root(dir.path()).with_grace_period(Duration::from_millis(300));
    TaskController::new(config, Box::new(server.tmux.clone()), Box::new(NoopNotifier)).unwrap()
}

#[test]
fn test_session_ends_with_job_and_exit_status_is_observed() {
    let server = Server::isolated("exit");
    if !server.tmux.is_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let ctl = controller(&dir, &server);

    let task = ctl
        .create(NewTask::new("e2e", "echo \"hello from 'job'\"; exit 3"))
        .unwrap();
    let task = ctl.start(&task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Running);

    assert!(wait_until(Duration::from_secs(10), || {
        !server.tmux.has_session(&task.session_handle)
    }));

    let settled = ctl.reconcile(&task.id).unwrap();
    assert_eq!(settled.status, TaskStatus::Failed);
    assert_eq!(settled.exit_code, Some(3));

    let log_path = ctl.logs().log_path(&task.id);
    assert!(wait_until(Duration::from_secs(5), || {
        fs::read_to_string(&log_path)
            .map(|log| log.contains("hello from 'job'"))
            .unwrap_or(false)
    }));
}

#[test]
fn test_stop_tears_down_long_running_job() {
    let server = Server::isolated("stop");
    if !server.tmux.is_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let ctl = controller(&dir, &server);

    let task = ctl.create(NewTask::new("sleeper", "sleep 300")).unwrap();
    let task = ctl.start(&task.id).unwrap();
    assert!(server.tmux.has_session(&task.session_handle));

    let stopped = ctl.stop(&task.id, false).unwrap();
    assert_eq!(stopped.status, TaskStatus::Killed);
    assert!(!server.tmux.has_session(&task.session_handle));
    assert!(ctl.logs().read_exit_code(&task.id).is_none());
}
