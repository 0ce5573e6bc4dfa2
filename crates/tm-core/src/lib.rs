//! Core task lifecycle and session orchestration for tmux-hosted jobs.
//!
//! This crate provides the task model, the persistent registry, identifier
//! allocation and the lifecycle controller that starts, reconciles, stops and
//! cleans up background jobs running in terminal multiplexer sessions.

pub mod allocator;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod registry;
pub mod resources;
pub mod task;

/// Core result type used throughout the task manager.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type that encompasses all task manager operations.
pub use error::Error;

/// Task model and state machine.
pub use task::{format_duration, NewTask, Task, TaskOutcome, TaskStatus};

/// Configuration threaded into the controller.
pub use config::{NotificationSettings, Settings, TaskManagerConfig};

/// Lifecycle orchestration.
pub use lifecycle::{Multiplexer, TaskController, TaskOutput};

/// Durable task storage.
pub use registry::{TaskMap, TaskRegistry};

/// Per-task log artifacts.
pub use artifacts::LogStore;

/// Completion notification channels.
pub use notify::{
    notifier_from_settings, CommandNotifier, CompletionEvent, FanoutNotifier, NoopNotifier,
    NotificationTrigger, Notifier, WebhookNotifier,
};

/// Host resource sampling for display.
pub use resources::{ResourceSampler, ResourceSnapshot, SystemSampler};
