//! Core error types for task management.

use tm_mux_core::MuxError;

/// Core error type for all task management operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Task error: {message}")]
    Task { message: String },

    #[error("task {id} not found")]
    NotFound { id: String },

    #[error("Session error: {0}")]
    Session(#[from] MuxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Registry lock error: {0}")]
    Lock(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl Error {
    /// Create a new task-related error.
    pub fn task<S: Into<String>>(message: S) -> Self {
        Self::Task {
            message: message.into(),
        }
    }

    /// The error reported for ids absent from the registry.
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new notification error.
    pub fn notify<S: Into<String>>(message: S) -> Self {
        Self::Notify(message.into())
    }

    /// Create a new generic error.
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }
}
