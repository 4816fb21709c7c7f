//! Error types for rlm-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for rlm-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rlm-core.
///
/// Snippet execution never surfaces these: the engine folds every failure of a
/// single run into an [`ExecutionResult`](crate::ExecutionResult). They cover
/// the registry, loader, configuration and worker plumbing.
#[derive(Debug, Error)]
pub enum Error {
    /// Reset quota for a session has been used up.
    #[error(
        "Reset limit reached ({limit} resets for session '{session}'). You have enough data. \
         STOP and summarize your findings now. Do NOT attempt further resets."
    )]
    ResetQuotaExceeded { session: String, limit: u32 },

    /// No session registered under the identifier.
    #[error("no session '{0}'. Load a file to start.")]
    SessionNotFound(String),

    /// Content file does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Malformed configuration value.
    #[error("invalid configuration for {key}: {message}")]
    Config { key: String, message: String },

    /// No interpreter could be located or started.
    #[error("failed to start worker: {0}")]
    Spawn(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IPC communication error with worker process.
    #[error("IPC error: {0}")]
    Ipc(String),
}

impl Error {
    /// Whether the error is a quota refusal the caller should not retry.
    pub fn is_quota(&self) -> bool {
        matches!(self, Error::ResetQuotaExceeded { .. })
    }
}
