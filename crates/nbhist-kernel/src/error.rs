//! Error types for history tracking.

use thiserror::Error;

use nbhist_diff::DiffError;

use crate::config::ConfigError;

/// Errors surfaced by the tracker, queues, and snapshot scheduler.
#[derive(Error, Debug)]
pub enum HistoryError {
    /// The actions database could not be opened or written.
    ///
    /// Queued entries survive this error and go out with the next flush.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Reading the prior document failed.
    #[error(transparent)]
    Diff(#[from] DiffError),

    /// Filesystem error writing documents or creating directories.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document or queue entry could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for HistoryError {
    fn from(e: tokio::task::JoinError) -> Self {
        HistoryError::Task(e.to_string())
    }
}
