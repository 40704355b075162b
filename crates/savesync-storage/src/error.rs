use std::time::Duration;

use savesync_core::error::SaveSyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("{0} is not initialized")]
    NotInitialized(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("{0} was cancelled")]
    Cancelled(&'static str),

    #[error("Credential storage error: {0}")]
    Credentials(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Archive(#[from] SaveSyncError),
}

impl StorageError {
    /// Timeouts and cancellations are expected outcomes, reported as status
    /// text rather than failures.
    pub fn is_interruption(&self) -> bool {
        matches!(self, StorageError::Timeout { .. } | StorageError::Cancelled(_))
    }
}

#[cfg(any(feature = "dropbox", feature = "gdrive"))]
impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        StorageError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
