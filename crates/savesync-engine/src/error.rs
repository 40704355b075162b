use savesync_core::error::SaveSyncError;
use savesync_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot persist configuration: {0}")]
    Persist(#[source] SaveSyncError),

    #[error("Game launch failed: {0}")]
    Launch(String),

    #[error(transparent)]
    SaveData(#[from] SaveSyncError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
