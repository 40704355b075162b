use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaveSyncError {
    // IO
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Archive
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Save data directory not found: {0}")]
    SaveDataNotFound(String),

    #[error("Path {0} is outside of the archived root")]
    OutsideRoot(String),

    // Config
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found at {0}; run `savesync init` first")]
    ConfigNotFound(String),

    #[error("Invalid archive mode: {0}")]
    InvalidArchiveMode(String),

    #[error("Invalid provider kind: {0}")]
    InvalidProviderKind(String),

    // Serialization
    #[error("TOML deserialization error: {0}")]
    TomlDe(String),

    #[error("TOML serialization error: {0}")]
    TomlSer(String),
}

pub type Result<T> = std::result::Result<T, SaveSyncError>;
