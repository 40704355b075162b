use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::revision;

/// One archive file on a cloud backend.
///
/// Built from a directory-listing entry and never persisted. The timestamp is
/// parsed from the file stem; `None` stands for "unknown" and always sorts as
/// the oldest revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteFileInfo {
    store_timestamp: Option<NaiveDateTime>,
    local_filename: String,
    remote_file_identifier: String,
}

impl RemoteFileInfo {
    /// Build from a listing entry, decoding the timestamp from the file stem.
    pub fn parse(local_filename: &str, remote_file_identifier: &str) -> Self {
        let stem = Path::new(local_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        Self {
            store_timestamp: revision::parse(stem),
            local_filename: local_filename.to_string(),
            remote_file_identifier: remote_file_identifier.to_string(),
        }
    }

    pub fn store_timestamp(&self) -> Option<NaiveDateTime> {
        self.store_timestamp
    }

    pub fn local_filename(&self) -> &str {
        &self.local_filename
    }

    pub fn remote_file_identifier(&self) -> &str {
        &self.remote_file_identifier
    }

    /// File stem without extension, used in status messages.
    pub fn display_stem(&self) -> &str {
        Path::new(&self.local_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.local_filename)
    }

    /// Two entries belong to the same revision when both timestamps are known
    /// and equal. Unknown timestamps never match anything.
    pub fn same_revision(&self, other: &RemoteFileInfo) -> bool {
        match (self.store_timestamp, other.store_timestamp) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for RemoteFileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.local_filename, self.remote_file_identifier)
    }
}

/// What part of the save directory goes into an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveMode {
    /// The whole tree, recursively.
    #[default]
    WholeFolder,
    /// Only first-level subdirectories, each recursively. Top-level files are ignored.
    Subfolders,
}

impl fmt::Display for ArchiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveMode::WholeFolder => write!(f, "whole-folder"),
            ArchiveMode::Subfolders => write!(f, "subfolders"),
        }
    }
}

impl std::str::FromStr for ArchiveMode {
    type Err = crate::error::SaveSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whole-folder" | "wholefolder" | "whole" => Ok(ArchiveMode::WholeFolder),
            "subfolders" | "sub-folders" | "subfolders-independently" => {
                Ok(ArchiveMode::Subfolders)
            }
            _ => Err(crate::error::SaveSyncError::InvalidArchiveMode(
                s.to_string(),
            )),
        }
    }
}

/// Concrete backend kinds.
///
/// The string form is the stable provider id persisted in the configuration
/// and used to name each provider's credential file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Dropbox,
    GoogleDrive,
    LocalFolder,
    Null,
}

impl ProviderKind {
    pub const fn id(self) -> &'static str {
        match self {
            ProviderKind::Dropbox => "dropbox",
            ProviderKind::GoogleDrive => "google-drive",
            ProviderKind::LocalFolder => "local-folder",
            ProviderKind::Null => "null",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = crate::error::SaveSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dropbox" => Ok(ProviderKind::Dropbox),
            "google-drive" | "googledrive" | "gdrive" | "drive" => Ok(ProviderKind::GoogleDrive),
            "local-folder" | "localfolder" | "local" | "folder" => Ok(ProviderKind::LocalFolder),
            "null" => Ok(ProviderKind::Null),
            _ => Err(crate::error::SaveSyncError::InvalidProviderKind(
                s.to_string(),
            )),
        }
    }
}
