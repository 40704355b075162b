use std::path::{Path, PathBuf};

use crate::archive;
use crate::error::Result;
use crate::revision;
use crate::types::{ArchiveMode, RemoteFileInfo};

/// Local-only history of zip snapshots taken before each restore.
///
/// Snapshots are named by timestamp and never pruned.
#[derive(Debug, Clone)]
pub struct LocalBackups {
    dir: PathBuf,
}

impl LocalBackups {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot `save_path` into `{dir}/{timestamp}.zip`.
    ///
    /// Returns `None` without writing anything when there is no save data yet.
    pub fn backup(&self, save_path: &Path, mode: ArchiveMode) -> Result<Option<PathBuf>> {
        if !save_path.is_dir() {
            tracing::info!(path = %save_path.display(), "No local save data to back up");
            return Ok(None);
        }

        let archive = archive::pack(save_path, mode)?;
        let target = self.dir.join(revision::archive_filename(revision::now()));
        std::fs::write(&target, archive.into_inner())?;

        tracing::info!(backup = %target.display(), "Local save data backed up");
        Ok(Some(target))
    }

    /// Snapshots present in the backup folder, newest first.
    pub fn list(&self) -> Result<Vec<RemoteFileInfo>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if revision::is_archive_name(&name) {
                let path = entry.path().display().to_string();
                found.push(RemoteFileInfo::parse(&name, &path));
            }
        }
        Ok(revision::sort_descending(found))
    }
}
