use std::io::Cursor;
use std::path::{Path, PathBuf};

use savesync_core::archive;
use savesync_core::backups::LocalBackups;
use savesync_core::types::{ArchiveMode, RemoteFileInfo};

use crate::error::Result;

/// Local save directory of one game, with its backup history.
///
/// Archive work is blocking and runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct SaveData {
    save_path: PathBuf,
    mode: ArchiveMode,
    backups: LocalBackups,
}

impl SaveData {
    pub fn new(save_path: &Path, mode: ArchiveMode, backups_dir: &Path) -> Result<Self> {
        Ok(Self {
            save_path: save_path.to_path_buf(),
            mode,
            backups: LocalBackups::new(backups_dir)?,
        })
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub fn mode(&self) -> ArchiveMode {
        self.mode
    }

    pub fn backups_dir(&self) -> &Path {
        self.backups.dir()
    }

    /// Zip the save directory.
    pub async fn pack(&self) -> Result<Vec<u8>> {
        let root = self.save_path.clone();
        let mode = self.mode;
        let archive = tokio::task::spawn_blocking(move || archive::pack(&root, mode)).await??;
        Ok(archive.into_inner())
    }

    /// Extract `data` over the save directory. Returns the number of files written.
    pub async fn unpack(&self, data: Vec<u8>) -> Result<usize> {
        let root = self.save_path.clone();
        let written =
            tokio::task::spawn_blocking(move || archive::unpack(Cursor::new(data), &root)).await??;
        Ok(written)
    }

    /// Snapshot the current save data into the backup folder.
    pub async fn backup(&self) -> Result<Option<PathBuf>> {
        let backups = self.backups.clone();
        let root = self.save_path.clone();
        let mode = self.mode;
        Ok(tokio::task::spawn_blocking(move || backups.backup(&root, mode)).await??)
    }

    pub fn list_backups(&self) -> Result<Vec<RemoteFileInfo>> {
        Ok(self.backups.list()?)
    }
}
