use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use savesync_core::revision;
use savesync_core::types::{ProviderKind, RemoteFileInfo};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StorageError};
use crate::provider::{CloudStorage, ProviderState, StateCell};

/// Filesystem directory used as a backend (a synced folder, a network share,
/// or a scratch directory in tests).
///
/// Identifiers are derived from path, size and modification time, so a file
/// replaced after it was listed no longer matches its old identifier.
pub struct LocalFolderStorage {
    base_path: PathBuf,
    name: String,
    state: StateCell,
}

impl LocalFolderStorage {
    pub fn new(base_path: &Path, name: &str) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            name: name.to_string(),
            state: StateCell::default(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Map a `/`-separated remote path into the base directory.
    fn resolve(&self, remote: &str) -> Result<PathBuf> {
        let relative = Path::new(remote.trim_start_matches(['/', '\\']));
        let mut path = self.base_path.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(StorageError::InvalidArgument(format!(
                        "remote path '{remote}' leaves the storage folder"
                    )));
                }
            }
        }
        Ok(path)
    }

    fn relative_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.base_path)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn identify(&self, path: &Path) -> Result<String> {
        let metadata = std::fs::metadata(path)?;
        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(self.relative_name(path).as_bytes());
        hasher.update(metadata.len().to_le_bytes());
        hasher.update(modified.to_le_bytes());
        let digest = hasher.finalize();

        let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        Ok(format!("lf-{hex}"))
    }
}

#[async_trait]
impl CloudStorage for LocalFolderStorage {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LocalFolder
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ProviderState {
        self.state.get()
    }

    async fn initialize(&self, _cancel: &CancellationToken) -> Result<()> {
        self.state.set(ProviderState::Authenticating);
        match std::fs::create_dir_all(&self.base_path) {
            Ok(()) => {
                self.state.set(ProviderState::Ready);
                Ok(())
            }
            Err(e) => {
                self.state.set(ProviderState::Failed);
                Err(e.into())
            }
        }
    }

    async fn list_files(
        &self,
        path: &str,
        _cancel: &CancellationToken,
    ) -> Result<Vec<RemoteFileInfo>> {
        self.state.ensure_ready(&self.name)?;
        let dir = self.resolve(path)?;
        if !dir.is_dir() {
            return Ok(vec![]);
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !revision::is_archive_name(&file_name) {
                continue;
            }
            let path = entry.path();
            let id = self.identify(&path)?;
            files.push(RemoteFileInfo::parse(&self.relative_name(&path), &id));
        }
        Ok(files)
    }

    async fn download(
        &self,
        file: &RemoteFileInfo,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        self.state.ensure_ready(&self.name)?;
        if file.remote_file_identifier().trim().is_empty() {
            return Err(StorageError::InvalidArgument("blank file identifier".into()));
        }
        let path = self.resolve(file.local_filename())?;
        if self.identify(&path)? != file.remote_file_identifier() {
            return Err(StorageError::Transport(format!(
                "{file} changed since it was listed"
            )));
        }
        Ok(std::fs::read(&path)?)
    }

    async fn upload(
        &self,
        remote_filename: &str,
        data: Vec<u8>,
        _cancel: &CancellationToken,
    ) -> Result<bool> {
        self.state.ensure_ready(&self.name)?;
        if remote_filename.trim().is_empty() {
            return Err(StorageError::InvalidArgument("blank remote filename".into()));
        }
        let path = self.resolve(remote_filename)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let partial = path.with_extension("part");
        std::fs::write(&partial, &data)?;
        std::fs::rename(&partial, &path)?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "Stored revision in folder");
        Ok(true)
    }

    async fn delete(&self, file: &RemoteFileInfo, _cancel: &CancellationToken) -> Result<bool> {
        self.state.ensure_ready(&self.name)?;
        if file.local_filename().trim().is_empty() {
            return Err(StorageError::InvalidArgument("blank file name".into()));
        }
        let path = self.resolve(file.local_filename())?;
        if !path.is_file() {
            return Ok(false);
        }
        if self.identify(&path)? != file.remote_file_identifier() {
            tracing::warn!(file = %file, "Refusing to delete a file replaced since listing");
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        Ok(true)
    }

    async fn dispose(&self) {
        self.state.set(ProviderState::Uninitialized);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn ready(tmp: &TempDir) -> LocalFolderStorage {
        let storage = LocalFolderStorage::new(&tmp.path().join("cloud"), "test-local");
        storage.initialize(&CancellationToken::new()).await.unwrap();
        storage
    }

    #[tokio::test]
    async fn upload_list_download_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let storage = ready(&tmp).await;
        let cancel = CancellationToken::new();

        let name = "/DarkSoulsIII/2024-01-02_03-04-05-006.zip";
        assert!(storage.upload(name, b"zip bytes".to_vec(), &cancel).await.unwrap());
        std::fs::write(storage.base_path().join("DarkSoulsIII/readme.txt"), b"x").unwrap();

        let files = storage.list_files("/DarkSoulsIII", &cancel).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(
            files[0].local_filename(),
            "DarkSoulsIII/2024-01-02_03-04-05-006.zip"
        );
        assert!(files[0].store_timestamp().is_some());

        let data = storage.download(&files[0], &cancel).await.unwrap();
        assert_eq!(data, b"zip bytes");
    }

    #[tokio::test]
    async fn missing_folder_lists_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = ready(&tmp).await;
        let files = storage
            .list_files("/nothing-here", &CancellationToken::new())
            .await
            .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn delete_checks_identifier() {
        let tmp = TempDir::new().unwrap();
        let storage = ready(&tmp).await;
        let cancel = CancellationToken::new();

        storage.upload("/a.zip", b"one".to_vec(), &cancel).await.unwrap();
        let listed = storage.list_files("/", &cancel).await.unwrap();

        // Same name, different object.
        storage
            .upload("/a.zip", b"replacement".to_vec(), &cancel)
            .await
            .unwrap();
        assert!(!storage.delete(&listed[0], &cancel).await.unwrap());
        assert!(storage.base_path().join("a.zip").exists());

        let fresh = storage.list_files("/", &cancel).await.unwrap();
        assert!(storage.delete(&fresh[0], &cancel).await.unwrap());
        assert!(!storage.base_path().join("a.zip").exists());
    }

    #[tokio::test]
    async fn delete_many_reports_partial_failure() {
        let tmp = TempDir::new().unwrap();
        let storage = ready(&tmp).await;
        let cancel = CancellationToken::new();

        storage.upload("/2024-01-01_00-00-00-000.zip", vec![1], &cancel).await.unwrap();
        storage.upload("/2024-01-02_00-00-00-000.zip", vec![2], &cancel).await.unwrap();
        let mut files = storage.list_files("/", &cancel).await.unwrap();
        files.push(RemoteFileInfo::parse("gone.zip", "lf-0000"));

        let all = storage
            .delete_many(&files, Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert!(!all);
        assert!(storage.list_files("/", &cancel).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn paths_cannot_escape_base() {
        let tmp = TempDir::new().unwrap();
        let storage = ready(&tmp).await;
        let result = storage
            .upload("/../escape.zip", vec![1], &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn not_initialized_before_initialize() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalFolderStorage::new(tmp.path(), "test-local");
        let result = storage.list_files("/", &CancellationToken::new()).await;
        assert!(matches!(result, Err(StorageError::NotInitialized(_))));
    }
}
