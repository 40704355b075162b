use std::time::Duration;

use async_trait::async_trait;
use savesync_core::types::{ProviderKind, RemoteFileInfo};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StorageError};
use crate::provider::{CloudStorage, ProviderState, StateCell};

/// Backend that stores nothing: listings are empty and writes are discarded.
#[derive(Debug, Default)]
pub struct NullStorage {
    state: StateCell,
}

impl NullStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CloudStorage for NullStorage {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Null
    }

    fn name(&self) -> &str {
        "Null"
    }

    fn state(&self) -> ProviderState {
        self.state.get()
    }

    async fn initialize(&self, _cancel: &CancellationToken) -> Result<()> {
        self.state.set(ProviderState::Ready);
        Ok(())
    }

    async fn list_files(
        &self,
        _path: &str,
        _cancel: &CancellationToken,
    ) -> Result<Vec<RemoteFileInfo>> {
        self.state.ensure_ready(self.name())?;
        Ok(vec![])
    }

    async fn download(
        &self,
        file: &RemoteFileInfo,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        self.state.ensure_ready(self.name())?;
        if file.remote_file_identifier().trim().is_empty() {
            return Err(StorageError::InvalidArgument("blank file identifier".into()));
        }
        Err(StorageError::Transport(format!(
            "{} holds no data ({file})",
            self.name()
        )))
    }

    async fn upload(
        &self,
        remote_filename: &str,
        _data: Vec<u8>,
        _cancel: &CancellationToken,
    ) -> Result<bool> {
        self.state.ensure_ready(self.name())?;
        if remote_filename.trim().is_empty() {
            return Err(StorageError::InvalidArgument("blank remote filename".into()));
        }
        Ok(true)
    }

    async fn delete(&self, _file: &RemoteFileInfo, _cancel: &CancellationToken) -> Result<bool> {
        self.state.ensure_ready(self.name())?;
        Ok(true)
    }

    async fn delete_many(
        &self,
        _files: &[RemoteFileInfo],
        _per_file_timeout: Duration,
        _cancel: &CancellationToken,
    ) -> Result<bool> {
        self.state.ensure_ready(self.name())?;
        Ok(true)
    }

    async fn dispose(&self) {
        self.state.set(ProviderState::Uninitialized);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn operations_require_initialize() {
        let storage = NullStorage::new();
        let cancel = CancellationToken::new();
        let file = RemoteFileInfo::parse("2024-01-01_00-00-00-000.zip", "id");

        assert!(matches!(
            storage.list_files("/", &cancel).await,
            Err(StorageError::NotInitialized(_))
        ));
        assert!(matches!(
            storage.download(&file, &cancel).await,
            Err(StorageError::NotInitialized(_))
        ));
        assert!(matches!(
            storage.upload("/a.zip", vec![1], &cancel).await,
            Err(StorageError::NotInitialized(_))
        ));
        assert!(matches!(
            storage.delete(&file, &cancel).await,
            Err(StorageError::NotInitialized(_))
        ));
        assert!(matches!(
            storage
                .delete_many(&[file.clone()], Duration::from_secs(1), &cancel)
                .await,
            Err(StorageError::NotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn ready_storage_is_empty() {
        let storage = NullStorage::new();
        let cancel = CancellationToken::new();
        storage.initialize(&cancel).await.unwrap();
        assert_eq!(storage.state(), ProviderState::Ready);
        assert!(storage.list_files("/", &cancel).await.unwrap().is_empty());
        assert!(storage.upload("/a.zip", vec![1], &cancel).await.unwrap());

        let blank = RemoteFileInfo::parse("a.zip", " ");
        assert!(matches!(
            storage.download(&blank, &cancel).await,
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let storage = NullStorage::new();
        storage.dispose().await;
        storage.dispose().await;
        assert_eq!(storage.state(), ProviderState::Uninitialized);
    }
}
