use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use savesync_core::types::{ProviderKind, RemoteFileInfo};
use tokio_util::sync::CancellationToken;

use crate::budget::{batch_timeout, bounded};
use crate::error::{Result, StorageError};

/// Lifecycle of a provider instance.
///
/// `Uninitialized -> Authenticating -> Ready | Failed`. `Failed` is left only
/// by calling `initialize` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Uninitialized,
    Authenticating,
    Ready,
    Failed,
}

impl std::fmt::Display for ProviderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderState::Uninitialized => "uninitialized",
            ProviderState::Authenticating => "authenticating",
            ProviderState::Ready => "ready",
            ProviderState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Shared state holder used by every backend.
#[derive(Debug)]
pub struct StateCell {
    state: Mutex<ProviderState>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self {
            state: Mutex::new(ProviderState::Uninitialized),
        }
    }
}

impl StateCell {
    pub fn get(&self) -> ProviderState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, state: ProviderState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Enter `Authenticating`. The attempt ends in `Failed` unless
    /// [`AuthAttempt::succeed`] is called, including when the initializing
    /// future is dropped by a timeout or cancellation.
    pub fn begin_authentication(&self) -> AuthAttempt<'_> {
        self.set(ProviderState::Authenticating);
        AuthAttempt {
            cell: self,
            succeeded: false,
        }
    }

    /// Fail fast unless the provider reached `Ready`.
    pub fn ensure_ready(&self, name: &str) -> Result<()> {
        match self.get() {
            ProviderState::Ready => Ok(()),
            _ => Err(StorageError::NotInitialized(name.to_string())),
        }
    }
}

/// An authentication in progress; see [`StateCell::begin_authentication`].
pub struct AuthAttempt<'a> {
    cell: &'a StateCell,
    succeeded: bool,
}

impl AuthAttempt<'_> {
    pub fn succeed(mut self) {
        self.succeeded = true;
        self.cell.set(ProviderState::Ready);
    }
}

impl Drop for AuthAttempt<'_> {
    fn drop(&mut self) {
        if !self.succeeded {
            self.cell.set(ProviderState::Failed);
        }
    }
}

/// Trait for cloud storage backends holding save-data revisions.
///
/// Every operation other than `initialize` and `dispose` fails with
/// [`StorageError::NotInitialized`] until `initialize` succeeded.
#[async_trait]
pub trait CloudStorage: Send + Sync {
    /// Concrete backend kind.
    fn kind(&self) -> ProviderKind;

    /// Stable identifier matching configuration entries and credential files.
    fn id(&self) -> &'static str {
        self.kind().id()
    }

    /// Provider name for display.
    fn name(&self) -> &str;

    fn state(&self) -> ProviderState;

    /// Authenticate, running the interactive flow when no usable stored
    /// credential exists.
    async fn initialize(&self, cancel: &CancellationToken) -> Result<()>;

    /// Archive entries under `path`. A missing folder yields an empty list.
    async fn list_files(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteFileInfo>>;

    async fn download(&self, file: &RemoteFileInfo, cancel: &CancellationToken)
    -> Result<Vec<u8>>;

    /// Write `data` at `remote_filename`, replacing whatever is there.
    async fn upload(
        &self,
        remote_filename: &str,
        data: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<bool>;

    /// Delete one revision. Returns `false` when the backend reports that the
    /// object it removed is not the one identified by `file`.
    async fn delete(&self, file: &RemoteFileInfo, cancel: &CancellationToken) -> Result<bool>;

    /// Delete several revisions under one aggregate budget derived from
    /// `per_file_timeout`. Returns `true` only if every deletion succeeded.
    ///
    /// The default deletes one file after the other.
    async fn delete_many(
        &self,
        files: &[RemoteFileInfo],
        per_file_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if self.state() != ProviderState::Ready {
            return Err(StorageError::NotInitialized(self.name().to_string()));
        }
        if files.is_empty() {
            return Ok(true);
        }

        let budget = batch_timeout(per_file_timeout, files.len());
        bounded("delete batch", budget, cancel, async {
            let mut all = true;
            for file in files {
                if !self.delete(file, cancel).await? {
                    tracing::warn!(provider = self.id(), file = %file, "Deletion not confirmed");
                    all = false;
                }
            }
            Ok(all)
        })
        .await
    }

    /// Release network or session resources. Idempotent.
    async fn dispose(&self);
}
