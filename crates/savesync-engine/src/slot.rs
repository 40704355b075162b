use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::NaiveDateTime;
use savesync_core::config::Timeouts;
use savesync_core::revision;
use savesync_core::types::RemoteFileInfo;
use savesync_storage::budget::bounded;
use savesync_storage::{CloudStorage, ProviderState, StorageError};
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::save_data::SaveData;
use crate::status::{StatusLine, StatusText};

/// Clears a busy flag when dropped.
pub(crate) struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    /// `None` when the flag is already set.
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Result of restoring from one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotRestore {
    /// The provider is not the restore source or is already restoring.
    Skipped,
    NoSaveData,
    Restored { revision: RemoteFileInfo, files: usize },
    Failed(String),
}

/// Result of storing to one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStore {
    /// The provider is not a store target or is already storing.
    Skipped,
    Stored,
    /// The revision was uploaded but stale revisions could not all be deleted.
    CleanupFailed,
    Failed(String),
}

/// One configured backend together with its selection flags and status.
pub struct StorageSlot {
    storage: Arc<dyn CloudStorage>,
    remote_root: String,
    timeouts: Timeouts,
    is_restore_source: AtomicBool,
    is_store_target: AtomicBool,
    initializing: AtomicBool,
    restoring: AtomicBool,
    storing: AtomicBool,
    status: StatusLine,
}

impl StorageSlot {
    pub fn new(storage: Arc<dyn CloudStorage>, remote_root: &str, timeouts: Timeouts) -> Self {
        let status = StatusLine::new(storage.id());
        Self {
            storage,
            remote_root: remote_root.to_string(),
            timeouts,
            is_restore_source: AtomicBool::new(false),
            is_store_target: AtomicBool::new(false),
            initializing: AtomicBool::new(false),
            restoring: AtomicBool::new(false),
            storing: AtomicBool::new(false),
            status,
        }
    }

    pub fn id(&self) -> &'static str {
        self.storage.id()
    }

    pub fn name(&self) -> &str {
        self.storage.name()
    }

    pub fn storage(&self) -> &Arc<dyn CloudStorage> {
        &self.storage
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    pub fn status(&self) -> StatusText {
        self.status.current()
    }

    pub fn status_line(&self) -> &StatusLine {
        &self.status
    }

    pub fn is_restore_source(&self) -> bool {
        self.is_restore_source.load(Ordering::Acquire)
    }

    pub fn is_store_target(&self) -> bool {
        self.is_store_target.load(Ordering::Acquire)
    }

    pub fn is_selected(&self) -> bool {
        self.is_restore_source() || self.is_store_target()
    }

    /// Returns `true` when the flag changed.
    pub(crate) fn set_restore_source(&self, value: bool) -> bool {
        self.is_restore_source.swap(value, Ordering::AcqRel) != value
    }

    pub(crate) fn set_store_target(&self, value: bool) -> bool {
        self.is_store_target.swap(value, Ordering::AcqRel) != value
    }

    /// Authenticate the backend. A no-op when it is ready or already initializing.
    pub async fn initialize(&self, cancel: &CancellationToken) {
        self.initialize_within(self.timeouts.initialize(), cancel).await;
    }

    /// Authenticate under the login budget, leaving time for interactive consent.
    pub async fn login(&self, cancel: &CancellationToken) {
        self.initialize_within(self.timeouts.login(), cancel).await;
    }

    async fn initialize_within(&self, budget: Duration, cancel: &CancellationToken) {
        if self.storage.state() == ProviderState::Ready {
            return;
        }
        let Some(_busy) = BusyGuard::try_acquire(&self.initializing) else {
            return;
        };

        self.status.set("Initializing...");
        let result = bounded(
            "initialize",
            budget,
            cancel,
            self.storage.initialize(cancel),
        )
        .await;

        match result {
            Ok(()) => self.status.set("Initialized"),
            Err(e) => {
                tracing::warn!(provider = self.id(), error = %e, "Initialization failed");
                self.status.set_with_detail("Initialization failed", e.to_string());
            }
        }
    }

    /// Bring a selected backend up before use.
    async fn ensure_ready(&self, cancel: &CancellationToken) -> Result<()> {
        self.initialize(cancel).await;
        match self.storage.state() {
            ProviderState::Ready => Ok(()),
            _ => Err(StorageError::NotInitialized(self.name().to_string()).into()),
        }
    }

    /// Archive revisions under the remote root, newest first.
    pub async fn list_revisions(&self, cancel: &CancellationToken) -> Result<Vec<RemoteFileInfo>> {
        let files = bounded(
            "list",
            self.timeouts.list(),
            cancel,
            self.storage.list_files(&self.remote_root, cancel),
        )
        .await?;
        Ok(revision::sort_descending(files))
    }

    /// Download the newest revision and extract it over the save directory.
    pub async fn restore(&self, save_data: &SaveData, cancel: &CancellationToken) -> SlotRestore {
        if !self.is_restore_source() {
            return SlotRestore::Skipped;
        }
        let Some(_busy) = BusyGuard::try_acquire(&self.restoring) else {
            return SlotRestore::Skipped;
        };

        match self.restore_newest(save_data, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(provider = self.id(), error = %e, "Restore failed");
                self.status.set(format!("Error: {e}"));
                SlotRestore::Failed(e.to_string())
            }
        }
    }

    async fn restore_newest(&self, save_data: &SaveData, cancel: &CancellationToken) -> Result<SlotRestore> {
        self.ensure_ready(cancel).await?;
        self.status.set("Retrieving save data list...");

        let files = self.list_revisions(cancel).await?;
        let Some(newest) = files.into_iter().next() else {
            self.status.set("No save data");
            return Ok(SlotRestore::NoSaveData);
        };

        self.status.set(format!("Restoring {}...", newest.display_stem()));
        let data = bounded(
            "download",
            self.timeouts.download(),
            cancel,
            self.storage.download(&newest, cancel),
        )
        .await?;
        let files = save_data.unpack(data).await?;

        tracing::info!(provider = self.id(), revision = %newest, files, "Save data restored");
        self.status.set("Restore done");
        Ok(SlotRestore::Restored {
            revision: newest,
            files,
        })
    }

    /// Upload a new revision stamped `timestamp`, then keep only the newest
    /// `revisions_to_keep` revisions.
    pub async fn store(
        &self,
        save_data: &SaveData,
        timestamp: NaiveDateTime,
        revisions_to_keep: usize,
        cancel: &CancellationToken,
    ) -> SlotStore {
        if !self.is_store_target() {
            return SlotStore::Skipped;
        }
        let Some(_busy) = BusyGuard::try_acquire(&self.storing) else {
            return SlotStore::Skipped;
        };

        match self.store_revision(save_data, timestamp, revisions_to_keep, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(provider = self.id(), error = %e, "Store failed");
                self.status.set(format!("Error: {e}"));
                SlotStore::Failed(e.to_string())
            }
        }
    }

    async fn store_revision(
        &self,
        save_data: &SaveData,
        timestamp: NaiveDateTime,
        revisions_to_keep: usize,
        cancel: &CancellationToken,
    ) -> Result<SlotStore> {
        self.ensure_ready(cancel).await?;
        self.status.set("Storing...");

        let data = save_data.pack().await?;
        let remote_filename = revision::remote_filename(&self.remote_root, timestamp);
        let uploaded = bounded(
            "upload",
            self.timeouts.upload(),
            cancel,
            self.storage.upload(&remote_filename, data, cancel),
        )
        .await?;
        if !uploaded {
            return Err(EngineError::Storage(StorageError::Transport(format!(
                "{} did not confirm the upload of {remote_filename}",
                self.name()
            ))));
        }

        self.status.set("Cleaning up...");
        if self.cleanup(revisions_to_keep, cancel).await? {
            self.status.set("Store done");
            Ok(SlotStore::Stored)
        } else {
            self.status.set("Failed to cleanup");
            Ok(SlotStore::CleanupFailed)
        }
    }

    /// Delete every revision beyond the newest `revisions_to_keep`.
    async fn cleanup(&self, revisions_to_keep: usize, cancel: &CancellationToken) -> Result<bool> {
        let files = self.list_revisions(cancel).await?;
        if files.len() <= revisions_to_keep {
            return Ok(true);
        }

        let stale = &files[revisions_to_keep..];
        tracing::info!(provider = self.id(), stale = stale.len(), kept = revisions_to_keep, "Deleting stale revisions");
        Ok(self
            .storage
            .delete_many(stale, self.timeouts.delete(), cancel)
            .await?)
    }

    pub async fn dispose(&self) {
        self.storage.dispose().await;
    }
}
