//! Store and restore workflows across the configured providers.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;
use futures::future::join_all;
use savesync_core::config::SaveSyncConfig;
use savesync_core::revision;
use savesync_core::types::RemoteFileInfo;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{ButtonTypes, Clipboard, IconType, MessageBox};
use crate::error::{EngineError, Result};
use crate::launcher::GameLauncher;
use crate::monitor::{GameEvent, GameMonitor};
use crate::save_data::SaveData;
use crate::slot::{BusyGuard, SlotRestore, SlotStore, StorageSlot};
use crate::status::{StatusLine, StatusText};

const SELECTION_WARNING: &str = "Warning: incorrect cloud storage selection";

/// Operation holding the save directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Store,
    Restore,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Operation::Store => "Store",
            Operation::Restore => "Restore",
        }
    }
}

/// Store and restore exclude each other; the guard releases on drop.
struct OperationGuard<'a> {
    slot: &'a Mutex<Option<Operation>>,
}

impl<'a> OperationGuard<'a> {
    fn try_acquire(slot: &'a Mutex<Option<Operation>>, operation: Operation) -> Option<Self> {
        let mut current = slot.lock().unwrap_or_else(|e| e.into_inner());
        if current.is_some() {
            return None;
        }
        *current = Some(operation);
        Some(Self { slot })
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Another store or restore was in flight.
    Skipped,
    NoSaveData,
    Restored { revision: RemoteFileInfo, files: usize },
    Failed(String),
}

/// Per-provider result of one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub provider: String,
    pub outcome: SlotStore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReport {
    /// Stamp shared by every target's new revision.
    pub timestamp: NaiveDateTime,
    pub targets: Vec<TargetReport>,
}

impl StoreReport {
    pub fn all_stored(&self) -> bool {
        !self.targets.is_empty()
            && self
                .targets
                .iter()
                .all(|t| t.outcome == SlotStore::Stored)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameOutcome {
    /// The game is already running or being started.
    Skipped,
    /// The game ran and exited.
    Played,
    Failed(String),
}

/// Shell services the orchestrator reports through.
#[derive(Clone)]
pub struct Collaborators {
    pub messages: Arc<dyn MessageBox>,
    pub clipboard: Arc<dyn Clipboard>,
}

/// Owns the configuration and the provider slots, and runs the store,
/// restore and game workflows.
pub struct SyncOrchestrator {
    config: Mutex<SaveSyncConfig>,
    config_path: PathBuf,
    slots: Vec<Arc<StorageSlot>>,
    save_data: SaveData,
    collaborators: Collaborators,
    status: StatusLine,
    busy: Mutex<Option<Operation>>,
    game_starting: AtomicBool,
    shutdown: CancellationToken,
    version: String,
}

impl SyncOrchestrator {
    /// Apply the persisted selection to `slots` without writing anything back.
    pub fn new(
        config: SaveSyncConfig,
        config_path: &Path,
        save_data: SaveData,
        slots: Vec<StorageSlot>,
        collaborators: Collaborators,
    ) -> Self {
        for slot in &slots {
            let id = slot.id();
            slot.set_restore_source(config.sync.restore_source.as_deref() == Some(id));
            slot.set_store_target(config.sync.store_targets.iter().any(|t| t == id));
        }
        if let Some(source) = &config.sync.restore_source {
            if !slots.iter().any(|s| s.id() == source) {
                tracing::warn!(provider = %source, "Restore source is not a configured provider");
            }
        }
        for target in &config.sync.store_targets {
            if !slots.iter().any(|s| s.id() == target) {
                tracing::warn!(provider = %target, "Store target is not a configured provider");
            }
        }

        Self {
            config: Mutex::new(config),
            config_path: config_path.to_path_buf(),
            slots: slots.into_iter().map(Arc::new).collect(),
            save_data,
            collaborators,
            status: StatusLine::new("savesync"),
            busy: Mutex::new(None),
            game_starting: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Initialize the selected providers and report the selection state.
    pub async fn start(&self) {
        self.initialize_selected().await;
        self.report_selection();
    }

    fn config(&self) -> MutexGuard<'_, SaveSyncConfig> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config_snapshot(&self) -> SaveSyncConfig {
        self.config().clone()
    }

    pub fn slots(&self) -> &[Arc<StorageSlot>] {
        &self.slots
    }

    pub fn slot(&self, id: &str) -> Option<&Arc<StorageSlot>> {
        self.slots.iter().find(|s| s.id() == id)
    }

    pub fn save_data(&self) -> &SaveData {
        &self.save_data
    }

    pub fn status(&self) -> StatusText {
        self.status.current()
    }

    pub fn status_line(&self) -> &StatusLine {
        &self.status
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn current_operation(&self) -> Option<Operation> {
        *self.busy.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_storing(&self) -> bool {
        self.current_operation() == Some(Operation::Store)
    }

    pub fn is_restoring(&self) -> bool {
        self.current_operation() == Some(Operation::Restore)
    }

    // Settings, persisted on every change.

    pub fn auto_store(&self) -> bool {
        self.config().sync.auto_store
    }

    pub fn auto_restore(&self) -> bool {
        self.config().sync.auto_restore
    }

    pub fn revisions_to_keep(&self) -> u32 {
        self.config().sync.revisions_to_keep
    }

    pub fn set_auto_store(&self, value: bool) -> Result<()> {
        self.update_config(|c| c.sync.auto_store = value)
    }

    pub fn set_auto_restore(&self, value: bool) -> Result<()> {
        self.update_config(|c| c.sync.auto_restore = value)
    }

    pub fn set_revisions_to_keep(&self, value: u32) -> Result<()> {
        if value == 0 {
            return Err(EngineError::Config(
                "at least one revision must be kept".to_string(),
            ));
        }
        self.update_config(|c| c.sync.revisions_to_keep = value)
    }

    fn update_config(&self, change: impl FnOnce(&mut SaveSyncConfig)) -> Result<()> {
        let mut config = self.config();
        change(&mut config);
        if let Err(e) = config.save(&self.config_path) {
            self.status.set(format!("Error: {e}"));
            return Err(EngineError::Persist(e));
        }
        Ok(())
    }

    // Selection.

    /// Exactly one restore source and at least one store target.
    pub fn selection_valid(&self) -> bool {
        self.slots.iter().filter(|s| s.is_restore_source()).count() == 1
            && self.slots.iter().any(|s| s.is_store_target())
    }

    /// Make `id` the only restore source.
    pub async fn select_restore_source(&self, id: &str) -> Result<()> {
        self.known(id)?;
        let mut changed = false;
        for slot in &self.slots {
            changed |= slot.set_restore_source(slot.id() == id);
        }
        if changed {
            self.selection_changed().await?;
        }
        Ok(())
    }

    pub async fn set_store_target(&self, id: &str, enabled: bool) -> Result<()> {
        let slot = self.known(id)?;
        if slot.set_store_target(enabled) {
            self.selection_changed().await?;
        }
        Ok(())
    }

    fn known(&self, id: &str) -> Result<&Arc<StorageSlot>> {
        self.slot(id)
            .ok_or_else(|| EngineError::UnknownProvider(id.to_string()))
    }

    async fn selection_changed(&self) -> Result<()> {
        let restore_source = self
            .slots
            .iter()
            .find(|s| s.is_restore_source())
            .map(|s| s.id().to_string());
        let store_targets: Vec<String> = self
            .slots
            .iter()
            .filter(|s| s.is_store_target())
            .map(|s| s.id().to_string())
            .collect();

        let persisted = self.update_config(|c| {
            c.sync.restore_source = restore_source;
            c.sync.store_targets = store_targets;
        });

        self.initialize_selected().await;
        self.report_selection();
        persisted
    }

    fn report_selection(&self) {
        if self.selection_valid() {
            if self.status.text().as_deref() == Some(SELECTION_WARNING) {
                self.status.clear();
            }
        } else {
            self.status.set(SELECTION_WARNING);
        }
    }

    /// Authenticate every provider that is a restore source or store target.
    pub async fn initialize_selected(&self) {
        let selected = self.slots.iter().filter(|s| s.is_selected());
        join_all(selected.map(|s| s.initialize(&self.shutdown))).await;
    }

    /// Authenticate one provider, selected or not.
    pub async fn login(&self, id: &str) -> Result<StatusText> {
        let slot = self.known(id)?;
        slot.login(&self.shutdown).await;
        Ok(slot.status())
    }

    // Workflows.

    /// Back up local data, then extract the newest revision of the restore source.
    pub async fn restore(&self) -> RestoreOutcome {
        let Some(_busy) = OperationGuard::try_acquire(&self.busy, Operation::Restore) else {
            tracing::debug!("Restore requested while busy, ignoring");
            return RestoreOutcome::Skipped;
        };

        self.status.set("Backing up local save data...");
        let require_backup = self.config().sync.require_local_backup;
        match self.save_data.backup().await {
            Ok(Some(path)) => tracing::info!(backup = %path.display(), "Local backup written"),
            Ok(None) => {}
            Err(e) if require_backup => {
                self.status.set(format!("Error: local backup failed: {e}"));
                return RestoreOutcome::Failed(format!("local backup failed: {e}"));
            }
            Err(e) => tracing::warn!(error = %e, "Local backup failed, restoring anyway"),
        }

        let Some(source) = self.slots.iter().find(|s| s.is_restore_source()) else {
            self.status.set("Error: Restore source cloud storage unavailable");
            return RestoreOutcome::Failed("no restore source selected".to_string());
        };

        self.status.set(format!("Restoring from {}...", source.name()));
        match source.restore(&self.save_data, &self.shutdown).await {
            SlotRestore::Restored { revision, files } => {
                self.status.set("Restore done");
                RestoreOutcome::Restored { revision, files }
            }
            SlotRestore::NoSaveData => {
                self.status.set("No save data");
                RestoreOutcome::NoSaveData
            }
            SlotRestore::Failed(message) => {
                self.status.set(format!("Error: {message}"));
                RestoreOutcome::Failed(message)
            }
            SlotRestore::Skipped => {
                self.status
                    .set(format!("Restore skipped: {} is busy", source.name()));
                RestoreOutcome::Skipped
            }
        }
    }

    /// Upload a new revision to every store target, then prune each of them.
    ///
    /// `None` when another store or restore was in flight.
    pub async fn store(&self) -> Option<StoreReport> {
        let Some(_busy) = OperationGuard::try_acquire(&self.busy, Operation::Store) else {
            tracing::debug!("Store requested while busy, ignoring");
            return None;
        };

        let timestamp = revision::now();
        let keep = self.revisions_to_keep() as usize;
        let targets: Vec<&Arc<StorageSlot>> =
            self.slots.iter().filter(|s| s.is_store_target()).collect();

        if targets.is_empty() {
            self.status.set("Error: no store target selected");
            return Some(StoreReport {
                timestamp,
                targets: vec![],
            });
        }

        self.status.set("Storing...");
        let outcomes = join_all(
            targets
                .iter()
                .map(|slot| slot.store(&self.save_data, timestamp, keep, &self.shutdown)),
        )
        .await;

        let report = StoreReport {
            timestamp,
            targets: targets
                .iter()
                .zip(outcomes)
                .map(|(slot, outcome)| TargetReport {
                    provider: slot.id().to_string(),
                    outcome,
                })
                .collect(),
        };

        let failed: Vec<&str> = report
            .targets
            .iter()
            .filter(|t| t.outcome != SlotStore::Stored)
            .map(|t| t.provider.as_str())
            .collect();
        if failed.is_empty() {
            self.status.set("Store done");
        } else {
            self.status.set(format!(
                "Store finished with errors ({} of {} failed: {})",
                failed.len(),
                report.targets.len(),
                failed.join(", ")
            ));
        }
        Some(report)
    }

    /// Optional auto-restore, launch, wait for the game to exit, optional
    /// auto-store.
    pub async fn start_game(&self, launcher: &dyn GameLauncher, monitor: &GameMonitor) -> GameOutcome {
        if monitor.is_running() {
            return GameOutcome::Skipped;
        }
        let Some(_starting) = BusyGuard::try_acquire(&self.game_starting) else {
            return GameOutcome::Skipped;
        };

        if self.auto_restore() {
            self.restore().await;
        }

        let (game_name, start_timeout) = {
            let config = self.config();
            (config.game.name.clone(), config.timeouts.game_start())
        };

        let mut events = monitor.subscribe();
        if let Err(e) = launcher.launch().await {
            self.status.set(format!("Error: {e}"));
            return GameOutcome::Failed(e.to_string());
        }
        self.status.set("Waiting for game to start...");

        match tokio::time::timeout(start_timeout, self.wait_for(&mut events, GameEvent::Started)).await {
            Ok(true) => {}
            Ok(false) => return GameOutcome::Failed("shutting down".to_string()),
            Err(_) => {
                let message = format!(
                    "The game didn't start within {} seconds.",
                    start_timeout.as_secs()
                );
                self.status.set(format!("Error: {message}"));
                return GameOutcome::Failed(message);
            }
        }

        self.status.set(format!("{game_name} is running..."));
        if !self.wait_for(&mut events, GameEvent::Stopped).await {
            return GameOutcome::Failed("shutting down".to_string());
        }
        self.status.set(format!("{game_name} has stopped..."));

        if self.auto_store() {
            self.store().await;
        }
        GameOutcome::Played
    }

    /// `false` when shutdown fired or the monitor went away first.
    async fn wait_for(
        &self,
        events: &mut tokio::sync::broadcast::Receiver<GameEvent>,
        wanted: GameEvent,
    ) -> bool {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return false,
                received = events.recv() => received,
            };
            match received {
                Ok(event) if event == wanted => return true,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Missed game events");
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }

    // Shell support.

    /// Whether the application may close now. Vetoed, with an explanation,
    /// while a store or restore is in flight; otherwise signals shutdown.
    pub async fn request_close(&self) -> bool {
        if let Some(operation) = self.current_operation() {
            let action = operation.label();
            tracing::warn!(action, "Close requested during an operation, vetoed");
            self.collaborators
                .messages
                .show(
                    &format!(
                        "{action} operation is underway, closing application is interrupted to avoid possible data corruption"
                    ),
                    &format!("{action} underway"),
                    ButtonTypes::Ok,
                    IconType::Warning,
                )
                .await;
            return false;
        }

        self.shutdown.cancel();
        true
    }

    pub async fn copy_version(&self) {
        self.status.set("Trying to copy version to clipboard...");
        match self.collaborators.clipboard.set_text(&self.version).await {
            Ok(()) => self.status.set("Version copied to clipboard"),
            Err(e) => self
                .status
                .set(format!("Failed to copy version to clipboard: {e}")),
        }
    }

    /// Release every provider.
    pub async fn dispose(&self) {
        self.shutdown.cancel();
        join_all(self.slots.iter().map(|s| s.dispose())).await;
    }
}
