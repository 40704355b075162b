#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use savesync_core::config::{SaveSyncConfig, Timeouts};
use savesync_core::types::{ArchiveMode, ProviderKind, RemoteFileInfo};
use savesync_engine::collaborators::{ButtonTypes, Clipboard, DialogResult, IconType, MessageBox};
use savesync_engine::save_data::SaveData;
use savesync_engine::{Collaborators, StorageSlot, SyncOrchestrator};
use savesync_storage::provider::StateCell;
use savesync_storage::{CloudStorage, ProviderState, Result, StorageError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// In-memory backend recording every call.
pub struct StubStorage {
    kind: ProviderKind,
    state: StateCell,
    files: Mutex<Vec<(RemoteFileInfo, Vec<u8>)>>,
    next_id: AtomicUsize,
    upload_delay: Duration,
    download_delay: Duration,
    fail_uploads: bool,
    pub uploads: AtomicUsize,
    pub downloads: AtomicUsize,
    pub delete_batches: Mutex<Vec<Vec<RemoteFileInfo>>>,
}

impl StubStorage {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            state: StateCell::default(),
            files: Mutex::new(vec![]),
            next_id: AtomicUsize::new(0),
            upload_delay: Duration::ZERO,
            download_delay: Duration::ZERO,
            fail_uploads: false,
            uploads: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            delete_batches: Mutex::new(vec![]),
        }
    }

    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    pub fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    pub fn seed(&self, name: &str, data: &[u8]) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.files.lock().unwrap().push((
            RemoteFileInfo::parse(name.trim_start_matches('/'), &format!("stub-{id}")),
            data.to_vec(),
        ));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|(f, _)| f.local_filename().to_string())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl CloudStorage for StubStorage {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn name(&self) -> &str {
        "Stub"
    }

    fn state(&self) -> ProviderState {
        self.state.get()
    }

    async fn initialize(&self, _cancel: &CancellationToken) -> Result<()> {
        self.state.set(ProviderState::Ready);
        Ok(())
    }

    async fn list_files(&self, _path: &str, _cancel: &CancellationToken) -> Result<Vec<RemoteFileInfo>> {
        self.state.ensure_ready("Stub")?;
        Ok(self.files.lock().unwrap().iter().map(|(f, _)| f.clone()).collect())
    }

    async fn download(&self, file: &RemoteFileInfo, _cancel: &CancellationToken) -> Result<Vec<u8>> {
        self.state.ensure_ready("Stub")?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if !self.download_delay.is_zero() {
            tokio::time::sleep(self.download_delay).await;
        }
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|(f, _)| f.remote_file_identifier() == file.remote_file_identifier())
            .map(|(_, data)| data.clone())
            .ok_or_else(|| StorageError::Transport("no such file".into()))
    }

    async fn upload(&self, remote_filename: &str, data: Vec<u8>, _cancel: &CancellationToken) -> Result<bool> {
        self.state.ensure_ready("Stub")?;
        if !self.upload_delay.is_zero() {
            tokio::time::sleep(self.upload_delay).await;
        }
        if self.fail_uploads {
            return Err(StorageError::Transport("stub upload failure".into()));
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.seed(remote_filename, &data);
        Ok(true)
    }

    async fn delete(&self, file: &RemoteFileInfo, _cancel: &CancellationToken) -> Result<bool> {
        self.state.ensure_ready("Stub")?;
        let mut files = self.files.lock().unwrap();
        let before = files.len();
        files.retain(|(f, _)| f.remote_file_identifier() != file.remote_file_identifier());
        Ok(files.len() < before)
    }

    async fn delete_many(
        &self,
        files: &[RemoteFileInfo],
        _per_file_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        self.state.ensure_ready("Stub")?;
        self.delete_batches.lock().unwrap().push(files.to_vec());
        let mut all = true;
        for file in files {
            all &= self.delete(file, cancel).await?;
        }
        Ok(all)
    }

    async fn dispose(&self) {
        self.state.set(ProviderState::Uninitialized);
    }
}

/// Message box answering OK and remembering what it showed.
#[derive(Default)]
pub struct RecordingMessages {
    pub shown: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MessageBox for RecordingMessages {
    async fn show(&self, message: &str, title: &str, _: ButtonTypes, _: IconType) -> DialogResult {
        self.shown
            .lock()
            .unwrap()
            .push((message.to_string(), title.to_string()));
        DialogResult::Ok
    }
}

#[derive(Default)]
pub struct MemoryClipboard(pub Mutex<String>);

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn get_text(&self) -> anyhow::Result<String> {
        Ok(self.0.lock().unwrap().clone())
    }

    async fn set_text(&self, text: &str) -> anyhow::Result<()> {
        *self.0.lock().unwrap() = text.to_string();
        Ok(())
    }
}

/// Orchestrator over stub backends, rooted in a temporary directory.
pub struct Harness {
    pub tmp: TempDir,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub messages: Arc<RecordingMessages>,
    pub clipboard: Arc<MemoryClipboard>,
    pub config_path: PathBuf,
}

impl Harness {
    pub fn save_path(&self) -> PathBuf {
        self.tmp.path().join("save")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.tmp.path().join("backups").join("save")
    }
}

pub fn write_save(root: &Path, files: &[(&str, &[u8])]) {
    for (name, data) in files {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }
}

/// Build an orchestrator over `storages`. `configure` adjusts the
/// configuration (selection, settings) before it is applied.
pub fn harness(
    storages: Vec<Arc<StubStorage>>,
    configure: impl FnOnce(&mut SaveSyncConfig),
) -> Harness {
    let tmp = TempDir::new().unwrap();
    let save_path = tmp.path().join("save");
    write_save(&save_path, &[("profile/slot.sl2", b"local save")]);

    let mut config = SaveSyncConfig::default_config(tmp.path());
    config.game.save_path = save_path.display().to_string();
    config.game.archive_mode = ArchiveMode::WholeFolder;
    config.sync.restore_source = None;
    config.sync.store_targets = vec![];
    configure(&mut config);

    let config_path = SaveSyncConfig::default_path(tmp.path());
    config.save(&config_path).unwrap();

    let save_data = SaveData::new(
        &save_path,
        config.game.archive_mode,
        &tmp.path().join("backups").join("save"),
    )
    .unwrap();

    let slots = storages
        .into_iter()
        .map(|s| StorageSlot::new(s, "/game", Timeouts::default()))
        .collect();

    let messages = Arc::new(RecordingMessages::default());
    let clipboard = Arc::new(MemoryClipboard::default());
    let orchestrator = SyncOrchestrator::new(
        config,
        &config_path,
        save_data,
        slots,
        Collaborators {
            messages: messages.clone(),
            clipboard: clipboard.clone(),
        },
    );

    Harness {
        tmp,
        orchestrator: Arc::new(orchestrator),
        messages,
        clipboard,
        config_path,
    }
}
