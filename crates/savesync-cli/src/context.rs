use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use savesync_core::config::{AppPaths, SaveSyncConfig};
use savesync_engine::collaborators::ClipboardAuthPrompt;
use savesync_engine::save_data::SaveData;
use savesync_engine::{Collaborators, StorageSlot, SyncOrchestrator};
use savesync_keys::CredentialStore;
use savesync_storage::auth::{AuthPrompt, NonInteractivePrompt};
use savesync_storage::factory::build_storage;

use crate::console::{ConsoleMessages, SystemOpener, TerminalClipboard};

/// Load configuration (creating defaults when missing) and wire providers,
/// credentials and the orchestrator.
pub fn build(base_dir: &Path, interactive: bool) -> Result<SyncOrchestrator> {
    let paths = AppPaths::new(base_dir);
    let config = SaveSyncConfig::load_or_default(&paths.config_file, base_dir)?;

    let protector =
        savesync_keys::create_protector(&config.credentials.protection, &paths.user_key_file)?;
    let credentials = Arc::new(CredentialStore::new(&paths.storage_config_dir, protector)?);

    let messages = Arc::new(ConsoleMessages);
    let clipboard = Arc::new(TerminalClipboard);
    let prompt: Arc<dyn AuthPrompt> = if interactive {
        Arc::new(ClipboardAuthPrompt::new(
            messages.clone(),
            clipboard.clone(),
            Arc::new(SystemOpener),
        ))
    } else {
        Arc::new(NonInteractivePrompt)
    };

    let mut slots = Vec::with_capacity(config.providers.len());
    for provider in &config.providers {
        let storage = build_storage(provider, credentials.clone(), prompt.clone())
            .with_context(|| format!("Cannot set up provider '{}'", provider.kind))?;
        slots.push(StorageSlot::new(
            storage,
            config.remote_root_for(provider.kind),
            config.timeouts,
        ));
    }

    let save_path = config.game.resolved_save_path();
    let save_data = SaveData::new(
        &save_path,
        config.game.archive_mode,
        &paths.backups_dir_for(&save_path),
    )?;

    Ok(SyncOrchestrator::new(
        config,
        &paths.config_file,
        save_data,
        slots,
        Collaborators {
            messages,
            clipboard,
        },
    ))
}

/// `build`, then bring up the selected providers.
pub async fn start(base_dir: &Path, interactive: bool) -> Result<SyncOrchestrator> {
    let orchestrator = build(base_dir, interactive)?;
    orchestrator.start().await;
    for slot in orchestrator.slots().iter().filter(|s| s.is_selected()) {
        let status = slot.status();
        if let (Some(status), Some(detail)) = (status.status, status.detail) {
            eprintln!("  {}: {status} ({detail})", slot.name());
        }
    }
    Ok(orchestrator)
}
