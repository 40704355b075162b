pub mod paths;

pub use paths::{AppPaths, expand_env_vars};

use crate::error::{Result, SaveSyncError};
use crate::types::{ArchiveMode, ProviderKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level SaveSync configuration stored as TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveSyncConfig {
    #[serde(default)]
    pub sync: SyncSettings,
    pub game: GameSettings,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub credentials: CredentialSettings,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// User toggles, re-saved every time one of them changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Restore from the cloud before launching the game.
    #[serde(default)]
    pub auto_restore: bool,
    /// Store to the cloud after the game exits.
    #[serde(default)]
    pub auto_store: bool,
    /// Number of remote revisions kept per provider after a store.
    #[serde(default = "default_revisions_to_keep")]
    pub revisions_to_keep: u32,
    /// Provider id that restores read from.
    #[serde(default)]
    pub restore_source: Option<String>,
    /// Provider ids that stores write to.
    #[serde(default)]
    pub store_targets: Vec<String>,
    /// Abort a restore when the local snapshot cannot be written.
    #[serde(default = "default_true")]
    pub require_local_backup: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            auto_restore: false,
            auto_store: false,
            revisions_to_keep: default_revisions_to_keep(),
            restore_source: None,
            store_targets: vec![],
            require_local_backup: true,
        }
    }
}

fn default_revisions_to_keep() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSettings {
    /// Display name, also used in status messages.
    pub name: String,
    /// Save directory; may contain environment variables.
    pub save_path: String,
    #[serde(default)]
    pub archive_mode: ArchiveMode,
    /// Remote folder revisions are stored under.
    #[serde(default = "default_remote_root")]
    pub remote_root: String,
    /// Executable name looked up by the process monitor.
    #[serde(default)]
    pub process_name: Option<String>,
    /// Program and arguments used to start the game.
    #[serde(default)]
    pub launch_command: Vec<String>,
}

fn default_remote_root() -> String {
    "/".to_string()
}

impl GameSettings {
    /// Save directory with environment variables expanded.
    pub fn resolved_save_path(&self) -> PathBuf {
        PathBuf::from(expand_env_vars(&self.save_path))
    }
}

/// Per-operation budgets, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_initialize_secs")]
    pub initialize_secs: u64,
    /// Budget for an explicit login, which may wait on the user's browser.
    #[serde(default = "default_login_secs")]
    pub login_secs: u64,
    #[serde(default = "default_list_secs")]
    pub list_secs: u64,
    #[serde(default = "default_download_secs")]
    pub download_secs: u64,
    #[serde(default = "default_upload_secs")]
    pub upload_secs: u64,
    /// Budget for a single file; batches derive theirs from it.
    #[serde(default = "default_delete_secs")]
    pub delete_secs: u64,
    #[serde(default = "default_game_start_secs")]
    pub game_start_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            initialize_secs: default_initialize_secs(),
            login_secs: default_login_secs(),
            list_secs: default_list_secs(),
            download_secs: default_download_secs(),
            upload_secs: default_upload_secs(),
            delete_secs: default_delete_secs(),
            game_start_secs: default_game_start_secs(),
        }
    }
}

fn default_initialize_secs() -> u64 {
    30
}

fn default_login_secs() -> u64 {
    300
}

fn default_list_secs() -> u64 {
    20
}

fn default_download_secs() -> u64 {
    30
}

fn default_upload_secs() -> u64 {
    60
}

fn default_delete_secs() -> u64 {
    20
}

fn default_game_start_secs() -> u64 {
    20
}

impl Timeouts {
    pub fn initialize(&self) -> Duration {
        Duration::from_secs(self.initialize_secs)
    }

    pub fn login(&self) -> Duration {
        Duration::from_secs(self.login_secs)
    }

    pub fn list(&self) -> Duration {
        Duration::from_secs(self.list_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn upload(&self) -> Duration {
        Duration::from_secs(self.upload_secs)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }

    pub fn game_start(&self) -> Duration {
        Duration::from_secs(self.game_start_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSettings {
    /// How token values are protected on disk ("local" or "plain").
    #[serde(default = "default_protection")]
    pub protection: String,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            protection: default_protection(),
        }
    }
}

fn default_protection() -> String {
    "local".to_string()
}

/// Application credentials for one backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    /// Dropbox app key.
    #[serde(default)]
    pub app_key: Option<String>,
    /// Dropbox app secret.
    #[serde(default)]
    pub app_secret: Option<String>,
    /// Google OAuth client id.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Google OAuth client secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub application_name: Option<String>,
    /// Target directory for the local-folder backend.
    #[serde(default)]
    pub path: Option<String>,
    /// Overrides `game.remote_root` for this backend.
    #[serde(default)]
    pub remote_root: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            app_key: None,
            app_secret: None,
            client_id: None,
            client_secret: None,
            application_name: None,
            path: None,
            remote_root: None,
        }
    }
}

impl SaveSyncConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SaveSyncError::ConfigNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| SaveSyncError::TomlDe(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config, writing defaults when the file is absent or unreadable.
    pub fn load_or_default(path: &Path, base_dir: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if path.exists() {
                    tracing::warn!(path = %path.display(), error = %e, "Unreadable configuration, recreating defaults");
                }
                let config = Self::default_config(base_dir);
                config.save(path)?;
                Ok(config)
            }
        }
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| SaveSyncError::TomlSer(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.revisions_to_keep == 0 {
            return Err(SaveSyncError::Config(
                "revisions_to_keep must be at least 1".to_string(),
            ));
        }
        if self.game.save_path.trim().is_empty() {
            return Err(SaveSyncError::Config("game.save_path is empty".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for p in &self.providers {
            if !seen.insert(p.kind) {
                return Err(SaveSyncError::Config(format!(
                    "provider '{}' is configured more than once",
                    p.kind
                )));
            }
        }
        Ok(())
    }

    /// Default config for `savesync init`.
    ///
    /// Ships with a local-folder provider selected as both restore source and
    /// store target so the selection starts out valid.
    pub fn default_config(base_dir: &Path) -> Self {
        let mut local = ProviderConfig::new(ProviderKind::LocalFolder);
        local.path = Some(base_dir.join("cloud").display().to_string());
        let local_id = ProviderKind::LocalFolder.id().to_string();

        Self {
            sync: SyncSettings {
                restore_source: Some(local_id.clone()),
                store_targets: vec![local_id],
                ..SyncSettings::default()
            },
            game: GameSettings {
                name: "Dark Souls III".to_string(),
                save_path: default_save_path(),
                archive_mode: ArchiveMode::Subfolders,
                remote_root: default_remote_root(),
                process_name: Some("DarkSoulsIII".to_string()),
                launch_command: vec![],
            },
            timeouts: Timeouts::default(),
            credentials: CredentialSettings::default(),
            providers: vec![local],
        }
    }

    /// Resolve the config file path: `<base_dir>/savesync.toml`
    pub fn default_path(base_dir: &Path) -> PathBuf {
        base_dir.join("savesync.toml")
    }

    /// Resolve the default savesync home directory: `~/.savesync`
    pub fn default_base_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|h| h.join(".savesync"))
            .ok_or_else(|| SaveSyncError::Config("Cannot determine home directory".to_string()))
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }

    /// Remote root for `kind`, falling back to the game-wide one.
    pub fn remote_root_for(&self, kind: ProviderKind) -> &str {
        self.provider(kind)
            .and_then(|p| p.remote_root.as_deref())
            .unwrap_or(&self.game.remote_root)
    }
}

fn default_save_path() -> String {
    if cfg!(windows) {
        "%APPDATA%/DarkSoulsIII".to_string()
    } else {
        "~/.local/share/DarkSoulsIII".to_string()
    }
}
