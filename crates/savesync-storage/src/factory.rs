//! Factory for creating the storage backend described by a provider entry.

use std::path::PathBuf;
use std::sync::Arc;

use savesync_core::config::{ProviderConfig, expand_env_vars};
use savesync_core::types::ProviderKind;
use savesync_keys::CredentialStore;

use crate::auth::AuthPrompt;
use crate::local::LocalFolderStorage;
use crate::null::NullStorage;
use crate::provider::CloudStorage;

/// Create a backend from its configuration entry.
///
/// Supported types:
/// - `"dropbox"`: requires `app_key` (compile with `dropbox` feature)
/// - `"google-drive"`: requires `client_id` (compile with `gdrive` feature)
/// - `"local-folder"`: requires `path`
/// - `"null"`: no settings
#[allow(unused_variables)]
pub fn build_storage(
    config: &ProviderConfig,
    credentials: Arc<CredentialStore>,
    prompt: Arc<dyn AuthPrompt>,
) -> anyhow::Result<Arc<dyn CloudStorage>> {
    match config.kind {
        ProviderKind::Null => Ok(Arc::new(NullStorage::new())),

        ProviderKind::LocalFolder => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("path required for local-folder provider"))?;
            let path = PathBuf::from(expand_env_vars(path));
            Ok(Arc::new(LocalFolderStorage::new(&path, "Local folder")))
        }

        #[cfg(feature = "dropbox")]
        ProviderKind::Dropbox => {
            let app_key = config
                .app_key
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("app_key required for dropbox provider"))?;
            Ok(Arc::new(crate::dropbox::DropboxStorage::new(
                app_key,
                config.app_secret.as_deref(),
                credentials,
                prompt,
            )))
        }

        #[cfg(not(feature = "dropbox"))]
        ProviderKind::Dropbox => {
            anyhow::bail!("dropbox feature not enabled. Recompile with --features dropbox")
        }

        #[cfg(feature = "gdrive")]
        ProviderKind::GoogleDrive => {
            let client_id = config
                .client_id
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("client_id required for google-drive provider"))?;
            Ok(Arc::new(crate::gdrive::GoogleDriveStorage::new(
                config.application_name.as_deref().unwrap_or("SaveSync"),
                client_id,
                config.client_secret.as_deref(),
                credentials,
                prompt,
            )))
        }

        #[cfg(not(feature = "gdrive"))]
        ProviderKind::GoogleDrive => {
            anyhow::bail!("gdrive feature not enabled. Recompile with --features gdrive")
        }
    }
}
