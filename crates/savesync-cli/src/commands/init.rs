use anyhow::Result;
use std::path::Path;

use savesync_core::config::{AppPaths, SaveSyncConfig};

pub fn run(base_dir: &Path) -> Result<()> {
    println!("Initializing SaveSync in {}", base_dir.display());

    let paths = AppPaths::new(base_dir);
    std::fs::create_dir_all(base_dir)?;
    std::fs::create_dir_all(&paths.storage_config_dir)?;

    if paths.config_file.exists() {
        println!("Config already exists at {}", paths.config_file.display());
    } else {
        let config = SaveSyncConfig::default_config(base_dir);
        config.save(&paths.config_file)?;
        println!("Created config: {}", paths.config_file.display());
    }

    let config = SaveSyncConfig::load(&paths.config_file)?;
    if config.credentials.protection == "local" {
        if paths.user_key_file.exists() {
            println!("Credential key already exists: {}", paths.user_key_file.display());
        } else {
            savesync_keys::create_protector("local", &paths.user_key_file)?;
            println!("Created credential key: {}", paths.user_key_file.display());
        }
    }

    println!("\nSaveSync initialized. Next steps:");
    println!("  1. Set the save path and providers in {}", paths.config_file.display());
    println!("  2. Run `savesync login <provider>` for each cloud provider");
    println!("  3. Run `savesync store` to upload your first revision");

    Ok(())
}
