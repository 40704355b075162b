use anyhow::Result;
use std::path::Path;

use crate::context;

pub async fn run(base_dir: &Path) -> Result<()> {
    let orchestrator = context::build(base_dir, false)?;
    let config = orchestrator.config_snapshot();

    println!("Game:             {}", config.game.name);
    println!("  Save path:      {}", orchestrator.save_data().save_path().display());
    println!("  Archive mode:   {}", config.game.archive_mode);
    println!("  Backups:        {}", orchestrator.save_data().backups_dir().display());
    println!("Auto restore:     {}", config.sync.auto_restore);
    println!("Auto store:       {}", config.sync.auto_store);
    println!("Revisions kept:   {}", config.sync.revisions_to_keep);

    // Only report selection here; logging in is left to `savesync login`.
    orchestrator.initialize_selected().await;

    println!("\nProviders:");
    for slot in orchestrator.slots() {
        let mut roles = Vec::new();
        if slot.is_restore_source() {
            roles.push("restore");
        }
        if slot.is_store_target() {
            roles.push("store");
        }
        let roles = if roles.is_empty() { "-".to_string() } else { roles.join("+") };
        let status = slot.status();
        println!(
            "  - {:<14} {:<14} root={} state={} {}",
            slot.id(),
            roles,
            slot.remote_root(),
            slot.storage().state(),
            status.status.unwrap_or_default()
        );
        if let Some(detail) = status.detail {
            println!("      {detail}");
        }
    }

    if !orchestrator.selection_valid() {
        println!("\nWarning: incorrect cloud storage selection (one restore source and at least one store target are required).");
    }
    Ok(())
}
