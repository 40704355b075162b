use anyhow::{Result, bail};
use std::path::Path;

use crate::context;

pub async fn run(base_dir: &Path, provider: Option<&str>, interactive: bool) -> Result<()> {
    let orchestrator = context::build(base_dir, interactive)?;

    let slot = match provider {
        Some(id) => orchestrator.slot(id),
        None => orchestrator.slots().iter().find(|s| s.is_restore_source()),
    };
    let Some(slot) = slot else {
        bail!("No such provider; run `savesync status` to see the configured ones");
    };

    let cancel = orchestrator.shutdown_token();
    slot.initialize(&cancel).await;
    let files = slot.list_revisions(&cancel).await?;

    if files.is_empty() {
        println!("No save data on {}.", slot.name());
        return Ok(());
    }

    println!("{:<28} {:<24} ID", "REVISION", "STORED");
    for file in &files {
        let stored = file
            .store_timestamp()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "{:<28} {:<24} {}",
            file.display_stem(),
            stored,
            file.remote_file_identifier()
        );
    }
    println!("\n{} revision(s) on {}", files.len(), slot.name());
    Ok(())
}
