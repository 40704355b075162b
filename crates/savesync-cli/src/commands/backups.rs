use anyhow::Result;
use std::path::Path;

use crate::context;

pub fn run(base_dir: &Path) -> Result<()> {
    let orchestrator = context::build(base_dir, false)?;
    let save_data = orchestrator.save_data();
    let backups = save_data.list_backups()?;

    if backups.is_empty() {
        println!("No local backups in {}", save_data.backups_dir().display());
        return Ok(());
    }

    println!("Local backups in {}:", save_data.backups_dir().display());
    for backup in &backups {
        let size = std::fs::metadata(backup.remote_file_identifier())
            .map(|m| m.len())
            .unwrap_or_default();
        println!("  {}  {size} bytes", backup.display_stem());
    }
    Ok(())
}
