use anyhow::Result;
use std::path::Path;

use crate::context;

pub fn auto(base_dir: &Path, store: Option<bool>, restore: Option<bool>) -> Result<()> {
    let orchestrator = context::build(base_dir, false)?;
    if let Some(value) = store {
        orchestrator.set_auto_store(value)?;
    }
    if let Some(value) = restore {
        orchestrator.set_auto_restore(value)?;
    }
    println!("Auto restore: {}", orchestrator.auto_restore());
    println!("Auto store:   {}", orchestrator.auto_store());
    Ok(())
}

pub fn keep(base_dir: &Path, count: u32) -> Result<()> {
    let orchestrator = context::build(base_dir, false)?;
    orchestrator.set_revisions_to_keep(count)?;
    println!("Keeping the newest {count} revision(s) per store target");
    Ok(())
}
