use anyhow::Result;
use std::path::Path;

use crate::context;

pub async fn run(
    base_dir: &Path,
    restore: Option<&str>,
    store: &[String],
    no_store: &[String],
    interactive: bool,
) -> Result<()> {
    let orchestrator = context::build(base_dir, interactive)?;

    if let Some(id) = restore {
        orchestrator.select_restore_source(id).await?;
    }
    for id in store {
        orchestrator.set_store_target(id, true).await?;
    }
    for id in no_store {
        orchestrator.set_store_target(id, false).await?;
    }

    for slot in orchestrator.slots() {
        println!(
            "  {:<14} restore={:<5} store={:<5} {}",
            slot.id(),
            slot.is_restore_source(),
            slot.is_store_target(),
            slot.status().status.unwrap_or_default()
        );
    }
    if let Some(status) = orchestrator.status().status {
        println!("{status}");
    }
    orchestrator.dispose().await;
    Ok(())
}
