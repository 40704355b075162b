use anyhow::{Result, bail};
use std::path::Path;

use savesync_engine::SlotStore;

use crate::console::status_spinner;
use crate::context;

pub async fn run(base_dir: &Path, interactive: bool) -> Result<()> {
    let orchestrator = context::start(base_dir, interactive).await?;
    if !orchestrator.selection_valid() {
        bail!("Incorrect cloud storage selection; fix it with `savesync select`");
    }

    let pb = status_spinner(orchestrator.status_line());
    let report = orchestrator.store().await;
    pb.finish_and_clear();

    let Some(report) = report else {
        bail!("Another operation is underway");
    };

    println!("Revision {}", savesync_core::revision::format(report.timestamp));
    for target in &report.targets {
        let outcome = match &target.outcome {
            SlotStore::Stored => "stored".to_string(),
            SlotStore::CleanupFailed => "stored, cleanup failed".to_string(),
            SlotStore::Skipped => "skipped".to_string(),
            SlotStore::Failed(message) => format!("failed: {message}"),
        };
        println!("  {:<14} {outcome}", target.provider);
    }

    let status = orchestrator.status().status.unwrap_or_default();
    orchestrator.dispose().await;
    if !report.all_stored() {
        bail!("{status}");
    }
    println!("{status}");
    Ok(())
}
