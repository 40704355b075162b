use anyhow::{Result, bail};
use std::path::Path;

use savesync_engine::RestoreOutcome;

use crate::console::status_spinner;
use crate::context;

pub async fn run(base_dir: &Path, interactive: bool) -> Result<()> {
    let orchestrator = context::start(base_dir, interactive).await?;
    if !orchestrator.selection_valid() {
        bail!("Incorrect cloud storage selection; fix it with `savesync select`");
    }

    let pb = status_spinner(orchestrator.status_line());
    let outcome = orchestrator.restore().await;
    pb.finish_and_clear();
    orchestrator.dispose().await;

    match outcome {
        RestoreOutcome::Restored { revision, files } => {
            println!(
                "Restored {} ({files} file(s)) into {}",
                revision.display_stem(),
                orchestrator.save_data().save_path().display()
            );
            Ok(())
        }
        RestoreOutcome::NoSaveData => {
            println!("No save data");
            Ok(())
        }
        RestoreOutcome::Skipped => bail!("Another operation is underway"),
        RestoreOutcome::Failed(message) => bail!("Restore failed: {message}"),
    }
}
