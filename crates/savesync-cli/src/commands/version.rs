use anyhow::Result;
use std::path::Path;

use crate::context;

pub async fn run(base_dir: &Path, copy: bool) -> Result<()> {
    if !copy {
        println!("savesync {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let orchestrator = context::build(base_dir, false)?;
    orchestrator.copy_version().await;
    if let Some(status) = orchestrator.status().status {
        eprintln!("{status}");
    }
    Ok(())
}
