use anyhow::{Result, bail};
use std::path::Path;

use savesync_storage::ProviderState;

use crate::context;

pub async fn run(base_dir: &Path, provider: &str) -> Result<()> {
    let orchestrator = context::build(base_dir, true)?;
    let status = orchestrator.login(provider).await?;

    let ready = orchestrator
        .slot(provider)
        .is_some_and(|s| s.storage().state() == ProviderState::Ready);
    orchestrator.dispose().await;

    if !ready {
        bail!(
            "{}: {}",
            status.status.unwrap_or_default(),
            status.detail.unwrap_or_default()
        );
    }
    println!("{provider}: {}", status.status.unwrap_or_default());
    Ok(())
}
