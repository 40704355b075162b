use anyhow::{Result, bail};
use std::path::Path;
use std::sync::Arc;

use savesync_engine::GameOutcome;
use savesync_engine::launcher::CommandLauncher;
use savesync_engine::monitor::{GameMonitor, POLL_INTERVAL, SystemProbe};

use crate::console::status_spinner;
use crate::context;

pub async fn run(base_dir: &Path, interactive: bool) -> Result<()> {
    let orchestrator = context::start(base_dir, interactive).await?;
    let config = orchestrator.config_snapshot();

    let Some(process_name) = config.game.process_name.clone() else {
        bail!("Set game.process_name in the configuration to detect the game");
    };
    if config.game.launch_command.is_empty() {
        bail!("Set game.launch_command in the configuration to start the game");
    }
    if !orchestrator.selection_valid() && (config.sync.auto_restore || config.sync.auto_store) {
        bail!("Incorrect cloud storage selection; fix it with `savesync select`");
    }

    let monitor = GameMonitor::spawn(
        Arc::new(SystemProbe),
        &process_name,
        POLL_INTERVAL,
        orchestrator.shutdown_token(),
    );
    let launcher = CommandLauncher::new(config.game.launch_command.clone());

    let pb = status_spinner(orchestrator.status_line());
    let outcome = {
        let game = orchestrator.start_game(&launcher, &monitor);
        tokio::pin!(game);
        loop {
            tokio::select! {
                outcome = &mut game => break outcome,
                _ = tokio::signal::ctrl_c() => {
                    // Vetoed while a store or restore is underway.
                    if orchestrator.request_close().await {
                        break GameOutcome::Failed("interrupted".to_string());
                    }
                }
            }
        }
    };
    pb.finish_and_clear();

    let status = orchestrator.status().status.unwrap_or_default();
    orchestrator.dispose().await;
    monitor.join().await;

    match outcome {
        GameOutcome::Played => {
            println!("{status}");
            Ok(())
        }
        GameOutcome::Skipped => bail!("{} is already running", config.game.name),
        GameOutcome::Failed(message) => bail!("{message}"),
    }
}
