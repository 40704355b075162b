mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{StubStorage, harness};
use savesync_core::types::ProviderKind;
use savesync_engine::launcher::GameLauncher;
use savesync_engine::monitor::{GameMonitor, ProcessProbe};
use savesync_engine::{GameOutcome, Result};

struct FakeProcess(AtomicBool);

impl ProcessProbe for FakeProcess {
    fn is_running(&self, _: &str) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Launcher whose "game" runs for `play_time` and then exits.
struct FakeLauncher {
    process: Arc<FakeProcess>,
    play_time: Duration,
    starts: bool,
}

#[async_trait]
impl GameLauncher for FakeLauncher {
    async fn launch(&self) -> Result<()> {
        if !self.starts {
            return Ok(());
        }
        let process = self.process.clone();
        let play_time = self.play_time;
        tokio::spawn(async move {
            process.0.store(true, Ordering::Release);
            tokio::time::sleep(play_time).await;
            process.0.store(false, Ordering::Release);
        });
        Ok(())
    }
}

#[tokio::test]
async fn game_session_restores_then_stores() {
    let dropbox = Arc::new(StubStorage::new(ProviderKind::Dropbox));
    let h = harness(vec![dropbox.clone()], |config| {
        config.sync.restore_source = Some("dropbox".into());
        config.sync.store_targets = vec!["dropbox".into()];
        config.sync.auto_restore = true;
        config.sync.auto_store = true;
        config.game.name = "Test Game".into();
    });

    let process = Arc::new(FakeProcess(AtomicBool::new(false)));
    let monitor = GameMonitor::spawn(
        process.clone(),
        "testgame",
        Duration::from_millis(10),
        h.orchestrator.shutdown_token(),
    );
    let launcher = FakeLauncher {
        process,
        play_time: Duration::from_millis(100),
        starts: true,
    };

    let outcome = h.orchestrator.start_game(&launcher, &monitor).await;
    assert_eq!(outcome, GameOutcome::Played);

    // Auto-restore found nothing, auto-store uploaded one revision.
    assert_eq!(dropbox.downloads.load(Ordering::SeqCst), 0);
    assert_eq!(dropbox.uploads.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.orchestrator.status().status.as_deref(),
        Some("Store done")
    );

    h.orchestrator.dispose().await;
    monitor.join().await;
}

#[tokio::test]
async fn game_that_never_starts_times_out() {
    let dropbox = Arc::new(StubStorage::new(ProviderKind::Dropbox));
    let h = harness(vec![dropbox.clone()], |config| {
        config.sync.store_targets = vec!["dropbox".into()];
        config.sync.auto_store = true;
        config.timeouts.game_start_secs = 1;
    });

    let process = Arc::new(FakeProcess(AtomicBool::new(false)));
    let monitor = GameMonitor::spawn(
        process.clone(),
        "testgame",
        Duration::from_millis(10),
        h.orchestrator.shutdown_token(),
    );
    let launcher = FakeLauncher {
        process,
        play_time: Duration::ZERO,
        starts: false,
    };

    let outcome = h.orchestrator.start_game(&launcher, &monitor).await;
    assert!(matches!(outcome, GameOutcome::Failed(_)));
    assert_eq!(
        h.orchestrator.status().status.as_deref(),
        Some("Error: The game didn't start within 1 seconds.")
    );
    assert_eq!(dropbox.uploads.load(Ordering::SeqCst), 0);

    h.orchestrator.dispose().await;
    monitor.join().await;
}
