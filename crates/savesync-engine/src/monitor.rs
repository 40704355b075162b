//! Background detection of the game process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Poll interval of the process monitor.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Transition of the game process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    Started,
    Stopped,
}

/// Answers whether a process with the given name is running.
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, process_name: &str) -> bool;
}

/// Probe backed by the platform process listing tool (`pgrep` or `tasklist`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    #[cfg(windows)]
    fn is_running(&self, process_name: &str) -> bool {
        let image = format!("{process_name}.exe");
        std::process::Command::new("tasklist")
            .args(["/NH", "/FI", &format!("IMAGENAME eq {image}")])
            .output()
            .map(|out| {
                String::from_utf8_lossy(&out.stdout)
                    .to_lowercase()
                    .contains(&image.to_lowercase())
            })
            .unwrap_or(false)
    }

    #[cfg(not(windows))]
    fn is_running(&self, process_name: &str) -> bool {
        std::process::Command::new("pgrep")
            .args(["-x", process_name])
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

/// Polls a [`ProcessProbe`] and broadcasts start/stop transitions until the
/// shutdown token fires.
pub struct GameMonitor {
    events: broadcast::Sender<GameEvent>,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl GameMonitor {
    pub fn spawn(
        probe: Arc<dyn ProcessProbe>,
        process_name: &str,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        let running = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(poll_loop(
            probe,
            process_name.to_string(),
            interval,
            shutdown,
            events.clone(),
            running.clone(),
        ));

        Self {
            events,
            running,
            handle,
        }
    }

    /// Receive transitions from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wait for the loop to exit after its shutdown token fired.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Game monitor task failed");
        }
    }
}

async fn poll_loop(
    probe: Arc<dyn ProcessProbe>,
    process_name: String,
    interval: Duration,
    shutdown: CancellationToken,
    events: broadcast::Sender<GameEvent>,
    running: Arc<AtomicBool>,
) {
    tracing::debug!(process = %process_name, "Game monitor started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let check = {
            let probe = probe.clone();
            let name = process_name.clone();
            tokio::task::spawn_blocking(move || probe.is_running(&name)).await
        };
        let now_running = match check {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Process probe failed");
                continue;
            }
        };

        let was_running = running.swap(now_running, Ordering::AcqRel);
        let event = match (was_running, now_running) {
            (false, true) => GameEvent::Started,
            (true, false) => GameEvent::Stopped,
            _ => continue,
        };
        tracing::info!(process = %process_name, ?event, "Game process transition");
        // No receivers is fine; nobody is waiting on the game.
        let _ = events.send(event);
    }
    tracing::debug!(process = %process_name, "Game monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flag(AtomicBool);

    impl ProcessProbe for Flag {
        fn is_running(&self, _: &str) -> bool {
            self.0.load(Ordering::Acquire)
        }
    }

    #[tokio::test]
    async fn emits_transitions_and_stops() {
        let probe = Arc::new(Flag(AtomicBool::new(false)));
        let shutdown = CancellationToken::new();
        let monitor = GameMonitor::spawn(
            probe.clone(),
            "game",
            Duration::from_millis(10),
            shutdown.clone(),
        );
        let mut events = monitor.subscribe();

        probe.0.store(true, Ordering::Release);
        assert_eq!(events.recv().await.unwrap(), GameEvent::Started);
        assert!(monitor.is_running());

        probe.0.store(false, Ordering::Release);
        assert_eq!(events.recv().await.unwrap(), GameEvent::Stopped);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), monitor.join())
            .await
            .unwrap();
    }
}
