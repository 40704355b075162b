//! Time budgets for remote calls and polling of asynchronous batch jobs.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, StorageError};

/// Weight of each further file in a batch budget, relative to the previous one.
pub const BATCH_TIMEOUT_DECAY: f64 = 0.75;

/// Delay between two status checks of a batch job.
pub const BATCH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Status checks made before a batch job is given up on.
pub const BATCH_POLL_ATTEMPTS: u32 = 10;

/// Run `fut` until it completes, `budget` elapses or `cancel` fires.
pub async fn bounded<T, F>(
    operation: &'static str,
    budget: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled(operation)),
        outcome = tokio::time::timeout(budget, fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout { operation, after: budget }),
        },
    }
}

/// Aggregate budget for deleting `count` files: `per_file * Σ_{i<count} 0.75^i`.
///
/// Later files weigh less since a batch shares one round-trip; the total
/// never exceeds four per-file budgets. Saturates at `Duration::MAX`.
pub fn batch_timeout(per_file: Duration, count: usize) -> Duration {
    let mut weight = 1.0;
    let mut factor = 0.0;
    for _ in 0..count {
        factor += weight;
        weight *= BATCH_TIMEOUT_DECAY;
    }
    Duration::try_from_secs_f64(per_file.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Progress reported by a backend for an asynchronous batch job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus<T> {
    InProgress,
    Complete(T),
    Failed(String),
}

/// Poll `check` until the job completes, at most `max_checks` times with
/// `interval` between checks.
///
/// Returns `Ok(None)` when the job is still running after the last check.
pub async fn poll_job<T, F, Fut>(
    mut check: F,
    interval: Duration,
    max_checks: u32,
    cancel: &CancellationToken,
) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobStatus<T>>>,
{
    for attempt in 1..=max_checks {
        match check().await? {
            JobStatus::Complete(value) => return Ok(Some(value)),
            JobStatus::Failed(reason) => {
                return Err(StorageError::Transport(format!("Batch job failed: {reason}")));
            }
            JobStatus::InProgress => {
                tracing::debug!(attempt, max_checks, "Batch job still in progress");
            }
        }

        if attempt < max_checks {
            tokio::select! {
                _ = cancel.cancelled() => return Err(StorageError::Cancelled("batch job polling")),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    tracing::warn!(max_checks, "Batch job did not complete in time");
    Ok(None)
}
