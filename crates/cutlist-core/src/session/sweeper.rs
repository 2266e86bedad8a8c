//! Background reaping of expired sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::tracker::ProgressTracker;

/// Spawn a task that sweeps `tracker` every `interval` until `shutdown` fires.
pub fn spawn_sweeper(
    tracker: Arc<ProgressTracker>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_millis(10));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Session sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let reaped = tracker.sweep();
                    if reaped > 0 {
                        info!(reaped, remaining = tracker.len(), "Reaped expired parse sessions");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileDescriptor, RequestIdentity};

    #[tokio::test]
    async fn test_sweeper_reaps_and_stops() {
        let tracker = Arc::new(ProgressTracker::in_memory(Duration::ZERO));
        tracker.create_session(&RequestIdentity::new("o", "u"), &[FileDescriptor::new("a", None)]);

        let shutdown = CancellationToken::new();
        let handle = spawn_sweeper(tracker.clone(), Duration::from_millis(20), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(tracker.is_empty());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper stops")
            .unwrap();
    }
}
