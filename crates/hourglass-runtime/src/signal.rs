//! Wakeup signalling between the store and the scheduler loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use hourglass_core::Signaler;

use crate::armed::ArmedTasks;

/// Why [`LoopSignaler::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Scheduling data changed since the snapshot.
    Changed,
    /// The idle wait elapsed.
    Timeout,
    /// The scheduler is shutting down.
    Shutdown,
}

/// [`Signaler`] handed to the store by the scheduler.
///
/// Every scheduling change bumps a version counter. The loop snapshots the
/// version before acquiring and waits against that snapshot, so a change
/// that lands mid-pass is never lost.
pub struct LoopSignaler {
    version: AtomicU64,
    notify: Notify,
    armed: Arc<ArmedTasks>,
}

impl LoopSignaler {
    pub fn new(armed: Arc<ArmedTasks>) -> Self {
        Self {
            version: AtomicU64::new(0),
            notify: Notify::new(),
            armed,
        }
    }

    /// Current change version.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Wait until the version moves past `snapshot`, `timeout` elapses or
    /// `shutdown` is cancelled.
    pub async fn wait(
        &self,
        snapshot: u64,
        timeout: Duration,
        shutdown: &CancellationToken,
    ) -> WakeReason {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if shutdown.is_cancelled() {
                return WakeReason::Shutdown;
            }
            if self.version() != snapshot {
                return WakeReason::Changed;
            }

            tokio::select! {
                _ = shutdown.cancelled() => return WakeReason::Shutdown,
                _ = notified => continue,
                _ = tokio::time::sleep_until(deadline) => return WakeReason::Timeout,
            }
        }
    }
}

impl Signaler for LoopSignaler {
    fn scheduling_change(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn trigger_completed(&self, trigger_key: &str, expected_fire_time: Option<DateTime<Utc>>) {
        if let Some(expected) = expected_fire_time {
            if self.armed.remove(trigger_key, expected).is_some() {
                trace!("Released armed slot {} @ {}", trigger_key, expected);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signaler() -> Arc<LoopSignaler> {
        Arc::new(LoopSignaler::new(Arc::new(ArmedTasks::new())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let signaler = signaler();
        let token = CancellationToken::new();
        let reason = signaler
            .wait(signaler.version(), Duration::from_secs(30), &token)
            .await;
        assert_eq!(reason, WakeReason::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_before_wait_is_not_lost() {
        let signaler = signaler();
        let token = CancellationToken::new();
        let snapshot = signaler.version();

        signaler.scheduling_change();

        let reason = signaler.wait(snapshot, Duration::from_secs(30), &token).await;
        assert_eq!(reason, WakeReason::Changed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_during_wait() {
        let signaler = signaler();
        let token = CancellationToken::new();
        let snapshot = signaler.version();

        let waker = signaler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            waker.scheduling_change();
        });

        let reason = signaler.wait(snapshot, Duration::from_secs(30), &token).await;
        assert_eq!(reason, WakeReason::Changed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_wins() {
        let signaler = signaler();
        let token = CancellationToken::new();
        token.cancel();
        let reason = signaler
            .wait(signaler.version(), Duration::from_secs(30), &token)
            .await;
        assert_eq!(reason, WakeReason::Shutdown);
    }
}
