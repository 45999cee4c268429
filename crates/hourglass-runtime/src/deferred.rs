//! Deferred execution of one-shot callbacks.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug};
use uuid::Uuid;

/// Cancellable handle to a deferred callback.
#[derive(Debug, Clone)]
pub struct DeferredHandle {
    id: Uuid,
    token: CancellationToken,
}

impl DeferredHandle {
    /// Handle ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancel the callback if it has not started yet.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if the handle was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Runs futures after a delay on the tokio runtime.
///
/// Each callback gets a child token of the executor's root token, so
/// [`DeferredExecutor::shutdown`] cancels everything still waiting.
/// Cancellation only prevents a callback from starting.
pub struct DeferredExecutor {
    root: CancellationToken,
    tracker: TaskTracker,
    scheduled: AtomicU64,
}

impl DeferredExecutor {
    /// Create a new executor.
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
            scheduled: AtomicU64::new(0),
        }
    }

    /// Run `task` once `delay` has elapsed.
    pub fn schedule<F>(&self, name: &str, delay: Duration, task: F) -> DeferredHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let token = self.root.child_token();
        let span = tracing::debug_span!("deferred", id = %id, name = %name);

        let child = token.clone();
        self.tracker.spawn(
            async move {
                tokio::select! {
                    _ = child.cancelled() => {
                        debug!("Deferred task cancelled before firing");
                    }
                    _ = tokio::time::sleep(delay) => task.await,
                }
            }
            .instrument(span),
        );

        self.scheduled.fetch_add(1, Ordering::Relaxed);
        DeferredHandle { id, token }
    }

    /// Callbacks still waiting or running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Total callbacks scheduled.
    pub fn total_scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    /// Cancel everything still waiting and stop accepting new work.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.tracker.close();
    }

    /// Wait until every spawned callback has finished.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Check if the executor was shut down.
    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }
}

impl Default for DeferredExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let executor = DeferredExecutor::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = fired.clone();
        executor.schedule("test", Duration::from_secs(5), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(executor.total_scheduled(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_firing() {
        let executor = DeferredExecutor::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = fired.clone();
        let handle = executor.schedule("test", Duration::from_secs(5), async move {
            flag.store(true, Ordering::SeqCst);
        });
        handle.cancel();
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert!(handle.is_cancelled());
        assert_eq!(executor.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending() {
        let executor = DeferredExecutor::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = fired.clone();
        let handle = executor.schedule("test", Duration::from_secs(60), async move {
            flag.store(true, Ordering::SeqCst);
        });

        executor.shutdown();
        executor.wait().await;
        assert!(handle.is_cancelled());
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(executor.pending(), 0);
        assert!(executor.is_shutdown());
    }
}
