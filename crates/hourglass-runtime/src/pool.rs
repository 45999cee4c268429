//! Worker pool executing job runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, info, warn};

use hourglass_core::{SchedulerError, SchedulerResult};

use crate::config::WorkerPoolConfig;

/// A job run ready to execute.
pub type JobFuture = BoxFuture<'static, ()>;

/// Execution capability used by the scheduler.
///
/// Every submission carries a routing key (the job key) so an
/// implementation may serialize runs of the same job.
#[async_trait]
pub trait ExecutionPool: Send + Sync {
    /// Start accepting work.
    fn start(&self);

    /// Submit a run. Fails with `PoolRejected` when saturated or stopped.
    fn submit(&self, routing_key: &str, job: JobFuture) -> SchedulerResult<()>;

    /// Stop accepting work and wait up to `timeout` for runs in flight.
    async fn shutdown(&self, timeout: Duration);

    /// Workers currently idle.
    fn available_workers(&self) -> usize;
}

/// Bounded pool: `pool_size` concurrent runs plus `queue_depth` waiting.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    workers: Arc<Semaphore>,
    admission: Arc<Semaphore>,
    running: AtomicBool,
    tracker: TaskTracker,
    total_submitted: AtomicU64,
    total_processed: Arc<AtomicU64>,
    total_rejected: AtomicU64,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new(config: WorkerPoolConfig) -> Self {
        let pool_size = config.pool_size.max(1);
        Self {
            workers: Arc::new(Semaphore::new(pool_size)),
            admission: Arc::new(Semaphore::new(pool_size + config.queue_depth)),
            config,
            running: AtomicBool::new(false),
            tracker: TaskTracker::new(),
            total_submitted: AtomicU64::new(0),
            total_processed: Arc::new(AtomicU64::new(0)),
            total_rejected: AtomicU64::new(0),
        }
    }

    /// Check if pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs accepted so far.
    pub fn total_submitted(&self) -> u64 {
        self.total_submitted.load(Ordering::SeqCst)
    }

    /// Runs finished so far.
    pub fn total_processed(&self) -> u64 {
        self.total_processed.load(Ordering::SeqCst)
    }

    /// Runs refused because the pool was full or stopped.
    pub fn total_rejected(&self) -> u64 {
        self.total_rejected.load(Ordering::SeqCst)
    }

    /// Runs accepted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

#[async_trait]
impl ExecutionPool for WorkerPool {
    fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!(
            "Worker pool started with {} workers, queue depth {}",
            self.config.pool_size, self.config.queue_depth
        );
    }

    fn submit(&self, routing_key: &str, job: JobFuture) -> SchedulerResult<()> {
        if !self.is_running() {
            self.total_rejected.fetch_add(1, Ordering::SeqCst);
            return Err(SchedulerError::PoolRejected(routing_key.to_string()));
        }

        let Ok(admitted) = self.admission.clone().try_acquire_owned() else {
            self.total_rejected.fetch_add(1, Ordering::SeqCst);
            warn!("Worker pool saturated, rejecting run of {}", routing_key);
            return Err(SchedulerError::PoolRejected(routing_key.to_string()));
        };

        let workers = self.workers.clone();
        let processed = self.total_processed.clone();
        let span = tracing::debug_span!("worker", routing_key = %routing_key);
        self.tracker.spawn(
            async move {
                let _admitted = admitted;
                let Ok(_permit) = workers.acquire_owned().await else {
                    return;
                };
                job.await;
                processed.fetch_add(1, Ordering::SeqCst);
            }
            .instrument(span),
        );

        self.total_submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self, timeout: Duration) {
        self.running.store(false, Ordering::SeqCst);
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!("Worker pool stopped with {} runs still in flight", self.tracker.len());
        } else {
            info!("Worker pool stopped");
        }
    }

    fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
