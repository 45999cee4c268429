//! The scheduler facade.
//!
//! [`Scheduler`] owns its store, worker pool and deferred executor and runs
//! three background tasks once started: the scheduler loop
//! (`scheduler_loop.rs`) and the misfire and lost-trigger recovery loops
//! (`recovery.rs`).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hourglass_core::{
    HandlerResolver, JobInfo, JobStore, SchedulerError, SchedulerResult, Trigger, TriggerState,
};

use crate::armed::ArmedTasks;
use crate::config::SchedulerConfig;
use crate::deferred::DeferredExecutor;
use crate::metrics::{MetricsSnapshot, SchedulerMetrics};
use crate::pool::{ExecutionPool, WorkerPool};
use crate::recovery::{self, RecoveryKind};
use crate::signal::LoopSignaler;

const POOL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// State shared by the scheduler facade and its background tasks.
pub(crate) struct SchedulerInner {
    pub(crate) config: SchedulerConfig,
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) resolver: Arc<dyn HandlerResolver>,
    pub(crate) pool: Arc<dyn ExecutionPool>,
    pub(crate) deferred: DeferredExecutor,
    pub(crate) armed: Arc<ArmedTasks>,
    pub(crate) signaler: Arc<LoopSignaler>,
    pub(crate) metrics: SchedulerMetrics,
    pub(crate) shutdown: CancellationToken,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerInner {
    /// Cancel every armed fire of a trigger.
    pub(crate) fn disarm(&self, trigger_key: &str) {
        let cancelled = self.armed.cancel_trigger(trigger_key);
        if cancelled > 0 {
            debug!("Cancelled {} armed fire(s) of {}", cancelled, trigger_key);
        }
    }
}

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
    store: Arc<dyn JobStore>,
    resolver: Arc<dyn HandlerResolver>,
    config: SchedulerConfig,
    pool: Option<Arc<dyn ExecutionPool>>,
}

impl SchedulerBuilder {
    /// Start a builder over a store and a handler resolver.
    pub fn new(store: Arc<dyn JobStore>, resolver: Arc<dyn HandlerResolver>) -> Self {
        Self {
            store,
            resolver,
            config: SchedulerConfig::default(),
            pool: None,
        }
    }

    /// Set the runtime configuration.
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the handler resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn HandlerResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use a custom execution pool instead of the default [`WorkerPool`].
    pub fn with_pool(mut self, pool: Arc<dyn ExecutionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn build(self) -> Scheduler {
        let pool = self
            .pool
            .unwrap_or_else(|| Arc::new(WorkerPool::new(self.config.workers.clone())));
        let armed = Arc::new(ArmedTasks::new());
        let signaler = Arc::new(LoopSignaler::new(armed.clone()));

        Scheduler {
            inner: Arc::new(SchedulerInner {
                config: self.config,
                store: self.store,
                resolver: self.resolver,
                pool,
                deferred: DeferredExecutor::new(),
                armed,
                signaler,
                metrics: SchedulerMetrics::new(),
                shutdown: CancellationToken::new(),
                started: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }
}

/// Embeddable job scheduler.
///
/// Cloning is cheap; clones share the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Shorthand for [`SchedulerBuilder::new`].
    pub fn builder(store: Arc<dyn JobStore>, resolver: Arc<dyn HandlerResolver>) -> SchedulerBuilder {
        SchedulerBuilder::new(store, resolver)
    }

    /// Attach the store, start the pool and spawn the background loops.
    ///
    /// Starting twice is a no-op. A scheduler that was shut down cannot be
    /// started again.
    pub async fn start(&self) -> SchedulerResult<()> {
        if self.is_shutdown() {
            return Err(SchedulerError::Shutdown);
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.store.initialize(self.inner.signaler.clone()).await?;
        self.inner.pool.start();
        self.inner.metrics.mark_start();

        let mut tasks = self.inner.tasks.lock();
        tasks.push(tokio::spawn(self.inner.clone().run_loop()));
        for kind in [RecoveryKind::Misfire, RecoveryKind::Lost] {
            tasks.push(tokio::spawn(recovery::run(self.inner.clone(), kind)));
        }

        info!(
            "Scheduler started (idle wait {:?}, fetch size {})",
            self.inner.config.idle_wait(),
            self.inner.config.fetch_max_size
        );
        Ok(())
    }

    /// Stop the loops, cancel armed fires and drain the worker pool.
    ///
    /// Best effort: residual errors are logged, never returned.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        info!("Scheduler shutting down");
        self.inner.shutdown.cancel();

        let disarmed = self.inner.armed.cancel_all();
        self.inner.deferred.shutdown();
        self.inner.deferred.wait().await;

        let tasks: Vec<_> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }

        self.inner.pool.shutdown(POOL_SHUTDOWN_TIMEOUT).await;
        info!("Scheduler stopped ({} armed fire(s) cancelled)", disarmed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Store a job without triggers.
    pub async fn add_job(&self, job: JobInfo, replace_existing: bool) -> SchedulerResult<()> {
        self.inner.store.store_job(job, replace_existing).await
    }

    /// Store a new job together with its first trigger.
    ///
    /// Returns the first fire time. Fails with `WillNeverFire` if the
    /// trigger has no fire time at registration.
    pub async fn schedule_job(
        &self,
        job: JobInfo,
        trigger: Trigger,
    ) -> SchedulerResult<DateTime<Utc>> {
        if trigger.job_key != job.key {
            return Err(SchedulerError::InvalidTrigger {
                key: trigger.key,
                message: format!(
                    "trigger belongs to job '{}', not '{}'",
                    trigger.job_key, job.key
                ),
            });
        }
        let trigger = prepare(trigger)?;
        self.inner.store.store_job(job, false).await?;
        self.store_prepared(trigger).await
    }

    /// Attach a trigger to an existing job. Returns the first fire time.
    pub async fn schedule_trigger(&self, trigger: Trigger) -> SchedulerResult<DateTime<Utc>> {
        let trigger = prepare(trigger)?;
        self.store_prepared(trigger).await
    }

    async fn store_prepared(&self, trigger: Trigger) -> SchedulerResult<DateTime<Utc>> {
        let first = trigger
            .next_fire_time
            .ok_or_else(|| SchedulerError::WillNeverFire(trigger.key.clone()))?;
        let key = trigger.key.clone();
        self.inner
            .store
            .store_trigger(trigger, TriggerState::Waiting, false)
            .await?;
        debug!("Scheduled trigger {} first firing at {}", key, first);
        Ok(first)
    }

    /// Remove a job and its triggers, cancelling armed fires.
    pub async fn remove_job(&self, job_key: &str) -> SchedulerResult<bool> {
        for trigger in self.inner.store.job_triggers(job_key).await? {
            self.inner.disarm(&trigger.key);
        }
        self.inner.store.remove_job(job_key).await
    }

    /// Remove a trigger, cancelling armed fires.
    pub async fn remove_trigger(&self, trigger_key: &str) -> SchedulerResult<bool> {
        self.inner.disarm(trigger_key);
        self.inner.store.remove_trigger(trigger_key).await
    }

    /// Fire a job once, now, through a synthetic one-shot trigger.
    ///
    /// Returns the synthetic trigger key.
    pub async fn trigger_job(&self, job_key: &str) -> SchedulerResult<String> {
        if self.inner.store.job_info(job_key).await?.is_none() {
            return Err(SchedulerError::UnknownJob(job_key.to_string()));
        }
        let key = format!("{}-manual-{}", job_key, Uuid::new_v4());
        let trigger = Trigger::fixed_time(key.clone(), job_key, Utc::now());
        self.schedule_trigger(trigger).await?;
        info!("Triggered job {} via {}", job_key, key);
        Ok(key)
    }

    pub async fn pause_trigger(&self, trigger_key: &str) -> SchedulerResult<()> {
        self.inner.store.pause_trigger(trigger_key).await?;
        self.inner.disarm(trigger_key);
        Ok(())
    }

    /// Pause every trigger of a job. Returns the paused trigger keys.
    pub async fn pause_job(&self, job_key: &str) -> SchedulerResult<Vec<String>> {
        let paused = self.inner.store.pause_job(job_key).await?;
        for key in &paused {
            self.inner.disarm(key);
        }
        Ok(paused)
    }

    pub async fn resume_trigger(&self, trigger_key: &str) -> SchedulerResult<()> {
        self.inner.store.resume_trigger(trigger_key).await
    }

    /// Resume every paused trigger of a job. Returns the resumed trigger keys.
    pub async fn resume_job(&self, job_key: &str) -> SchedulerResult<Vec<String>> {
        self.inner.store.resume_job(job_key).await
    }

    /// Current metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    /// Fires currently armed on the deferred executor.
    pub fn armed_count(&self) -> usize {
        self.inner.armed.len()
    }
}

/// Validate a trigger and compute its first fire time.
fn prepare(mut trigger: Trigger) -> SchedulerResult<Trigger> {
    trigger.validate()?;
    trigger.previous_fire_time = None;
    trigger.next_fire_time = None;
    trigger.state = TriggerState::Waiting;
    if trigger.compute_next_fire_time(Utc::now()).is_none() {
        return Err(SchedulerError::WillNeverFire(trigger.key));
    }
    Ok(trigger)
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
