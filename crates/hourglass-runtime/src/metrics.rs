//! Scheduler metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler metrics.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Total scheduler loop passes.
    pub loop_iterations: AtomicU64,

    /// Triggers claimed by the loop.
    pub triggers_acquired: AtomicU64,

    /// Slots handed to the deferred executor.
    pub triggers_armed: AtomicU64,

    /// Claims skipped because the slot was already armed.
    pub duplicate_arms: AtomicU64,

    /// Claims handed back to the store.
    pub triggers_released: AtomicU64,

    /// Claims turned into fires.
    pub triggers_fired: AtomicU64,

    /// Fires refused by the store because the claim was stale.
    pub claim_conflicts: AtomicU64,

    /// Runs that returned successfully.
    pub jobs_completed: AtomicU64,

    /// Runs that returned an error or panicked.
    pub jobs_failed: AtomicU64,

    /// Runs refused by the worker pool.
    pub jobs_rejected: AtomicU64,

    /// Waiting triggers rearmed by misfire recovery.
    pub misfires_recovered: AtomicU64,

    /// Acquired triggers rearmed by lost-trigger recovery.
    pub lost_recovered: AtomicU64,

    start_time: parking_lot::RwLock<Option<Instant>>,
}

impl SchedulerMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark scheduler start.
    pub fn mark_start(&self) {
        *self.start_time.write() = Some(Instant::now());
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .read()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn record_iteration(&self) {
        self.loop_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acquired(&self, count: u64) {
        self.triggers_acquired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_armed(&self) {
        self.triggers_armed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_arm(&self) {
        self.duplicate_arms.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self) {
        self.triggers_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fired(&self) {
        self.triggers_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_claim_conflict(&self) {
        self.claim_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_rejected(&self) {
        self.jobs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record triggers rearmed by misfire recovery.
    pub fn record_misfires(&self, count: u64) {
        self.misfires_recovered.fetch_add(count, Ordering::Relaxed);
    }

    /// Record triggers rearmed by lost-trigger recovery.
    pub fn record_lost(&self, count: u64) {
        self.lost_recovered.fetch_add(count, Ordering::Relaxed);
    }

    /// Get a snapshot of the metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            uptime_secs: self.uptime_secs(),
            loop_iterations: self.loop_iterations.load(Ordering::Relaxed),
            triggers_acquired: self.triggers_acquired.load(Ordering::Relaxed),
            triggers_armed: self.triggers_armed.load(Ordering::Relaxed),
            duplicate_arms: self.duplicate_arms.load(Ordering::Relaxed),
            triggers_released: self.triggers_released.load(Ordering::Relaxed),
            triggers_fired: self.triggers_fired.load(Ordering::Relaxed),
            claim_conflicts: self.claim_conflicts.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_rejected: self.jobs_rejected.load(Ordering::Relaxed),
            misfires_recovered: self.misfires_recovered.load(Ordering::Relaxed),
            lost_recovered: self.lost_recovered.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    pub loop_iterations: u64,
    pub triggers_acquired: u64,
    pub triggers_armed: u64,
    pub duplicate_arms: u64,
    pub triggers_released: u64,
    pub triggers_fired: u64,
    pub claim_conflicts: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_rejected: u64,
    pub misfires_recovered: u64,
    pub lost_recovered: u64,
}

impl MetricsSnapshot {
    /// Runs that finished, successfully or not.
    pub fn jobs_finished(&self) -> u64 {
        self.jobs_completed + self.jobs_failed
    }

    /// Fraction of finished runs that failed.
    pub fn failure_rate(&self) -> f64 {
        let finished = self.jobs_finished();
        if finished == 0 {
            return 0.0;
        }
        self.jobs_failed as f64 / finished as f64
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
