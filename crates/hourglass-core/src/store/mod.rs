//! Job store contract.
//!
//! The store owns the canonical copy of every job and trigger and drives
//! the trigger state machine:
//!
//! ```text
//!            acquire_next_triggers            trigger_fired
//!  WAITING ─────────────────────────▶ ACQUIRED ──────────────▶ WAITING (next slot)
//!     ▲  ◀──────── release_trigger ───────┘         └────────▶ COMPLETE (exhausted)
//!     │
//!  pause_* ▼  ▲ resume_*
//!          PAUSED
//! ```
//!
//! `trigger_fired` only succeeds from `ACQUIRED`, which makes the claim
//! single-winner: every other caller gets [`TriggerFiredResult::Noop`].

mod due_index;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SchedulerResult;
use crate::job::JobInfo;
use crate::signaler::Signaler;
use crate::trigger::{Trigger, TriggerState};

pub use due_index::{DueEntry, DueIndex};
pub use memory::MemoryJobStore;

/// What the store should do with a trigger after its run completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletedExecutionInstruction {
    /// Keep the trigger and stamp the completion.
    Noop,
    /// The trigger is exhausted; remove it.
    Delete,
}

/// Outcome of a claim-to-fire transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerFiredResult {
    /// The claim succeeded; carries the refreshed trigger.
    Fired(Trigger),
    /// The trigger was not in `ACQUIRED` for this slot (handled elsewhere,
    /// paused or removed).
    Noop,
}

impl TriggerFiredResult {
    /// The refreshed trigger if the claim succeeded.
    pub fn into_trigger(self) -> Option<Trigger> {
        match self {
            TriggerFiredResult::Fired(trigger) => Some(trigger),
            TriggerFiredResult::Noop => None,
        }
    }
}

/// Persistence and state-machine contract for jobs and triggers.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Attach the signaler used to wake the scheduler loop.
    async fn initialize(&self, signaler: Arc<dyn Signaler>) -> SchedulerResult<()>;

    /// Store a job. Fails with `DuplicateKey` unless `replace_existing`.
    async fn store_job(&self, job: JobInfo, replace_existing: bool) -> SchedulerResult<()>;

    /// Look up a job.
    async fn job_info(&self, job_key: &str) -> SchedulerResult<Option<JobInfo>>;

    /// Remove a job and every trigger pointing at it.
    async fn remove_job(&self, job_key: &str) -> SchedulerResult<bool>;

    /// All stored jobs, ordered by key.
    async fn list_jobs(&self) -> SchedulerResult<Vec<JobInfo>>;

    /// Store a trigger in `initial_state`.
    ///
    /// Fails with `DuplicateKey` if the key exists and `replace_existing` is
    /// false, and with `UnknownJob` if the job is missing.
    async fn store_trigger(
        &self,
        trigger: Trigger,
        initial_state: TriggerState,
        replace_existing: bool,
    ) -> SchedulerResult<()>;

    /// Look up a trigger.
    async fn trigger(&self, trigger_key: &str) -> SchedulerResult<Option<Trigger>>;

    /// Triggers attached to a job, ordered by key.
    async fn job_triggers(&self, job_key: &str) -> SchedulerResult<Vec<Trigger>>;

    /// Remove a trigger.
    async fn remove_trigger(&self, trigger_key: &str) -> SchedulerResult<bool>;

    /// All stored triggers, ordered by key.
    async fn list_triggers(&self) -> SchedulerResult<Vec<Trigger>>;

    /// Move a trigger to `PAUSED`. Idempotent.
    async fn pause_trigger(&self, trigger_key: &str) -> SchedulerResult<()>;

    /// Pause every trigger of a job. Returns the affected trigger keys.
    async fn pause_job(&self, job_key: &str) -> SchedulerResult<Vec<String>>;

    /// Resume a paused trigger with a freshly computed fire time.
    async fn resume_trigger(&self, trigger_key: &str) -> SchedulerResult<()>;

    /// Resume every paused trigger of a job. Returns the affected trigger keys.
    async fn resume_job(&self, job_key: &str) -> SchedulerResult<Vec<String>>;

    /// Claim up to `max_size` waiting triggers due at or before
    /// `max_timestamp`, in due order.
    async fn acquire_next_triggers(
        &self,
        max_timestamp: DateTime<Utc>,
        max_size: usize,
    ) -> SchedulerResult<Vec<Trigger>>;

    /// Return a claimed trigger to `WAITING`.
    async fn release_trigger(&self, trigger: &Trigger) -> SchedulerResult<()>;

    /// Turn a claim into a fire and advance the trigger.
    async fn trigger_fired(&self, trigger: &Trigger) -> SchedulerResult<TriggerFiredResult>;

    /// Record the end of a run. Stamps the completion on `trigger` as well.
    async fn trigger_completed(
        &self,
        trigger: &mut Trigger,
        instruction: CompletedExecutionInstruction,
    ) -> SchedulerResult<()>;

    /// Triggers in `state` whose fire time is at or before `max_timestamp`.
    async fn acquire_triggers_in_state(
        &self,
        max_timestamp: DateTime<Utc>,
        state: TriggerState,
    ) -> SchedulerResult<Vec<Trigger>>;

    /// Waiting triggers parked on [`NEVER`](crate::trigger::NEVER) whose
    /// last fire is at or before `fired_before`, i.e. fixed-delay triggers
    /// whose run never reported completion.
    async fn acquire_parked_triggers(
        &self,
        fired_before: DateTime<Utc>,
    ) -> SchedulerResult<Vec<Trigger>>;

    /// Replace a trigger found by a recovery scan with its recovered copy.
    ///
    /// Applies only while the canonical trigger still equals `scanned`.
    /// Returns `false` when a fire, completion or pause got there first.
    async fn recover_trigger(
        &self,
        scanned: &Trigger,
        recovered: Trigger,
        state: TriggerState,
    ) -> SchedulerResult<bool>;
}
