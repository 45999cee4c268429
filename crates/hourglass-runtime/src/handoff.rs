//! Two-phase execution handoff.
//!
//! A [`WaitingTask`] is armed on the deferred executor for a claimed
//! trigger. At the fire moment it turns the claim into a fire through the
//! store and submits a [`JobRunTask`] to the worker pool, which runs the
//! handler and reports completion back to the store.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::{Instrument, debug, error, warn};

use hourglass_core::{
    CompletedExecutionInstruction, JobContext, JobHandler, JobInfo, Signaler, Trigger,
    TriggerFiredResult,
};

use crate::scheduler::SchedulerInner;

/// Deferred callback that claims a trigger at its fire time.
pub(crate) struct WaitingTask {
    inner: Arc<SchedulerInner>,
    trigger: Trigger,
    job: JobInfo,
    handler: Arc<dyn JobHandler>,
}

impl WaitingTask {
    pub(crate) fn new(
        inner: Arc<SchedulerInner>,
        trigger: Trigger,
        job: JobInfo,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        Self {
            inner,
            trigger,
            job,
            handler,
        }
    }

    pub(crate) async fn run(self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let expected = self.trigger.next_fire_time;

        let fired = match self.inner.store.trigger_fired(&self.trigger).await {
            Ok(TriggerFiredResult::Fired(fired)) => fired,
            Ok(TriggerFiredResult::Noop) => {
                debug!("Claim on {} is stale, abandoning fire", self.trigger.key);
                self.inner.metrics.record_claim_conflict();
                self.abandon(expected).await;
                return;
            }
            Err(e) => {
                warn!("Failed to fire trigger {}: {}", self.trigger.key, e);
                self.abandon(expected).await;
                return;
            }
        };
        self.inner.metrics.record_fired();

        let run = JobRunTask {
            inner: self.inner.clone(),
            trigger: fired,
            expected_fire_time: expected,
            job: self.job,
            handler: self.handler,
        };

        let routing_key = run.job.key.clone();
        if let Err(e) = self.inner.pool.submit(&routing_key, run.clone().run().boxed()) {
            warn!("{}, completing trigger {} without running", e, run.trigger.key);
            self.inner.metrics.record_job_rejected();
            run.finish().await;
        }
    }

    async fn abandon(&self, expected: Option<DateTime<Utc>>) {
        self.inner.release(&self.trigger).await;
        if let Some(expected) = expected {
            self.inner.armed.remove(&self.trigger.key, expected);
        }
    }
}

/// One execution of a job body on the worker pool.
#[derive(Clone)]
pub(crate) struct JobRunTask {
    inner: Arc<SchedulerInner>,
    trigger: Trigger,
    expected_fire_time: Option<DateTime<Utc>>,
    job: JobInfo,
    handler: Arc<dyn JobHandler>,
}

impl JobRunTask {
    pub(crate) async fn run(self) {
        let ctx = JobContext {
            job: self.job.clone(),
            trigger_key: self.trigger.key.clone(),
            expected_fire_time: self.expected_fire_time,
            fired_at: Utc::now(),
            rounds: self.trigger.rounds,
        };
        let span = tracing::info_span!("job", job = %ctx.job.key, trigger = %ctx.trigger_key);

        let outcome = AssertUnwindSafe(self.handler.execute(&ctx))
            .catch_unwind()
            .instrument(span)
            .await;
        let elapsed = Utc::now() - ctx.fired_at;

        match outcome {
            Ok(Ok(())) => {
                debug!(
                    "Job {} finished in {}ms (late by {}ms)",
                    ctx.job.key,
                    elapsed.num_milliseconds(),
                    ctx.lateness().num_milliseconds()
                );
                self.inner.metrics.record_job_completed();
            }
            Ok(Err(e)) => {
                error!("Job {} failed: {:#}", ctx.job.key, e);
                self.inner.metrics.record_job_failed();
            }
            Err(_) => {
                error!("Job {} panicked", ctx.job.key);
                self.inner.metrics.record_job_failed();
            }
        }

        self.finish().await;
    }

    /// Report the end of the run to the store and the loop.
    pub(crate) async fn finish(mut self) {
        let instruction = if self.trigger.is_exhausted() {
            CompletedExecutionInstruction::Delete
        } else {
            CompletedExecutionInstruction::Noop
        };

        if let Err(e) = self
            .inner
            .store
            .trigger_completed(&mut self.trigger, instruction)
            .await
        {
            warn!("Failed to complete trigger {}: {}", self.trigger.key, e);
        }
        self.inner
            .signaler
            .trigger_completed(&self.trigger.key, self.expected_fire_time);
    }
}
