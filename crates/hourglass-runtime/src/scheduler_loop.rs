//! The scheduler loop: claim due triggers and arm their waiting tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, trace, warn};

use hourglass_core::Trigger;

use crate::handoff::WaitingTask;
use crate::scheduler::SchedulerInner;
use crate::signal::WakeReason;

/// What happened to one acquired trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArmOutcome {
    Armed,
    Duplicate,
    JobDeleted,
    Released,
}

impl SchedulerInner {
    /// Run until shutdown.
    pub(crate) async fn run_loop(self: Arc<Self>) {
        info!("Scheduler loop started");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.metrics.record_iteration();

            let mut version = self.signaler.version();
            match self.poll_once().await {
                // A release bumps the version; waiting on the old snapshot
                // would re-acquire the same unarmable trigger immediately.
                Ok(released) if released > 0 => version = self.signaler.version(),
                Ok(_) => {}
                Err(e) => error!("Failed to acquire due triggers: {}", e),
            }

            let wait = self.config.jittered_idle_wait();
            match self.signaler.wait(version, wait, &self.shutdown).await {
                WakeReason::Shutdown => break,
                reason => trace!("Scheduler loop woke: {:?}", reason),
            }
        }
        info!("Scheduler loop stopped");
    }

    /// One acquire-and-arm pass. Returns how many triggers were released.
    async fn poll_once(self: &Arc<Self>) -> hourglass_core::SchedulerResult<usize> {
        let now = Utc::now();
        let window = chrono::Duration::from_std(self.config.idle_wait())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let triggers = self
            .store
            .acquire_next_triggers(now + window, self.config.fetch_max_size)
            .await?;
        if triggers.is_empty() {
            return Ok(0);
        }
        self.metrics.record_acquired(triggers.len() as u64);
        debug!("Acquired {} due trigger(s)", triggers.len());

        let mut released = 0;
        for trigger in triggers {
            if self.arm(trigger).await == ArmOutcome::Released {
                released += 1;
            }
        }
        Ok(released)
    }

    async fn arm(self: &Arc<Self>, trigger: Trigger) -> ArmOutcome {
        let Some(fire_time) = trigger.next_fire_time else {
            self.release(&trigger).await;
            return ArmOutcome::Released;
        };

        let job = match self.store.job_info(&trigger.job_key).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!("Job {} of trigger {} was deleted", trigger.job_key, trigger.key);
                return ArmOutcome::JobDeleted;
            }
            Err(e) => {
                warn!("Failed to load job {}: {}", trigger.job_key, e);
                self.release(&trigger).await;
                return ArmOutcome::Released;
            }
        };

        if self.armed.contains(&trigger.key, fire_time) {
            self.metrics.record_duplicate_arm();
            trace!("Trigger {} @ {} already armed", trigger.key, fire_time);
            return ArmOutcome::Duplicate;
        }

        let Some(handler) = self.resolver.resolve(&job.handler) else {
            warn!(
                "No handler '{}' for job {}, releasing trigger {}",
                job.handler, job.key, trigger.key
            );
            self.release(&trigger).await;
            return ArmOutcome::Released;
        };

        let delay = (fire_time - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let key = trigger.key.clone();
        let task = WaitingTask::new(self.clone(), trigger, job, handler);
        let armed = self.armed.arm_with(&key, fire_time, || {
            self.deferred.schedule(&key, delay, task.run())
        });

        if armed {
            self.metrics.record_armed();
            debug!("Armed trigger {} in {:?}", key, delay);
            ArmOutcome::Armed
        } else {
            self.metrics.record_duplicate_arm();
            ArmOutcome::Duplicate
        }
    }

    pub(crate) async fn release(&self, trigger: &Trigger) {
        if let Err(e) = self.store.release_trigger(trigger).await {
            warn!("Failed to release trigger {}: {}", trigger.key, e);
        }
        self.metrics.record_released();
    }
}
