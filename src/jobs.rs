//! Built-in handlers and registration of jobs declared in the config file.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use hourglass_config::{JobDefinition, TriggerDefinition, TriggerKindName};
use hourglass_core::{
    HandlerRegistry, JobContext, JobHandler, JobInfo, SchedulerError, SchedulerResult, Trigger,
};
use hourglass_runtime::Scheduler;

/// Logs the job param on every run.
pub(crate) struct LogHandler;

#[async_trait]
impl JobHandler for LogHandler {
    async fn execute(&self, ctx: &JobContext) -> anyhow::Result<()> {
        let message = ctx
            .job
            .param
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| ctx.job.param.to_string());
        info!(
            job = %ctx.job.key,
            trigger = %ctx.trigger_key,
            rounds = ctx.rounds,
            lateness_ms = ctx.lateness().num_milliseconds(),
            "{}",
            message
        );
        Ok(())
    }
}

/// Does nothing.
pub(crate) struct NoopHandler;

#[async_trait]
impl JobHandler for NoopHandler {
    async fn execute(&self, _ctx: &JobContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Registry preloaded with the `log` and `noop` handlers.
pub(crate) fn builtin_handlers() -> SchedulerResult<HandlerRegistry> {
    let registry = HandlerRegistry::new();
    registry.register("log", Arc::new(LogHandler))?;
    registry.register("noop", Arc::new(NoopHandler))?;
    Ok(registry)
}

/// Build a trigger for `job_key` from its config declaration.
pub(crate) fn build_trigger(job_key: &str, def: &TriggerDefinition) -> SchedulerResult<Trigger> {
    let missing = |field: &str| SchedulerError::InvalidTrigger {
        key: def.key.clone(),
        message: format!("{} is required", field),
    };

    let mut trigger = match def.kind {
        TriggerKindName::Fixed => {
            let at = def.start_time.ok_or_else(|| missing("start_time"))?;
            Trigger::fixed_time(&def.key, job_key, at)
        }
        TriggerKindName::Rate | TriggerKindName::Delay => {
            let offset = def
                .fixed_offset_ms
                .map(Duration::from_millis)
                .ok_or_else(|| missing("fixed_offset_ms"))?;
            let trigger = if def.kind == TriggerKindName::Rate {
                Trigger::fixed_rate(&def.key, job_key, offset)
            } else {
                Trigger::fixed_delay(&def.key, job_key, offset)
            };
            match def.initial_delay_ms {
                Some(ms) => trigger.with_initial_delay(Duration::from_millis(ms)),
                None => trigger,
            }
        }
        TriggerKindName::Cron => {
            let expression = def.expression.as_deref().ok_or_else(|| missing("expression"))?;
            Trigger::cron(&def.key, job_key, expression, def.timezone_or_utc())?
        }
    };

    if def.kind != TriggerKindName::Fixed {
        if let Some(start) = def.start_time {
            trigger = trigger.with_start_time(start);
        }
    }
    if let Some(end) = def.end_time {
        trigger = trigger.with_end_time(end);
    }
    Ok(trigger)
}

/// Outcome of registering the configured jobs.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Registration {
    pub jobs: usize,
    pub scheduled: usize,
    pub kept: usize,
    pub skipped: usize,
}

/// Store every configured job and schedule its triggers.
///
/// Jobs are replaced so param edits take effect on restart. Triggers that a
/// persistent store already holds keep their fire-time bookkeeping.
pub(crate) async fn register_jobs(
    scheduler: &Scheduler,
    jobs: &[JobDefinition],
) -> SchedulerResult<Registration> {
    let mut registration = Registration::default();

    for def in jobs {
        let job = JobInfo::new(&def.key, &def.handler)
            .with_description(&def.description)
            .with_param(def.param.clone());
        scheduler.add_job(job, true).await?;
        registration.jobs += 1;

        for trigger_def in &def.triggers {
            if scheduler.store().trigger(&trigger_def.key).await?.is_some() {
                debug!(trigger = %trigger_def.key, "Trigger already stored, keeping it");
                registration.kept += 1;
                continue;
            }

            let trigger = build_trigger(&def.key, trigger_def)?;
            match scheduler.schedule_trigger(trigger).await {
                Ok(first) => {
                    info!(job = %def.key, trigger = %trigger_def.key, first_fire = %first, "Scheduled trigger");
                    registration.scheduled += 1;
                }
                Err(SchedulerError::WillNeverFire(key)) => {
                    warn!(trigger = %key, "Trigger will never fire, skipping");
                    registration.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(registration)
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
