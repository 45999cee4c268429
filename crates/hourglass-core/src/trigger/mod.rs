//! Triggers and their fire-time arithmetic.
//!
//! A [`Trigger`] carries the bookkeeping shared by every schedule kind
//! (bounds, previous/next fire, last completion, rounds) plus a
//! [`TriggerKind`] that supplies only `fire_time_after`. The advancing
//! algorithm is written once here:
//!
//! - [`Trigger::trigger_fired`] runs when a claim turns into a fire and
//!   fast-forwards past every slot at or before the fire timestamp.
//! - [`Trigger::compute_next_fire_time`] runs at registration, resume and
//!   recovery and keeps an armed slot that is still in the future.
//! - [`Trigger::set_last_completed_time`] lets fixed-delay triggers arm
//!   their next slot only once a run has finished.

mod cron_schedule;
mod delay_rate;
mod fixed;
mod state;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};

pub use self::cron_schedule::CronSchedule;
pub use self::delay_rate::DelayOrRateSchedule;
pub use self::state::TriggerState;

/// Sentinel fire time for a trigger that is parked until an external event
/// (a fixed-delay trigger waiting for its run to complete).
pub const NEVER: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

/// Convert a fire time into epoch milliseconds for persistence.
pub fn time_to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert epoch milliseconds back into a fire time, restoring [`NEVER`].
pub fn millis_to_time(millis: i64) -> Option<DateTime<Utc>> {
    if millis == NEVER.timestamp_millis() {
        return Some(NEVER);
    }
    DateTime::from_timestamp_millis(millis)
}

/// Schedule kind of a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fires once at `start_time`.
    FixedTime,
    /// Fires every `fixed_offset`, measured from the scheduled slot (rate)
    /// or from the last completion (delay).
    DelayOrRate(DelayOrRateSchedule),
    /// Fires on cron expression matches.
    Cron(CronSchedule),
}

impl TriggerKind {
    /// Persistence type tag.
    pub fn type_tag(&self) -> &'static str {
        match self {
            TriggerKind::FixedTime => "fixed_time",
            TriggerKind::DelayOrRate(s) if s.delay => "fixed_delay",
            TriggerKind::DelayOrRate(_) => "fixed_rate",
            TriggerKind::Cron(_) => "cron",
        }
    }
}

/// A schedule plus its fire-time bookkeeping.
///
/// The store owns the canonical instance of each trigger; everything else
/// works on clones and reconciles through store calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    /// Unique trigger key.
    pub key: String,

    /// Key of the job this trigger fires.
    pub job_key: String,

    /// Lower bound for fire times.
    pub start_time: Option<DateTime<Utc>>,

    /// Upper bound for fire times.
    pub end_time: Option<DateTime<Utc>>,

    /// Slot of the most recent fire.
    pub previous_fire_time: Option<DateTime<Utc>>,

    /// Next armed slot; `None` once exhausted.
    pub next_fire_time: Option<DateTime<Utc>>,

    /// When the most recent run finished.
    pub last_completed_time: Option<DateTime<Utc>>,

    /// Number of completed fires.
    pub rounds: u64,

    /// Mirror of the store state at the time this copy was taken.
    pub state: TriggerState,

    /// Schedule kind.
    pub kind: TriggerKind,
}

impl Trigger {
    /// Create a trigger of the given kind with no bounds.
    pub fn new(key: impl Into<String>, job_key: impl Into<String>, kind: TriggerKind) -> Self {
        Self {
            key: key.into(),
            job_key: job_key.into(),
            start_time: None,
            end_time: None,
            previous_fire_time: None,
            next_fire_time: None,
            last_completed_time: None,
            rounds: 0,
            state: TriggerState::Waiting,
            kind,
        }
    }

    /// One-shot trigger firing at `at`.
    pub fn fixed_time(key: impl Into<String>, job_key: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(key, job_key, TriggerKind::FixedTime).with_start_time(at)
    }

    /// Trigger firing every `offset` on a fixed grid.
    pub fn fixed_rate(key: impl Into<String>, job_key: impl Into<String>, offset: Duration) -> Self {
        Self::new(
            key,
            job_key,
            TriggerKind::DelayOrRate(DelayOrRateSchedule::rate(offset)),
        )
    }

    /// Trigger firing `offset` after each run completes.
    pub fn fixed_delay(key: impl Into<String>, job_key: impl Into<String>, offset: Duration) -> Self {
        Self::new(
            key,
            job_key,
            TriggerKind::DelayOrRate(DelayOrRateSchedule::delay(offset)),
        )
    }

    /// Cron trigger evaluated in `timezone`.
    pub fn cron(
        key: impl Into<String>,
        job_key: impl Into<String>,
        expression: &str,
        timezone: &str,
    ) -> SchedulerResult<Self> {
        let schedule = CronSchedule::parse(expression, timezone)?;
        Ok(Self::new(key, job_key, TriggerKind::Cron(schedule)))
    }

    /// Set the start bound.
    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    /// Set the end bound.
    pub fn with_end_time(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    /// Set the delay before the first fire of a delay/rate trigger.
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        if let TriggerKind::DelayOrRate(schedule) = &mut self.kind {
            schedule.initial_delay_ms = initial_delay.as_millis() as u64;
        }
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn job_key(&self) -> &str {
        &self.job_key
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn set_state(&mut self, state: TriggerState) {
        self.state = state;
    }

    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.next_fire_time
    }

    /// Whether the trigger can never fire again.
    pub fn is_exhausted(&self) -> bool {
        self.next_fire_time.is_none()
    }

    /// Whether the trigger is parked on [`NEVER`].
    pub fn is_parked(&self) -> bool {
        self.next_fire_time == Some(NEVER)
    }

    /// Reject definitions that cannot be scheduled.
    pub fn validate(&self) -> SchedulerResult<()> {
        let invalid = |message: &str| SchedulerError::InvalidTrigger {
            key: self.key.clone(),
            message: message.to_string(),
        };

        if self.key.is_empty() {
            return Err(invalid("key must not be empty"));
        }
        if self.job_key.is_empty() {
            return Err(invalid("job key must not be empty"));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end < start {
                return Err(invalid("end time precedes start time"));
            }
        }
        match &self.kind {
            TriggerKind::FixedTime if self.start_time.is_none() => {
                Err(invalid("fixed time trigger requires a start time"))
            }
            TriggerKind::DelayOrRate(schedule) if schedule.fixed_offset_ms == 0 => {
                Err(invalid("fixed offset must be greater than zero"))
            }
            _ => Ok(()),
        }
    }

    /// Next slot strictly after `after`, honoring the bounds.
    pub fn fire_time_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.kind {
            TriggerKind::FixedTime => fixed::fire_time_after(self.start_time, after),
            TriggerKind::DelayOrRate(schedule) => schedule.fire_time_after(self, after),
            TriggerKind::Cron(schedule) => {
                schedule.fire_time_after(self.start_time, self.end_time, after)
            }
        }
    }

    /// Advance past a fire at `now`.
    ///
    /// Moves the armed slot into `previous_fire_time` and stores the first
    /// slot after `now`. Returns `None` once the trigger is exhausted. A
    /// fixed-delay trigger parks on [`NEVER`] until its run completes.
    pub fn trigger_fired(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let armed = self.next_fire_time;
        if armed != Some(NEVER) {
            self.previous_fire_time = armed;
        }

        let next = if self.awaits_completion(armed) {
            Some(NEVER)
        } else {
            self.advance_past(armed.unwrap_or(now), now)
        };
        self.next_fire_time = next;
        next
    }

    /// Recompute the next slot at `now` without recording a fire.
    ///
    /// An armed slot still in the future is kept. An overdue slot is
    /// fast-forwarded along the schedule past `now`, so fixed-rate triggers
    /// keep their grid.
    pub fn compute_next_fire_time(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let next = match self.next_fire_time {
            Some(armed) if armed > now => Some(armed),
            Some(armed) => self.advance_past(armed, now),
            None => self.first_fire_time(now),
        };
        self.next_fire_time = next;
        next
    }

    /// Recompute the next slot of a trigger found stuck by recovery.
    ///
    /// Same as [`Trigger::compute_next_fire_time`], except that a trigger
    /// parked on [`NEVER`] whose run never reported completion is re-armed
    /// from its last fire along the schedule, past `now`.
    pub fn recover_next_fire_time(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_parked() {
            return self.compute_next_fire_time(now);
        }
        let next = self.advance_past(self.previous_fire_time.unwrap_or(now), now);
        self.next_fire_time = next;
        next
    }

    /// Record a completed run.
    pub fn set_last_completed_time(&mut self, completed: DateTime<Utc>) {
        self.last_completed_time = Some(completed);
        if self.is_delay_mode() {
            self.next_fire_time = self.fire_time_after(completed);
        }
    }

    fn is_delay_mode(&self) -> bool {
        matches!(&self.kind, TriggerKind::DelayOrRate(schedule) if schedule.delay)
    }

    // A delay trigger with an armed slot has no next slot until a completion
    // newer than that slot is recorded.
    fn awaits_completion(&self, armed: Option<DateTime<Utc>>) -> bool {
        let Some(armed) = armed else {
            return false;
        };
        self.is_delay_mode() && self.last_completed_time.is_none_or(|done| done < armed)
    }

    fn first_fire_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.kind {
            // A one-shot whose moment has just passed still fires once.
            TriggerKind::FixedTime => self
                .start_time
                .filter(|start| self.end_time.is_none_or(|end| *start <= end)),
            _ => self.fire_time_after(now),
        }
    }

    fn advance_past(&self, from: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let candidate = self.fire_time_after(from)?;
        if candidate > now {
            return Some(candidate);
        }
        let next = match &self.kind {
            TriggerKind::DelayOrRate(schedule) => schedule.skip_past(self, candidate, now),
            // Cron and one-shot slots do not depend on the previous slot.
            _ => self.fire_time_after(now),
        }?;
        (next > now).then_some(next)
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
