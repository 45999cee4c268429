//! Fixed-delay and fixed-rate trigger arithmetic.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::Trigger;

/// Interval schedule shared by fixed-rate and fixed-delay triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayOrRateSchedule {
    /// Delay before the first fire, in milliseconds.
    #[serde(default)]
    pub initial_delay_ms: u64,

    /// Interval between fires, in milliseconds.
    pub fixed_offset_ms: u64,

    /// `true` measures the interval from the last completion,
    /// `false` from the previous scheduled slot.
    #[serde(default)]
    pub delay: bool,
}

impl DelayOrRateSchedule {
    /// Fixed-rate schedule.
    pub fn rate(offset: Duration) -> Self {
        Self {
            initial_delay_ms: 0,
            fixed_offset_ms: offset.as_millis() as u64,
            delay: false,
        }
    }

    /// Fixed-delay schedule.
    pub fn delay(offset: Duration) -> Self {
        Self {
            delay: true,
            ..Self::rate(offset)
        }
    }

    /// Get the initial delay as Duration.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Get the fixed offset as Duration.
    pub fn fixed_offset(&self) -> Duration {
        Duration::from_millis(self.fixed_offset_ms)
    }

    pub(super) fn fire_time_after(&self, trigger: &Trigger, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let never_armed = trigger.previous_fire_time.is_none() && trigger.next_fire_time.is_none();
        let offset_ms = if never_armed {
            self.initial_delay_ms
        } else {
            self.fixed_offset_ms
        };

        let mut time = after.checked_add_signed(millis(offset_ms)?)?;
        if let Some(start) = trigger.start_time {
            if start > time {
                time = align_to_start(time, start, self.fixed_offset_ms)?;
            }
        }
        within_end(trigger, time)
    }

    /// First grid slot after `now`, stepping from `candidate` by the offset.
    pub(super) fn skip_past(
        &self,
        trigger: &Trigger,
        candidate: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let step = i64::try_from(self.fixed_offset_ms).ok().filter(|step| *step > 0)?;
        let behind = (now - candidate).num_milliseconds();
        let steps = behind / step + 1;
        let mut time = candidate.checked_add_signed(millis_i64(steps.checked_mul(step)?)?)?;
        if time <= now {
            time = time.checked_add_signed(millis_i64(step)?)?;
        }
        within_end(trigger, time)
    }
}

// Step from `time` by `offset_ms` until reaching `start`.
fn align_to_start(time: DateTime<Utc>, start: DateTime<Utc>, offset_ms: u64) -> Option<DateTime<Utc>> {
    let step = i64::try_from(offset_ms).ok()?;
    if step == 0 {
        return Some(start);
    }
    let gap = (start - time).num_milliseconds();
    let steps = (gap + step - 1) / step;
    let mut aligned = time.checked_add_signed(millis_i64(steps.checked_mul(step)?)?)?;
    if aligned < start {
        aligned = aligned.checked_add_signed(millis_i64(step)?)?;
    }
    Some(aligned)
}

fn within_end(trigger: &Trigger, time: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match trigger.end_time {
        Some(end) if time > end => None,
        _ => Some(time),
    }
}

fn millis(ms: u64) -> Option<TimeDelta> {
    millis_i64(i64::try_from(ms).ok()?)
}

fn millis_i64(ms: i64) -> Option<TimeDelta> {
    TimeDelta::try_milliseconds(ms)
}
