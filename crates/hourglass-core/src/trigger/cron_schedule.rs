//! Cron trigger arithmetic.

use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};

/// A parsed cron expression bound to a timezone.
///
/// Expressions use the six-field form with seconds
/// (`sec min hour day-of-month month day-of-week`). A classic five-field
/// expression is accepted and fires at second zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CronSpec", into = "CronSpec")]
pub struct CronSchedule {
    expression: String,
    timezone: Tz,
    schedule: ::cron::Schedule,
}

/// Serialized form of a [`CronSchedule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronSpec {
    pub expression: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl CronSchedule {
    /// Parse an expression in the named IANA timezone.
    pub fn parse(expression: &str, timezone: &str) -> SchedulerResult<Self> {
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(timezone.to_string()))?;

        let normalized = normalize(expression);
        let schedule = ::cron::Schedule::from_str(&normalized).map_err(|e| {
            SchedulerError::InvalidCronExpression {
                expression: expression.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            expression: expression.trim().to_string(),
            timezone,
            schedule,
        })
    }

    /// The expression as given.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The evaluation timezone.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// First expression match strictly after `after`.
    pub fn next_match(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
            .map(|time| time.with_timezone(&Utc))
    }

    /// Next match after `after` filtered against the bounds.
    ///
    /// The filter keeps advancing only while the candidate is before the
    /// start *and* before the end. An unset end counts as unbounded. A
    /// candidate past the end exhausts the trigger.
    pub(super) fn fire_time_after(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        after: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let mut candidate = self.next_match(after)?;
        while let Some(start) =
            start.filter(|start| *start > candidate && end.is_none_or(|end| end > candidate))
        {
            // Jump to the window instead of stepping through every match before it.
            candidate = self.next_match(start - TimeDelta::nanoseconds(1))?;
        }
        match end {
            Some(end) if candidate > end => None,
            _ => Some(candidate),
        }
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression && self.timezone == other.timezone
    }
}

impl TryFrom<CronSpec> for CronSchedule {
    type Error = SchedulerError;

    fn try_from(spec: CronSpec) -> Result<Self, Self::Error> {
        Self::parse(&spec.expression, &spec.timezone)
    }
}

impl From<CronSchedule> for CronSpec {
    fn from(schedule: CronSchedule) -> Self {
        Self {
            expression: schedule.expression,
            timezone: schedule.timezone.name().to_string(),
        }
    }
}

fn normalize(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}
