//! Callbacks from the job store to the scheduler loop.

use chrono::{DateTime, Utc};

/// Narrow capability the store uses to wake the scheduler loop.
pub trait Signaler: Send + Sync {
    /// Something changed that may move the earliest due trigger.
    fn scheduling_change(&self);

    /// The run armed for `expected_fire_time` has finished.
    fn trigger_completed(&self, trigger_key: &str, expected_fire_time: Option<DateTime<Utc>>);
}

/// Signaler that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSignaler;

impl Signaler for NoopSignaler {
    fn scheduling_change(&self) {}

    fn trigger_completed(&self, _trigger_key: &str, _expected_fire_time: Option<DateTime<Utc>>) {}
}
