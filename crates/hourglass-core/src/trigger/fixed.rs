//! One-shot trigger arithmetic.

use chrono::{DateTime, Utc};

/// The start time while it is still ahead of `after`.
pub(super) fn fire_time_after(
    start: Option<DateTime<Utc>>,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    start.filter(|start| *start > after)
}
