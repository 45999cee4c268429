//! Misfire and lost-trigger recovery loops.
//!
//! Both loops scan the store for triggers that slipped out of the normal
//! acquire/fire/complete protocol and re-store them with a freshly computed
//! fire time. The lost loop also picks up fixed-delay triggers parked on
//! `NEVER` whose run never reported completion. A store failure is logged
//! and retried on the next cycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use hourglass_core::{JobStore, SchedulerResult, TriggerState};

use crate::armed::ArmedTasks;
use crate::scheduler::SchedulerInner;

/// Which stuck state a recovery loop repairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryKind {
    /// `WAITING` triggers overdue past the misfire threshold.
    Misfire,
    /// `ACQUIRED` triggers never fired within the lost threshold, and
    /// parked fixed-delay triggers whose last fire is older than it.
    Lost,
}

impl RecoveryKind {
    /// Store state scanned by this loop.
    pub fn state(self) -> TriggerState {
        match self {
            RecoveryKind::Misfire => TriggerState::Waiting,
            RecoveryKind::Lost => TriggerState::Acquired,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RecoveryKind::Misfire => "misfire",
            RecoveryKind::Lost => "lost",
        }
    }
}

/// Outcome of one recovery scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Triggers rearmed with a future fire time.
    pub rearmed: Vec<String>,
    /// Triggers marked `COMPLETE` because they are exhausted.
    pub completed: Vec<String>,
    /// Triggers whose re-store failed.
    pub failed: usize,
}

impl RecoveryReport {
    pub fn recovered(&self) -> usize {
        self.rearmed.len() + self.completed.len()
    }
}

/// Scan once for stuck triggers older than `threshold` and repair them.
///
/// `armed` is consulted by lost-trigger recovery: a reclaimed trigger may
/// still have a stale fire armed in this process, and a parked fixed-delay
/// trigger whose run is still live here must be left alone.
///
/// Each repair is written only if the trigger is unchanged since the scan;
/// a trigger that fired, completed or paused in between is skipped.
pub async fn recover_once(
    store: &dyn JobStore,
    armed: Option<&ArmedTasks>,
    kind: RecoveryKind,
    threshold: Duration,
    now: DateTime<Utc>,
) -> SchedulerResult<RecoveryReport> {
    let threshold =
        chrono::Duration::from_std(threshold).unwrap_or_else(|_| chrono::Duration::zero());
    let cutoff = now - threshold;
    let mut stuck = store.acquire_triggers_in_state(cutoff, kind.state()).await?;

    if kind == RecoveryKind::Lost {
        if let Some(armed) = armed {
            for trigger in &stuck {
                armed.cancel_trigger(&trigger.key);
            }
        }
        let parked = store.acquire_parked_triggers(cutoff).await?;
        stuck.extend(
            parked
                .into_iter()
                .filter(|trigger| armed.is_none_or(|armed| !armed.has_trigger(&trigger.key))),
        );
    }

    let mut report = RecoveryReport::default();
    for scanned in stuck {
        let mut recovered = scanned.clone();
        let state = match recovered.recover_next_fire_time(now) {
            Some(_) => TriggerState::Waiting,
            None => TriggerState::Complete,
        };
        let key = scanned.key.clone();
        match store.recover_trigger(&scanned, recovered, state).await {
            Ok(true) if state == TriggerState::Complete => report.completed.push(key),
            Ok(true) => report.rearmed.push(key),
            Ok(false) => debug!("{} trigger {} changed during recovery", kind.name(), key),
            Err(e) => {
                warn!("Failed to recover {} trigger {}: {}", kind.name(), key, e);
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

/// Run a recovery loop until shutdown, once per threshold period.
pub(crate) async fn run(inner: Arc<SchedulerInner>, kind: RecoveryKind) {
    let period = match kind {
        RecoveryKind::Misfire => inner.config.misfire_threshold(),
        RecoveryKind::Lost => inner.config.lost_threshold(),
    };
    info!("{} recovery loop started (period {:?})", kind.name(), period);

    loop {
        let started = Instant::now();
        let scan = recover_once(
            inner.store.as_ref(),
            Some(inner.armed.as_ref()),
            kind,
            period,
            Utc::now(),
        );
        match scan.await {
            Ok(report) if report.recovered() > 0 => {
                info!(
                    "Recovered {} {} trigger(s), {} exhausted",
                    report.recovered(),
                    kind.name(),
                    report.completed.len()
                );
                let count = report.recovered() as u64;
                match kind {
                    RecoveryKind::Misfire => inner.metrics.record_misfires(count),
                    RecoveryKind::Lost => inner.metrics.record_lost(count),
                }
            }
            Ok(_) => debug!("No {} triggers found", kind.name()),
            Err(e) => error!("{} recovery scan failed: {}", kind.name(), e),
        }

        let sleep = period.saturating_sub(started.elapsed());
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = tokio::time::sleep(sleep) => {}
        }
    }
    info!("{} recovery loop stopped", kind.name());
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
