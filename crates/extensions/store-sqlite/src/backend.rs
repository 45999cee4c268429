//! SQLite job store implementation.
//!
//! Every mutation runs in a `BEGIN IMMEDIATE` transaction that first touches
//! the `scheduler_locks` row, so scheduler instances sharing the database
//! file mutate it one at a time. Domain failures (duplicate key, unknown
//! job) are returned as the inner result of a transaction closure and roll
//! the transaction back.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::RwLock;
use rusqlite::{TransactionBehavior, params};
use tokio_rusqlite::Connection;
use tracing::debug;

use hourglass_core::{
    CompletedExecutionInstruction, JobInfo, JobStore, NEVER, NoopSignaler, SchedulerError,
    SchedulerResult, Signaler, Trigger, TriggerFiredResult, TriggerState, time_to_millis,
};

use crate::codec::{
    all_jobs, job_exists, load_job, load_trigger, query_triggers, retire_if_exhausted,
    trigger_exists, upsert_job, upsert_trigger,
};
use crate::schema::{init_schema, lock_scheduler};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;

/// SQLite-based job store.
pub struct SqliteJobStore {
    conn: Connection,
    signaler: RwLock<Arc<dyn Signaler>>,
}

fn store_error(e: tokio_rusqlite::Error) -> SchedulerError {
    SchedulerError::Store(e.to_string())
}

// Fire times are persisted with millisecond precision.
fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

impl SqliteJobStore {
    /// Create a new in-memory database.
    pub async fn in_memory() -> SchedulerResult<Self> {
        let conn = Connection::open_in_memory().await.map_err(store_error)?;
        Self::with_connection(conn).await
    }

    /// Open or create a file-backed database.
    pub async fn open(path: impl AsRef<Path>) -> SchedulerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SchedulerError::Store(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path).await.map_err(store_error)?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> SchedulerResult<Self> {
        conn.call(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            init_schema(conn)
        })
        .await
        .map_err(store_error)?;

        Ok(Self {
            conn,
            signaler: RwLock::new(Arc::new(NoopSignaler)),
        })
    }

    fn signal_change(&self) {
        self.signaler.read().scheduling_change();
    }

    /// Run `op` in an immediate transaction holding the scheduler lock.
    ///
    /// The transaction commits only if `op` returns an inner `Ok`.
    async fn write<T, F>(&self, op: F) -> SchedulerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<SchedulerResult<T>> + Send + 'static,
    {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                lock_scheduler(&tx, Utc::now().timestamp_millis())?;
                let result = op(&tx)?;
                if result.is_ok() {
                    tx.commit()?;
                }
                Ok(result)
            })
            .await
            .map_err(store_error)?
    }

    async fn read<T, F>(&self, op: F) -> SchedulerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        self.conn
            .call(move |conn| Ok(op(conn)?))
            .await
            .map_err(store_error)
    }
}

fn pause(conn: &rusqlite::Connection, key: &str) -> rusqlite::Result<SchedulerResult<bool>> {
    let Some(mut trigger) = load_trigger(conn, key)? else {
        return Ok(Err(SchedulerError::UnknownTrigger(key.to_string())));
    };
    if matches!(trigger.state, TriggerState::Paused | TriggerState::Complete) {
        return Ok(Ok(false));
    }
    trigger.state = TriggerState::Paused;
    upsert_trigger(conn, &trigger)?;
    Ok(Ok(true))
}

fn resume(
    conn: &rusqlite::Connection,
    key: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<SchedulerResult<bool>> {
    let Some(mut trigger) = load_trigger(conn, key)? else {
        return Ok(Err(SchedulerError::UnknownTrigger(key.to_string())));
    };
    if trigger.state != TriggerState::Paused {
        return Ok(Ok(false));
    }
    trigger.state = match trigger.compute_next_fire_time(now) {
        Some(_) => TriggerState::Waiting,
        None => TriggerState::Complete,
    };
    upsert_trigger(conn, &trigger)?;
    Ok(Ok(true))
}

fn trigger_keys(conn: &rusqlite::Connection, job_key: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT key FROM triggers WHERE job_key = ?1 ORDER BY key")?;
    let keys = stmt
        .query_map([job_key], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(keys)
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn initialize(&self, signaler: Arc<dyn Signaler>) -> SchedulerResult<()> {
        *self.signaler.write() = signaler;
        Ok(())
    }

    async fn store_job(&self, job: JobInfo, replace_existing: bool) -> SchedulerResult<()> {
        let key = job.key.clone();
        self.write(move |conn| {
            if !replace_existing && job_exists(conn, &job.key)? {
                return Ok(Err(SchedulerError::DuplicateKey(job.key)));
            }
            upsert_job(conn, &job)?;
            Ok(Ok(()))
        })
        .await?;
        debug!("Stored job {}", key);
        Ok(())
    }

    async fn job_info(&self, job_key: &str) -> SchedulerResult<Option<JobInfo>> {
        let job_key = job_key.to_string();
        self.read(move |conn| load_job(conn, &job_key)).await
    }

    async fn remove_job(&self, job_key: &str) -> SchedulerResult<bool> {
        let key = job_key.to_string();
        let removed = self
            .write(move |conn| {
                let removed = conn.execute("DELETE FROM jobs WHERE key = ?1", [&key])?;
                if removed > 0 {
                    conn.execute("DELETE FROM triggers WHERE job_key = ?1", [&key])?;
                }
                Ok(Ok(removed > 0))
            })
            .await?;
        if removed {
            debug!("Removed job {}", job_key);
        }
        Ok(removed)
    }

    async fn list_jobs(&self) -> SchedulerResult<Vec<JobInfo>> {
        self.read(all_jobs).await
    }

    async fn store_trigger(
        &self,
        mut trigger: Trigger,
        initial_state: TriggerState,
        replace_existing: bool,
    ) -> SchedulerResult<()> {
        trigger.state = initial_state;
        retire_if_exhausted(&mut trigger);
        let (key, state) = (trigger.key.clone(), trigger.state);

        self.write(move |conn| {
            if !job_exists(conn, &trigger.job_key)? {
                return Ok(Err(SchedulerError::UnknownJob(trigger.job_key)));
            }
            if !replace_existing && trigger_exists(conn, &trigger.key)? {
                return Ok(Err(SchedulerError::DuplicateKey(trigger.key)));
            }
            upsert_trigger(conn, &trigger)?;
            Ok(Ok(()))
        })
        .await?;

        debug!("Stored trigger {} in state {}", key, state);
        self.signal_change();
        Ok(())
    }

    async fn trigger(&self, trigger_key: &str) -> SchedulerResult<Option<Trigger>> {
        let key = trigger_key.to_string();
        self.read(move |conn| load_trigger(conn, &key)).await
    }

    async fn job_triggers(&self, job_key: &str) -> SchedulerResult<Vec<Trigger>> {
        let job_key = job_key.to_string();
        self.read(move |conn| {
            query_triggers(conn, "WHERE job_key = ?1 ORDER BY key", [&job_key])
        })
        .await
    }

    async fn remove_trigger(&self, trigger_key: &str) -> SchedulerResult<bool> {
        let key = trigger_key.to_string();
        self.write(move |conn| {
            let removed = conn.execute("DELETE FROM triggers WHERE key = ?1", [&key])?;
            Ok(Ok(removed > 0))
        })
        .await
    }

    async fn list_triggers(&self) -> SchedulerResult<Vec<Trigger>> {
        self.read(|conn| query_triggers(conn, "ORDER BY key", [])).await
    }

    async fn pause_trigger(&self, trigger_key: &str) -> SchedulerResult<()> {
        let key = trigger_key.to_string();
        self.write(move |conn| pause(conn, &key)).await?;
        Ok(())
    }

    async fn pause_job(&self, job_key: &str) -> SchedulerResult<Vec<String>> {
        let job_key = job_key.to_string();
        self.write(move |conn| {
            if !job_exists(conn, &job_key)? {
                return Ok(Err(SchedulerError::UnknownJob(job_key)));
            }
            let mut paused = Vec::new();
            for key in trigger_keys(conn, &job_key)? {
                match pause(conn, &key)? {
                    Ok(true) => paused.push(key),
                    Ok(false) => {}
                    Err(e) => return Ok(Err(e)),
                }
            }
            Ok(Ok(paused))
        })
        .await
    }

    async fn resume_trigger(&self, trigger_key: &str) -> SchedulerResult<()> {
        let key = trigger_key.to_string();
        let now = now_millis();
        let resumed = self.write(move |conn| resume(conn, &key, now)).await?;
        if resumed {
            self.signal_change();
        }
        Ok(())
    }

    async fn resume_job(&self, job_key: &str) -> SchedulerResult<Vec<String>> {
        let job_key = job_key.to_string();
        let now = now_millis();
        let resumed = self
            .write(move |conn| {
                if !job_exists(conn, &job_key)? {
                    return Ok(Err(SchedulerError::UnknownJob(job_key)));
                }
                let mut resumed = Vec::new();
                for key in trigger_keys(conn, &job_key)? {
                    match resume(conn, &key, now)? {
                        Ok(true) => resumed.push(key),
                        Ok(false) => {}
                        Err(e) => return Ok(Err(e)),
                    }
                }
                Ok(Ok(resumed))
            })
            .await?;
        if !resumed.is_empty() {
            self.signal_change();
        }
        Ok(resumed)
    }

    async fn acquire_next_triggers(
        &self,
        max_timestamp: DateTime<Utc>,
        max_size: usize,
    ) -> SchedulerResult<Vec<Trigger>> {
        let max_millis = time_to_millis(max_timestamp);
        let limit = i64::try_from(max_size).unwrap_or(i64::MAX);
        let acquired = self
            .write(move |conn| {
                let mut due = query_triggers(
                    conn,
                    "WHERE state = ?1 AND next_fire_time IS NOT NULL AND next_fire_time <= ?2
                     ORDER BY next_fire_time, key LIMIT ?3",
                    params![TriggerState::Waiting.as_str(), max_millis, limit],
                )?;
                for trigger in &mut due {
                    trigger.state = TriggerState::Acquired;
                    conn.execute(
                        "UPDATE triggers SET state = ?1 WHERE key = ?2",
                        params![TriggerState::Acquired.as_str(), trigger.key],
                    )?;
                }
                Ok(Ok(due))
            })
            .await?;

        if !acquired.is_empty() {
            debug!("Acquired {} triggers due by {}", acquired.len(), max_timestamp);
        }
        Ok(acquired)
    }

    async fn release_trigger(&self, trigger: &Trigger) -> SchedulerResult<()> {
        let key = trigger.key.clone();
        let expected = trigger.next_fire_time;
        let released = self
            .write(move |conn| {
                let Some(mut canonical) = load_trigger(conn, &key)? else {
                    return Ok(Ok(false));
                };
                if canonical.state != TriggerState::Acquired
                    || canonical.next_fire_time != expected
                {
                    return Ok(Ok(false));
                }
                canonical.state = TriggerState::Waiting;
                retire_if_exhausted(&mut canonical);
                upsert_trigger(conn, &canonical)?;
                Ok(Ok(true))
            })
            .await?;
        if released {
            debug!("Released trigger {}", trigger.key);
            self.signal_change();
        }
        Ok(())
    }

    async fn trigger_fired(&self, trigger: &Trigger) -> SchedulerResult<TriggerFiredResult> {
        let key = trigger.key.clone();
        let expected = trigger.next_fire_time;
        let now = now_millis();
        let fired = self
            .write(move |conn| {
                let Some(mut canonical) = load_trigger(conn, &key)? else {
                    return Ok(Ok(None));
                };
                if canonical.state != TriggerState::Acquired
                    || canonical.next_fire_time != expected
                {
                    debug!(
                        "Trigger {} not claimable (state {}), skipping fire",
                        key, canonical.state
                    );
                    return Ok(Ok(None));
                }
                canonical.trigger_fired(now);
                canonical.state = TriggerState::Waiting;
                retire_if_exhausted(&mut canonical);
                upsert_trigger(conn, &canonical)?;
                Ok(Ok(load_trigger(conn, &key)?))
            })
            .await?;

        match fired {
            Some(fired) => {
                self.signal_change();
                Ok(TriggerFiredResult::Fired(fired))
            }
            None => Ok(TriggerFiredResult::Noop),
        }
    }

    async fn trigger_completed(
        &self,
        trigger: &mut Trigger,
        instruction: CompletedExecutionInstruction,
    ) -> SchedulerResult<()> {
        let now = now_millis();
        trigger.set_last_completed_time(now);
        trigger.rounds += 1;

        let key = trigger.key.clone();
        let rounds = self
            .write(move |conn| {
                if instruction == CompletedExecutionInstruction::Delete {
                    conn.execute("DELETE FROM triggers WHERE key = ?1", [&key])?;
                    debug!("Deleted exhausted trigger {}", key);
                    return Ok(Ok(None));
                }

                let Some(mut canonical) = load_trigger(conn, &key)? else {
                    return Ok(Ok(None));
                };
                canonical.set_last_completed_time(now);
                canonical.rounds += 1;
                retire_if_exhausted(&mut canonical);
                if canonical.state == TriggerState::Complete {
                    conn.execute("DELETE FROM triggers WHERE key = ?1", [&key])?;
                    debug!("Removed trigger {} exhausted on completion", key);
                } else {
                    upsert_trigger(conn, &canonical)?;
                }
                Ok(Ok(Some(canonical.rounds)))
            })
            .await?;

        if let Some(rounds) = rounds {
            trigger.rounds = rounds;
        }
        self.signal_change();
        Ok(())
    }

    async fn acquire_triggers_in_state(
        &self,
        max_timestamp: DateTime<Utc>,
        state: TriggerState,
    ) -> SchedulerResult<Vec<Trigger>> {
        let max_millis = time_to_millis(max_timestamp);
        self.read(move |conn| {
            query_triggers(
                conn,
                "WHERE state = ?1 AND next_fire_time IS NOT NULL AND next_fire_time <= ?2
                 ORDER BY next_fire_time, key",
                params![state.as_str(), max_millis],
            )
        })
        .await
    }

    async fn acquire_parked_triggers(
        &self,
        fired_before: DateTime<Utc>,
    ) -> SchedulerResult<Vec<Trigger>> {
        let max_millis = time_to_millis(fired_before);
        let never = time_to_millis(NEVER);
        self.read(move |conn| {
            query_triggers(
                conn,
                "WHERE state = ?1 AND next_fire_time = ?2
                   AND previous_fire_time IS NOT NULL AND previous_fire_time <= ?3
                 ORDER BY previous_fire_time, key",
                params![TriggerState::Waiting.as_str(), never, max_millis],
            )
        })
        .await
    }

    async fn recover_trigger(
        &self,
        scanned: &Trigger,
        mut recovered: Trigger,
        state: TriggerState,
    ) -> SchedulerResult<bool> {
        recovered.state = state;
        retire_if_exhausted(&mut recovered);
        let scanned = scanned.clone();
        let key = scanned.key.clone();

        let replaced = self
            .write(move |conn| match load_trigger(conn, &scanned.key)? {
                Some(canonical) if canonical == scanned => {
                    upsert_trigger(conn, &recovered)?;
                    Ok(Ok(true))
                }
                _ => Ok(Ok(false)),
            })
            .await?;

        if replaced {
            debug!("Recovered trigger {} into {}", key, state);
            self.signal_change();
        } else {
            debug!("Trigger {} changed since the recovery scan, skipping", key);
        }
        Ok(replaced)
    }
}
