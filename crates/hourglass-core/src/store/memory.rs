//! In-memory job store.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::{CompletedExecutionInstruction, DueIndex, JobStore, TriggerFiredResult};
use crate::error::{SchedulerError, SchedulerResult};
use crate::job::JobInfo;
use crate::signaler::{NoopSignaler, Signaler};
use crate::trigger::{Trigger, TriggerState};

/// Job store holding everything behind one mutex.
///
/// Every operation is O(log n) over the due index, so a single coarse lock
/// is cheap compared to job execution.
pub struct MemoryJobStore {
    state: Mutex<StoreState>,
    signaler: RwLock<Arc<dyn Signaler>>,
}

#[derive(Default)]
struct StoreState {
    jobs: HashMap<String, JobInfo>,
    triggers: HashMap<String, Trigger>,
    triggers_by_job: HashMap<String, BTreeSet<String>>,
    due: DueIndex,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            signaler: RwLock::new(Arc::new(NoopSignaler)),
        }
    }

    /// Number of stored triggers.
    pub fn trigger_count(&self) -> usize {
        self.state.lock().triggers.len()
    }

    /// Number of entries in the due index.
    pub fn due_count(&self) -> usize {
        self.state.lock().due.len()
    }

    fn signal_change(&self) {
        self.signaler.read().scheduling_change();
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreState {
    fn remove_trigger(&mut self, key: &str) -> Option<Trigger> {
        let trigger = self.triggers.remove(key)?;
        self.due.remove(key);
        if let Some(keys) = self.triggers_by_job.get_mut(&trigger.job_key) {
            keys.remove(key);
            if keys.is_empty() {
                self.triggers_by_job.remove(&trigger.job_key);
            }
        }
        Some(trigger)
    }

    fn trigger_keys(&self, job_key: &str) -> Vec<String> {
        self.triggers_by_job
            .get(job_key)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    // Put a waiting trigger back in the index, or retire it once exhausted.
    fn reindex(&mut self, key: &str) {
        let Some(trigger) = self.triggers.get_mut(key) else {
            return;
        };
        self.due.remove(key);
        match (trigger.state, trigger.next_fire_time) {
            (TriggerState::Waiting, Some(next)) => self.due.insert(key, Some(next)),
            (TriggerState::Waiting, None) => trigger.state = TriggerState::Complete,
            _ => {}
        }
    }

    fn pause(&mut self, key: &str) -> SchedulerResult<bool> {
        let trigger = self
            .triggers
            .get_mut(key)
            .ok_or_else(|| SchedulerError::UnknownTrigger(key.to_string()))?;
        if matches!(trigger.state, TriggerState::Paused | TriggerState::Complete) {
            return Ok(false);
        }
        trigger.state = TriggerState::Paused;
        self.due.remove(key);
        Ok(true)
    }

    fn resume(&mut self, key: &str, now: DateTime<Utc>) -> SchedulerResult<bool> {
        let trigger = self
            .triggers
            .get_mut(key)
            .ok_or_else(|| SchedulerError::UnknownTrigger(key.to_string()))?;
        if trigger.state != TriggerState::Paused {
            return Ok(false);
        }
        trigger.state = match trigger.compute_next_fire_time(now) {
            Some(_) => TriggerState::Waiting,
            None => TriggerState::Complete,
        };
        self.reindex(key);
        Ok(true)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn initialize(&self, signaler: Arc<dyn Signaler>) -> SchedulerResult<()> {
        *self.signaler.write() = signaler;
        Ok(())
    }

    async fn store_job(&self, job: JobInfo, replace_existing: bool) -> SchedulerResult<()> {
        let mut state = self.state.lock();
        if state.jobs.contains_key(&job.key) && !replace_existing {
            return Err(SchedulerError::DuplicateKey(job.key));
        }
        debug!("Stored job {}", job.key);
        state.jobs.insert(job.key.clone(), job);
        Ok(())
    }

    async fn job_info(&self, job_key: &str) -> SchedulerResult<Option<JobInfo>> {
        Ok(self.state.lock().jobs.get(job_key).cloned())
    }

    async fn remove_job(&self, job_key: &str) -> SchedulerResult<bool> {
        let mut state = self.state.lock();
        if state.jobs.remove(job_key).is_none() {
            return Ok(false);
        }
        for key in state.trigger_keys(job_key) {
            state.remove_trigger(&key);
        }
        debug!("Removed job {}", job_key);
        Ok(true)
    }

    async fn list_jobs(&self) -> SchedulerResult<Vec<JobInfo>> {
        let state = self.state.lock();
        let mut jobs: Vec<JobInfo> = state.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(jobs)
    }

    async fn store_trigger(
        &self,
        mut trigger: Trigger,
        initial_state: TriggerState,
        replace_existing: bool,
    ) -> SchedulerResult<()> {
        {
            let mut state = self.state.lock();
            if !state.jobs.contains_key(&trigger.job_key) {
                return Err(SchedulerError::UnknownJob(trigger.job_key));
            }
            if state.triggers.contains_key(&trigger.key) {
                if !replace_existing {
                    return Err(SchedulerError::DuplicateKey(trigger.key));
                }
                state.remove_trigger(&trigger.key);
            }

            let key = trigger.key.clone();
            trigger.state = initial_state;
            state
                .triggers_by_job
                .entry(trigger.job_key.clone())
                .or_default()
                .insert(key.clone());
            state.triggers.insert(key.clone(), trigger);
            state.reindex(&key);
            debug!("Stored trigger {} in state {}", key, initial_state);
        }
        self.signal_change();
        Ok(())
    }

    async fn trigger(&self, trigger_key: &str) -> SchedulerResult<Option<Trigger>> {
        Ok(self.state.lock().triggers.get(trigger_key).cloned())
    }

    async fn job_triggers(&self, job_key: &str) -> SchedulerResult<Vec<Trigger>> {
        let state = self.state.lock();
        Ok(state
            .trigger_keys(job_key)
            .iter()
            .filter_map(|key| state.triggers.get(key).cloned())
            .collect())
    }

    async fn remove_trigger(&self, trigger_key: &str) -> SchedulerResult<bool> {
        Ok(self.state.lock().remove_trigger(trigger_key).is_some())
    }

    async fn list_triggers(&self) -> SchedulerResult<Vec<Trigger>> {
        let state = self.state.lock();
        let mut triggers: Vec<Trigger> = state.triggers.values().cloned().collect();
        triggers.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(triggers)
    }

    async fn pause_trigger(&self, trigger_key: &str) -> SchedulerResult<()> {
        self.state.lock().pause(trigger_key)?;
        Ok(())
    }

    async fn pause_job(&self, job_key: &str) -> SchedulerResult<Vec<String>> {
        let mut state = self.state.lock();
        if !state.jobs.contains_key(job_key) {
            return Err(SchedulerError::UnknownJob(job_key.to_string()));
        }
        let mut paused = Vec::new();
        for key in state.trigger_keys(job_key) {
            if state.pause(&key)? {
                paused.push(key);
            }
        }
        Ok(paused)
    }

    async fn resume_trigger(&self, trigger_key: &str) -> SchedulerResult<()> {
        let resumed = self.state.lock().resume(trigger_key, Utc::now())?;
        if resumed {
            self.signal_change();
        }
        Ok(())
    }

    async fn resume_job(&self, job_key: &str) -> SchedulerResult<Vec<String>> {
        let now = Utc::now();
        let resumed = {
            let mut state = self.state.lock();
            if !state.jobs.contains_key(job_key) {
                return Err(SchedulerError::UnknownJob(job_key.to_string()));
            }
            let mut resumed = Vec::new();
            for key in state.trigger_keys(job_key) {
                if state.resume(&key, now)? {
                    resumed.push(key);
                }
            }
            resumed
        };
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
        let mut state = self.state.lock();
        let mut acquired = Vec::new();

        while acquired.len() < max_size {
            let Some(entry) = state.due.first().cloned() else {
                break;
            };
            match entry.fire_time {
                Some(time) if time > max_timestamp => break,
                Some(_) => {}
                None => {
                    warn!("Dropping due entry {} without a fire time", entry.key);
                    state.due.remove(&entry.key);
                    continue;
                }
            }

            state.due.remove(&entry.key);
            if let Some(trigger) = state.triggers.get_mut(&entry.key) {
                trigger.state = TriggerState::Acquired;
                acquired.push(trigger.clone());
            }
        }

        if !acquired.is_empty() {
            debug!("Acquired {} triggers due by {}", acquired.len(), max_timestamp);
        }
        Ok(acquired)
    }

    async fn release_trigger(&self, trigger: &Trigger) -> SchedulerResult<()> {
        let released = {
            let mut state = self.state.lock();
            match state.triggers.get_mut(&trigger.key) {
                Some(canonical)
                    if canonical.state == TriggerState::Acquired
                        && canonical.next_fire_time == trigger.next_fire_time =>
                {
                    canonical.state = TriggerState::Waiting;
                    state.reindex(&trigger.key);
                    true
                }
                _ => false,
            }
        };
        if released {
            debug!("Released trigger {}", trigger.key);
            self.signal_change();
        }
        Ok(())
    }

    async fn trigger_fired(&self, trigger: &Trigger) -> SchedulerResult<TriggerFiredResult> {
        let now = Utc::now();
        let fired = {
            let mut state = self.state.lock();
            let Some(canonical) = state.triggers.get_mut(&trigger.key) else {
                return Ok(TriggerFiredResult::Noop);
            };
            if canonical.state != TriggerState::Acquired
                || canonical.next_fire_time != trigger.next_fire_time
            {
                debug!(
                    "Trigger {} not claimable (state {}), skipping fire",
                    trigger.key, canonical.state
                );
                return Ok(TriggerFiredResult::Noop);
            }

            canonical.trigger_fired(now);
            canonical.state = TriggerState::Waiting;
            state.reindex(&trigger.key);
            state.triggers.get(&trigger.key).cloned()
        };
        self.signal_change();
        Ok(fired.map_or(TriggerFiredResult::Noop, TriggerFiredResult::Fired))
    }

    async fn trigger_completed(
        &self,
        trigger: &mut Trigger,
        instruction: CompletedExecutionInstruction,
    ) -> SchedulerResult<()> {
        let now = Utc::now();
        trigger.set_last_completed_time(now);
        trigger.rounds += 1;

        {
            let mut state = self.state.lock();
            match instruction {
                CompletedExecutionInstruction::Delete => {
                    state.remove_trigger(&trigger.key);
                    debug!("Deleted exhausted trigger {}", trigger.key);
                }
                CompletedExecutionInstruction::Noop => {
                    if let Some(canonical) = state.triggers.get_mut(&trigger.key) {
                        canonical.set_last_completed_time(now);
                        canonical.rounds += 1;
                        trigger.rounds = canonical.rounds;
                        state.reindex(&trigger.key);
                    }
                    let exhausted = state
                        .triggers
                        .get(&trigger.key)
                        .is_some_and(|t| t.state == TriggerState::Complete);
                    if exhausted {
                        state.remove_trigger(&trigger.key);
                        debug!("Removed trigger {} exhausted on completion", trigger.key);
                    }
                }
            }
        }
        self.signal_change();
        Ok(())
    }

    async fn acquire_triggers_in_state(
        &self,
        max_timestamp: DateTime<Utc>,
        state: TriggerState,
    ) -> SchedulerResult<Vec<Trigger>> {
        let store = self.state.lock();
        if state == TriggerState::Waiting {
            return Ok(store
                .due
                .due_before(max_timestamp)
                .iter()
                .filter_map(|key| store.triggers.get(key).cloned())
                .collect());
        }

        let mut found: Vec<Trigger> = store
            .triggers
            .values()
            .filter(|t| t.state == state && t.next_fire_time.is_some_and(|next| next <= max_timestamp))
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.next_fire_time, &a.key).cmp(&(b.next_fire_time, &b.key)));
        Ok(found)
    }

    async fn acquire_parked_triggers(
        &self,
        fired_before: DateTime<Utc>,
    ) -> SchedulerResult<Vec<Trigger>> {
        let store = self.state.lock();
        let mut found: Vec<Trigger> = store
            .triggers
            .values()
            .filter(|t| {
                t.state == TriggerState::Waiting
                    && t.is_parked()
                    && t.previous_fire_time.is_some_and(|fired| fired <= fired_before)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.previous_fire_time, &a.key).cmp(&(b.previous_fire_time, &b.key)));
        Ok(found)
    }

    async fn recover_trigger(
        &self,
        scanned: &Trigger,
        mut recovered: Trigger,
        new_state: TriggerState,
    ) -> SchedulerResult<bool> {
        let replaced = {
            let mut state = self.state.lock();
            match state.triggers.get_mut(&scanned.key) {
                Some(canonical) if *canonical == *scanned => {
                    recovered.state = new_state;
                    *canonical = recovered;
                    state.reindex(&scanned.key);
                    true
                }
                _ => false,
            }
        };
        if replaced {
            debug!("Recovered trigger {} into {}", scanned.key, new_state);
            self.signal_change();
        } else {
            debug!("Trigger {} changed since the recovery scan, skipping", scanned.key);
        }
        Ok(replaced)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
