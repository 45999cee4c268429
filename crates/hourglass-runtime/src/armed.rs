//! Registry of armed trigger fires.
//!
//! One entry per `(trigger key, expected fire time)` guarantees that a
//! slot is handed to the deferred executor at most once per process, even
//! when the loop acquires the same trigger on several passes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::deferred::DeferredHandle;

#[derive(Default)]
pub struct ArmedTasks {
    entries: Mutex<HashMap<String, HashMap<DateTime<Utc>, DeferredHandle>>>,
}

impl ArmedTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `(key, fire_time)` with the handle produced by `arm`.
    ///
    /// Returns `false` without calling `arm` if the slot is already armed.
    /// The check and the insert happen under one lock.
    pub fn arm_with<F>(&self, key: &str, fire_time: DateTime<Utc>, arm: F) -> bool
    where
        F: FnOnce() -> DeferredHandle,
    {
        let mut entries = self.entries.lock();
        let slots = entries.entry(key.to_string()).or_default();
        if slots.contains_key(&fire_time) {
            return false;
        }
        slots.insert(fire_time, arm());
        true
    }

    pub fn contains(&self, key: &str, fire_time: DateTime<Utc>) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|slots| slots.contains_key(&fire_time))
    }

    /// Whether any slot of the trigger is armed or still running here.
    pub fn has_trigger(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Forget a slot once its run finished or its claim was lost.
    pub fn remove(&self, key: &str, fire_time: DateTime<Utc>) -> Option<DeferredHandle> {
        let mut entries = self.entries.lock();
        let slots = entries.get_mut(key)?;
        let handle = slots.remove(&fire_time);
        if slots.is_empty() {
            entries.remove(key);
        }
        handle
    }

    /// Cancel and forget every slot of a trigger. Returns how many were armed.
    pub fn cancel_trigger(&self, key: &str) -> usize {
        let Some(slots) = self.entries.lock().remove(key) else {
            return 0;
        };
        for handle in slots.values() {
            handle.cancel();
        }
        slots.len()
    }

    /// Cancel and forget everything.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        let mut count = 0;
        for (_, slots) in drained {
            for handle in slots.values() {
                handle.cancel();
                count += 1;
            }
        }
        count
    }

    /// Armed slots across all triggers.
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::DeferredExecutor;
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_is_deduplicated() {
        let executor = DeferredExecutor::new();
        let armed = ArmedTasks::new();

        assert!(armed.arm_with("t1", at(0), || {
            executor.schedule("t1", Duration::from_secs(60), async {})
        }));
        let mut called = false;
        assert!(!armed.arm_with("t1", at(0), || {
            called = true;
            executor.schedule("t1", Duration::from_secs(60), async {})
        }));
        assert!(!called);
        assert!(armed.arm_with("t1", at(10), || {
            executor.schedule("t1", Duration::from_secs(60), async {})
        }));

        assert_eq!(armed.len(), 2);
        assert_eq!(executor.total_scheduled(), 2);
        assert!(armed.contains("t1", at(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_cancel() {
        let executor = DeferredExecutor::new();
        let armed = ArmedTasks::new();
        armed.arm_with("t1", at(0), || executor.schedule("t1", Duration::from_secs(5), async {}));
        armed.arm_with("t1", at(5), || executor.schedule("t1", Duration::from_secs(5), async {}));
        armed.arm_with("t2", at(0), || executor.schedule("t2", Duration::from_secs(5), async {}));

        assert!(armed.has_trigger("t2"));
        assert!(!armed.has_trigger("t3"));

        let removed = armed.remove("t1", at(0)).unwrap();
        assert!(!removed.is_cancelled());
        assert!(armed.remove("t1", at(0)).is_none());

        assert_eq!(armed.cancel_trigger("t1"), 1);
        assert_eq!(armed.cancel_trigger("t1"), 0);
        assert!(!armed.has_trigger("t1"));
        assert_eq!(armed.cancel_all(), 1);
        assert!(armed.is_empty());
    }
}
