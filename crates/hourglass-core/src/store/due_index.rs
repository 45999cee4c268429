//! Due-time ordered trigger index.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

/// Index entry ordered by fire time ascending, unset fire times last,
/// then by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueEntry {
    pub fire_time: Option<DateTime<Utc>>,
    pub key: String,
}

impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_time = match (self.fire_time, other.fire_time) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_time.then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered set of waiting triggers with one entry per key.
#[derive(Debug, Default)]
pub struct DueIndex {
    entries: BTreeSet<DueEntry>,
    by_key: HashMap<String, Option<DateTime<Utc>>>,
}

impl DueIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or move the entry for `key`.
    pub fn insert(&mut self, key: &str, fire_time: Option<DateTime<Utc>>) {
        self.remove(key);
        self.by_key.insert(key.to_string(), fire_time);
        self.entries.insert(DueEntry {
            fire_time,
            key: key.to_string(),
        });
    }

    /// Remove the entry for `key`.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.by_key.remove(key) {
            Some(fire_time) => self.entries.remove(&DueEntry {
                fire_time,
                key: key.to_string(),
            }),
            None => false,
        }
    }

    /// Earliest entry.
    pub fn first(&self) -> Option<&DueEntry> {
        self.entries.first()
    }

    /// Keys due at or before `max`, in due order.
    pub fn due_before(&self, max: DateTime<Utc>) -> Vec<String> {
        self.entries
            .iter()
            .take_while(|entry| entry.fire_time.is_some_and(|time| time <= max))
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn fire_time(&self, key: &str) -> Option<Option<DateTime<Utc>>> {
        self.by_key.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
