//! Job definitions and execution context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered job.
///
/// The `handler` field is an opaque key resolved to a [`JobHandler`](crate::handler::JobHandler)
/// at fire time, so the job itself stays serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Unique job key.
    pub key: String,

    /// Human readable description.
    #[serde(default)]
    pub description: String,

    /// Handler resolver key.
    pub handler: String,

    /// Opaque payload passed to the handler.
    #[serde(default)]
    pub param: serde_json::Value,
}

impl JobInfo {
    /// Create a new job.
    pub fn new(key: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            handler: handler.into(),
            param: serde_json::Value::Null,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the handler payload.
    pub fn with_param(mut self, param: serde_json::Value) -> Self {
        self.param = param;
        self
    }
}

/// Context handed to a job handler for a single run.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// The job being executed.
    pub job: JobInfo,

    /// Key of the trigger that fired.
    pub trigger_key: String,

    /// Slot the trigger was armed for.
    pub expected_fire_time: Option<DateTime<Utc>>,

    /// When execution actually started.
    pub fired_at: DateTime<Utc>,

    /// Completed fires of the trigger before this one.
    pub rounds: u64,
}

impl JobContext {
    /// Delay between the scheduled slot and the actual start.
    pub fn lateness(&self) -> chrono::TimeDelta {
        self.expected_fire_time
            .map(|expected| self.fired_at - expected)
            .unwrap_or_else(chrono::TimeDelta::zero)
    }
}
