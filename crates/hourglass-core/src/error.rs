//! Error types for the scheduler core.

use thiserror::Error;

/// Scheduler error types.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A job or trigger with the same key is already stored.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The referenced job does not exist.
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// The referenced trigger does not exist.
    #[error("Unknown trigger: {0}")]
    UnknownTrigger(String),

    /// The trigger has no fire time at registration.
    #[error("Trigger will never fire: {0}")]
    WillNeverFire(String),

    /// Cron expression failed to parse.
    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidCronExpression { expression: String, message: String },

    /// Timezone name is not in the tz database.
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Trigger definition is inconsistent.
    #[error("Invalid trigger {key}: {message}")]
    InvalidTrigger { key: String, message: String },

    /// Backing store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Worker pool rejected the submission.
    #[error("Pool rejected job {0}")]
    PoolRejected(String),

    /// Scheduler has been shut down.
    #[error("Scheduler is shut down")]
    Shutdown,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    /// Whether the error comes from validating caller input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchedulerError::DuplicateKey(_)
                | SchedulerError::UnknownJob(_)
                | SchedulerError::UnknownTrigger(_)
                | SchedulerError::WillNeverFire(_)
                | SchedulerError::InvalidCronExpression { .. }
                | SchedulerError::InvalidTimezone(_)
                | SchedulerError::InvalidTrigger { .. }
        )
    }
}
