//! Configuration validation.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::schema::{Config, TriggerDefinition, TriggerKindName};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_scheduler(config, &mut result);
        Self::validate_workers(config, &mut result);
        Self::validate_store(config, &mut result);
        Self::validate_jobs(config, &mut result);

        result
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        let scheduler = &config.scheduler;
        if scheduler.idle_wait_ms == 0 {
            result.add_error(ValidationError::new(
                "scheduler.idle_wait_ms",
                "idle_wait_ms must be greater than 0",
            ));
        }

        if scheduler.idle_wait_random_ms >= scheduler.idle_wait_ms && scheduler.idle_wait_random_ms > 0 {
            result.add_warning(ValidationWarning::new(
                "scheduler.idle_wait_random_ms",
                "jitter is not smaller than idle_wait_ms, the loop may not sleep at all",
            ));
        }

        if scheduler.fetch_max_size == 0 {
            result.add_error(ValidationError::new(
                "scheduler.fetch_max_size",
                "fetch_max_size must be greater than 0",
            ));
        }

        if scheduler.misfire_threshold_ms == 0 {
            result.add_error(ValidationError::new(
                "scheduler.misfire_threshold_ms",
                "misfire_threshold_ms must be greater than 0",
            ));
        }

        if scheduler.lost_threshold_ms == 0 {
            result.add_error(ValidationError::new(
                "scheduler.lost_threshold_ms",
                "lost_threshold_ms must be greater than 0",
            ));
        } else if scheduler.lost_threshold_ms < scheduler.idle_wait_ms {
            result.add_warning(ValidationWarning::new(
                "scheduler.lost_threshold_ms",
                "lost_threshold_ms is shorter than the look-ahead window, pre-armed triggers may be reclaimed",
            ));
        }
    }

    fn validate_workers(config: &Config, result: &mut ValidationResult) {
        if config.workers.pool_size == 0 {
            result.add_error(ValidationError::new(
                "workers.pool_size",
                "pool_size must be greater than 0",
            ));
        }
    }

    fn validate_store(config: &Config, result: &mut ValidationResult) {
        let backend = config.store.backend.to_ascii_lowercase();
        if backend != "memory" && backend != "sqlite" {
            result.add_error(ValidationError::new(
                "store.backend",
                format!("Unknown store backend '{}', expected memory or sqlite", config.store.backend),
            ));
        }

        if config.store.is_sqlite() && config.store.path.is_empty() {
            result.add_error(ValidationError::new(
                "store.path",
                "sqlite backend requires a path",
            ));
        }
    }

    fn validate_jobs(config: &Config, result: &mut ValidationResult) {
        let mut job_keys = HashSet::new();
        let mut trigger_keys = HashSet::new();

        for (i, job) in config.jobs.iter().enumerate() {
            let path = format!("jobs[{}]", i);
            if job.key.is_empty() {
                result.add_error(ValidationError::new(format!("{}.key", path), "Job key cannot be empty"));
            } else if !job_keys.insert(job.key.as_str()) {
                result.add_error(ValidationError::new(
                    format!("{}.key", path),
                    format!("Duplicate job key '{}'", job.key),
                ));
            }

            if job.handler.is_empty() {
                result.add_error(ValidationError::new(
                    format!("{}.handler", path),
                    "Handler cannot be empty",
                ));
            }

            if job.triggers.is_empty() {
                result.add_warning(ValidationWarning::new(
                    format!("{}.triggers", path),
                    format!("Job '{}' has no triggers and only runs when triggered manually", job.key),
                ));
            }

            for (j, trigger) in job.triggers.iter().enumerate() {
                let trigger_path = format!("{}.triggers[{}]", path, j);
                if !trigger_keys.insert(trigger.key.as_str()) {
                    result.add_error(ValidationError::new(
                        format!("{}.key", trigger_path),
                        format!("Duplicate trigger key '{}'", trigger.key),
                    ));
                }
                Self::validate_trigger(trigger, &trigger_path, result);
            }
        }
    }

    fn validate_trigger(trigger: &TriggerDefinition, path: &str, result: &mut ValidationResult) {
        if trigger.key.is_empty() {
            result.add_error(ValidationError::new(format!("{}.key", path), "Trigger key cannot be empty"));
        }

        match trigger.kind {
            TriggerKindName::Fixed if trigger.start_time.is_none() => {
                result.add_error(ValidationError::new(
                    format!("{}.start_time", path),
                    "fixed trigger requires start_time",
                ));
            }
            TriggerKindName::Rate | TriggerKindName::Delay => match trigger.fixed_offset_ms {
                None => result.add_error(ValidationError::new(
                    format!("{}.fixed_offset_ms", path),
                    "rate and delay triggers require fixed_offset_ms",
                )),
                Some(0) => result.add_error(ValidationError::new(
                    format!("{}.fixed_offset_ms", path),
                    "fixed_offset_ms must be greater than 0",
                )),
                Some(_) => {}
            },
            TriggerKindName::Cron if trigger.expression.as_deref().is_none_or(str::is_empty) => {
                result.add_error(ValidationError::new(
                    format!("{}.expression", path),
                    "cron trigger requires expression",
                ));
            }
            _ => {}
        }

        if let (Some(start), Some(end)) = (trigger.start_time, trigger.end_time) {
            if end < start {
                result.add_error(ValidationError::new(
                    format!("{}.end_time", path),
                    "end_time precedes start_time",
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
