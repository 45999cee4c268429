//! Configuration schema definitions.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub workers: WorkersConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Jobs registered at startup.
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

/// Scheduler loop and recovery timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// Poll interval and look-ahead window of the scheduler loop.
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,

    /// Upper bound of the random jitter subtracted from each idle wait.
    #[serde(default)]
    pub idle_wait_random_ms: u64,

    /// Maximum triggers acquired per loop pass.
    #[serde(default = "default_fetch_max_size")]
    pub fetch_max_size: usize,

    /// How long a waiting trigger may stay overdue before misfire recovery.
    #[serde(default = "default_misfire_threshold_ms")]
    pub misfire_threshold_ms: u64,

    /// How long an acquired trigger may stay unfired before lost recovery.
    #[serde(default = "default_lost_threshold_ms")]
    pub lost_threshold_ms: u64,
}

fn default_idle_wait_ms() -> u64 {
    30_000
}

fn default_fetch_max_size() -> usize {
    100
}

fn default_misfire_threshold_ms() -> u64 {
    60_000
}

fn default_lost_threshold_ms() -> u64 {
    300_000
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            idle_wait_ms: default_idle_wait_ms(),
            idle_wait_random_ms: 0,
            fetch_max_size: default_fetch_max_size(),
            misfire_threshold_ms: default_misfire_threshold_ms(),
            lost_threshold_ms: default_lost_threshold_ms(),
        }
    }
}

impl SchedulerSection {
    /// Get idle wait as Duration.
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    /// Get idle jitter bound as Duration.
    pub fn idle_wait_random(&self) -> Duration {
        Duration::from_millis(self.idle_wait_random_ms)
    }

    /// Get misfire threshold as Duration.
    pub fn misfire_threshold(&self) -> Duration {
        Duration::from_millis(self.misfire_threshold_ms)
    }

    /// Get lost threshold as Duration.
    pub fn lost_threshold(&self) -> Duration {
        Duration::from_millis(self.lost_threshold_ms)
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Jobs running at once.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Jobs allowed to wait for a free worker.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_pool_size() -> usize {
    8
}

fn default_queue_depth() -> usize {
    1024
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            queue_depth: default_queue_depth(),
        }
    }
}

/// Store backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `memory` or `sqlite`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database path for the sqlite backend.
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_store_path() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("hourglass").join("hourglass.db"))
        .unwrap_or_else(|| PathBuf::from("~/.hourglass/hourglass.db"))
        .to_string_lossy()
        .into_owned()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
        }
    }
}

impl StoreConfig {
    /// Whether the sqlite backend is selected.
    pub fn is_sqlite(&self) -> bool {
        self.backend.eq_ignore_ascii_case("sqlite")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files.
    #[serde(default)]
    pub directory: Option<String>,

    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            json: false,
        }
    }
}

/// A job declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub key: String,

    #[serde(default)]
    pub description: String,

    /// Name of a registered handler.
    pub handler: String,

    #[serde(default)]
    pub param: serde_json::Value,

    #[serde(default)]
    pub triggers: Vec<TriggerDefinition>,
}

/// Schedule kind of a declared trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKindName {
    /// One-shot at `start_time`.
    Fixed,
    /// Every `fixed_offset_ms` on a fixed grid.
    Rate,
    /// `fixed_offset_ms` after each completion.
    Delay,
    /// Cron `expression` in `timezone`.
    Cron,
}

/// A trigger declared in the config file.
///
/// Timestamps are RFC 3339 strings, e.g. `"2025-01-01T00:00:00Z"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub key: String,

    pub kind: TriggerKindName,

    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub initial_delay_ms: Option<u64>,

    #[serde(default)]
    pub fixed_offset_ms: Option<u64>,

    #[serde(default)]
    pub expression: Option<String>,

    #[serde(default)]
    pub timezone: Option<String>,
}

impl TriggerDefinition {
    /// Cron timezone, UTC when unset.
    pub fn timezone_or_utc(&self) -> &str {
        self.timezone.as_deref().unwrap_or("UTC")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scheduler.idle_wait_ms, 30_000);
        assert_eq!(config.scheduler.fetch_max_size, 100);
        assert_eq!(config.workers.pool_size, 8);
        assert_eq!(config.workers.queue_depth, 1024);
        assert_eq!(config.store.backend, "memory");
        assert!(!config.store.is_sqlite());
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_duration_accessors() {
        let section = SchedulerSection {
            idle_wait_ms: 500,
            idle_wait_random_ms: 50,
            misfire_threshold_ms: 2_000,
            lost_threshold_ms: 9_000,
            ..Default::default()
        };
        assert_eq!(section.idle_wait(), Duration::from_millis(500));
        assert_eq!(section.idle_wait_random(), Duration::from_millis(50));
        assert_eq!(section.misfire_threshold(), Duration::from_secs(2));
        assert_eq!(section.lost_threshold(), Duration::from_secs(9));
    }

    #[test]
    fn test_trigger_definition_timezone_default() {
        let def: TriggerDefinition =
            serde_json::from_str(r#"{"key":"t","kind":"cron","expression":"0 * * * * *"}"#).unwrap();
        assert_eq!(def.kind, TriggerKindName::Cron);
        assert_eq!(def.timezone_or_utc(), "UTC");
    }
}
