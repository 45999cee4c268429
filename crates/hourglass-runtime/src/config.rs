//! Runtime configuration for the scheduler.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduler runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Poll interval and look-ahead window, in milliseconds.
    pub idle_wait_ms: u64,

    /// Upper bound of the random jitter subtracted from each idle wait.
    pub idle_wait_random_ms: u64,

    /// Maximum triggers acquired per loop pass.
    pub fetch_max_size: usize,

    /// Overdue age after which a waiting trigger is recovered.
    pub misfire_threshold_ms: u64,

    /// Age after which an acquired, unfired trigger is recovered.
    pub lost_threshold_ms: u64,

    /// Worker pool configuration.
    pub workers: WorkerPoolConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: 30_000,
            idle_wait_random_ms: 0,
            fetch_max_size: 100,
            misfire_threshold_ms: 60_000,
            lost_threshold_ms: 300_000,
            workers: WorkerPoolConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Set the idle wait.
    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait_ms = idle_wait.as_millis() as u64;
        self
    }

    /// Set the idle jitter bound.
    pub fn with_idle_wait_random(mut self, jitter: Duration) -> Self {
        self.idle_wait_random_ms = jitter.as_millis() as u64;
        self
    }

    /// Set the fetch batch size.
    pub fn with_fetch_max_size(mut self, size: usize) -> Self {
        self.fetch_max_size = size;
        self
    }

    /// Set the misfire threshold.
    pub fn with_misfire_threshold(mut self, threshold: Duration) -> Self {
        self.misfire_threshold_ms = threshold.as_millis() as u64;
        self
    }

    /// Set the lost-trigger threshold.
    pub fn with_lost_threshold(mut self, threshold: Duration) -> Self {
        self.lost_threshold_ms = threshold.as_millis() as u64;
        self
    }

    /// Set the worker pool sizing.
    pub fn with_workers(mut self, pool_size: usize, queue_depth: usize) -> Self {
        self.workers = WorkerPoolConfig {
            pool_size,
            queue_depth,
        };
        self
    }

    /// Get idle wait as Duration.
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    /// Get misfire threshold as Duration.
    pub fn misfire_threshold(&self) -> Duration {
        Duration::from_millis(self.misfire_threshold_ms)
    }

    /// Get lost threshold as Duration.
    pub fn lost_threshold(&self) -> Duration {
        Duration::from_millis(self.lost_threshold_ms)
    }

    /// Idle wait minus a random jitter in `[0, idle_wait_random)`.
    pub fn jittered_idle_wait(&self) -> Duration {
        if self.idle_wait_random_ms == 0 {
            return self.idle_wait();
        }
        let jitter = rand::random::<u64>() % self.idle_wait_random_ms;
        Duration::from_millis(self.idle_wait_ms.saturating_sub(jitter))
    }
}

impl From<&hourglass_config::Config> for SchedulerConfig {
    fn from(config: &hourglass_config::Config) -> Self {
        let scheduler = &config.scheduler;
        Self {
            idle_wait_ms: scheduler.idle_wait_ms,
            idle_wait_random_ms: scheduler.idle_wait_random_ms,
            fetch_max_size: scheduler.fetch_max_size,
            misfire_threshold_ms: scheduler.misfire_threshold_ms,
            lost_threshold_ms: scheduler.lost_threshold_ms,
            workers: WorkerPoolConfig {
                pool_size: config.workers.pool_size,
                queue_depth: config.workers.queue_depth,
            },
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Jobs running at once.
    pub pool_size: usize,

    /// Jobs allowed to wait for a free worker.
    pub queue_depth: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            queue_depth: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.idle_wait(), Duration::from_secs(30));
        assert_eq!(config.fetch_max_size, 100);
        assert_eq!(config.workers.pool_size, 8);
    }

    #[test]
    fn test_jittered_idle_wait() {
        let config = SchedulerConfig::default()
            .with_idle_wait(Duration::from_millis(1000))
            .with_idle_wait_random(Duration::from_millis(200));
        for _ in 0..50 {
            let wait = config.jittered_idle_wait();
            assert!(wait > Duration::from_millis(800));
            assert!(wait <= Duration::from_millis(1000));
        }

        let no_jitter = SchedulerConfig::default().with_idle_wait(Duration::from_millis(500));
        assert_eq!(no_jitter.jittered_idle_wait(), Duration::from_millis(500));
    }

    #[test]
    fn test_from_file_config() {
        let mut file_config = hourglass_config::Config::default();
        file_config.scheduler.idle_wait_ms = 250;
        file_config.workers.pool_size = 2;

        let config = SchedulerConfig::from(&file_config);
        assert_eq!(config.idle_wait_ms, 250);
        assert_eq!(config.workers.pool_size, 2);
        assert_eq!(config.lost_threshold(), Duration::from_secs(300));
    }
}
