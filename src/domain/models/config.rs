//! Scheduler configuration model.
//!
//! Loaded hierarchically by the infrastructure config loader:
//! programmatic defaults, then a project-local yaml file, then
//! `WAVEFRONT_`-prefixed environment variables.

use serde::{Deserialize, Serialize};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Output format: json or pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Top-level scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum tasks dispatched concurrently within a batch
    pub max_concurrency: usize,
    /// Interval between conflict-engine reconciliation passes, seconds
    pub reconcile_interval_secs: u64,
    /// Agents at or above this priority acquire exclusive file locks
    pub lock_priority_threshold: f64,
    /// Minimum historical similarity to auto-apply a pattern resolution
    pub pattern_similarity_threshold: f64,
    /// Per-task execution timeout, seconds
    pub task_timeout_secs: u64,
    /// Rolling window size for handoff latency metrics
    pub handoff_window: usize,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            reconcile_interval_secs: 5,
            lock_priority_threshold: 7.0,
            pattern_similarity_threshold: 0.85,
            task_timeout_secs: 600,
            handoff_window: 100,
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert!((config.lock_priority_threshold - 7.0).abs() < f64::EPSILON);
        assert!((config.pattern_similarity_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.handoff_window, 100);
        assert_eq!(config.logging.level, "info");
    }
}
