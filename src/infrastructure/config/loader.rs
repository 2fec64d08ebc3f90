use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::SchedulerConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_concurrency: {0}. Must be between 1 and 64")]
    InvalidMaxConcurrency(usize),

    #[error("Invalid reconcile_interval_secs: {0}. Must be at least 1")]
    InvalidReconcileInterval(u64),

    #[error("Invalid lock_priority_threshold: {0}. Must be between 0 and 10")]
    InvalidLockThreshold(f64),

    #[error("Invalid pattern_similarity_threshold: {0}. Must be between 0 and 1")]
    InvalidSimilarityThreshold(f64),

    #[error("Invalid task_timeout_secs: {0}. Must be at least 1")]
    InvalidTaskTimeout(u64),

    #[error("Invalid handoff_window: {0}. Must be at least 1")]
    InvalidHandoffWindow(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. wavefront.yaml (project config)
    /// 3. Environment variables (WAVEFRONT_* prefix, highest priority)
    pub fn load() -> Result<SchedulerConfig> {
        let config: SchedulerConfig = Figment::new()
            .merge(Serialized::defaults(SchedulerConfig::default()))
            .merge(Yaml::file("wavefront.yaml"))
            .merge(Env::prefixed("WAVEFRONT_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<SchedulerConfig> {
        let config: SchedulerConfig = Figment::new()
            .merge(Serialized::defaults(SchedulerConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &SchedulerConfig) -> Result<(), ConfigError> {
        if config.max_concurrency == 0 || config.max_concurrency > 64 {
            return Err(ConfigError::InvalidMaxConcurrency(config.max_concurrency));
        }
        if config.reconcile_interval_secs == 0 {
            return Err(ConfigError::InvalidReconcileInterval(
                config.reconcile_interval_secs,
            ));
        }
        if !(0.0..=10.0).contains(&config.lock_priority_threshold) {
            return Err(ConfigError::InvalidLockThreshold(
                config.lock_priority_threshold,
            ));
        }
        if !(0.0..=1.0).contains(&config.pattern_similarity_threshold) {
            return Err(ConfigError::InvalidSimilarityThreshold(
                config.pattern_similarity_threshold,
            ));
        }
        if config.task_timeout_secs == 0 {
            return Err(ConfigError::InvalidTaskTimeout(config.task_timeout_secs));
        }
        if config.handoff_window == 0 {
            return Err(ConfigError::InvalidHandoffWindow(config.handoff_window));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ConfigLoader::validate(&SchedulerConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = SchedulerConfig::default();
        config.max_concurrency = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConcurrency(0))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_similarity() {
        let mut config = SchedulerConfig::default();
        config.pattern_similarity_threshold = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidSimilarityThreshold(_))
        ));
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let mut config = SchedulerConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = ConfigLoader::load_from_file("does-not-exist.yaml").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }
}
