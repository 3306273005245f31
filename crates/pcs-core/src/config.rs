//! Configuration module for pcs-api-rs.
//!
//! Provides typed configuration structs that map to a YAML configuration
//! file, with loading, validation, defaults, and a builder pattern for
//! programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::credentials::REPOSITORY_DIR_ENV;

/// Top-level configuration for pcs-api-rs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

/// Location of the app-info and user-credentials files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Directory holding `app_info.txt` and `user_credentials.txt`.
    pub dir: PathBuf,
}

/// Retry/backoff settings shared by every provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts before giving up on a retriable error.
    pub max_attempts: u32,
    /// Base backoff, in seconds, before the first retry (scaled
    /// exponentially, with jitter, for subsequent attempts).
    pub first_sleep_secs: f64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Optional path to a log file; stderr is used when unset.
    pub file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/pcs-api/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("pcs-api")
            .join("config.yaml")
    }

    pub fn to_retry_strategy(&self) -> crate::retry::RetryStrategy {
        crate::retry::RetryStrategy::new(self.retry.max_attempts, self.retry.first_sleep_secs)
    }
}

impl Default for RepositoryConfig {
    /// Honors `PCS_API_REPOSITORY_DIR` if set, otherwise falls back to the
    /// platform config directory.
    fn default() -> Self {
        let dir = std::env::var(REPOSITORY_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("~/.config"))
                    .join("pcs-api")
            });
        RepositoryConfig { dir }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            first_sleep_secs: 1.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"retry.max_attempts"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.retry.max_attempts == 0 {
            errors.push(ValidationError {
                field: "retry.max_attempts".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.retry.first_sleep_secs < 0.0 {
            errors.push(ValidationError {
                field: "retry.first_sleep_secs".into(),
                message: "must not be negative".into(),
            });
        }
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use pcs_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .retry_max_attempts(5)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn repository_dir(mut self, dir: PathBuf) -> Self {
        self.config.repository.dir = dir;
        self
    }

    pub fn retry_max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_first_sleep_secs(mut self, secs: f64) -> Self {
        self.config.retry.first_sleep_secs = secs;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = Some(file);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn rejects_zero_attempts() {
        let config = ConfigBuilder::new().retry_max_attempts(0).build();
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "retry.max_attempts");
    }

    #[test]
    fn rejects_unknown_log_level() {
        let config = ConfigBuilder::new().logging_level("verbose").build();
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn load_round_trips_yaml() {
        let config = ConfigBuilder::new().retry_max_attempts(7).build();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, yaml).unwrap();
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.retry.max_attempts, 7);
    }
}
