//! Queue configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file)
//! yields the stock queue: 10 000 events, 5 retries, 1s..300s jittered
//! backoff, cooperative dispatch.
//!
//! ```toml
//! max_queue_size = 5000
//! default_max_retries = 3
//! execution = "dedicated"
//!
//! [retry]
//! base_delay_ms = 500
//! max_delay_ms = 60000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::DEFAULT_MAX_RETRIES;
use crate::queue::{DEFAULT_MAX_QUEUE_SIZE, RetryPolicy};
use crate::worker::{DEFAULT_IDLE_INTERVAL, DEFAULT_NETWORK_DEPENDENT_TYPES};

/// Environment variable naming a config file for [`QueueConfig::load`].
pub const CONFIG_ENV_VAR: &str = "DRIFTQ_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which execution strategy drives the dispatcher loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// A tokio task on the caller's runtime.
    #[default]
    Cooperative,
    /// A dedicated OS thread.
    Dedicated,
}

/// Backoff settings, mirrored into a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            base_delay_ms: policy.base_delay.as_millis() as u64,
            backoff_factor: policy.backoff_factor,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            jitter: policy.jitter,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Bound on queued events; CRITICAL events may exceed it.
    pub max_queue_size: usize,

    /// `max_retries` given to events created by `queue_event`.
    pub default_max_retries: u32,

    /// Idle wait between polls when nothing is eligible.
    pub poll_interval_ms: u64,

    /// Start the dispatcher on enqueue and restart it on an offline to
    /// online transition. With `false` the queue is fully manual: only
    /// `start_processing` starts the loop, and reconnecting never does.
    pub auto_start: bool,

    pub execution: ExecutionMode,

    /// Event types deferred while offline.
    pub network_dependent_types: Vec<String>,

    pub retry: RetryConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            default_max_retries: DEFAULT_MAX_RETRIES,
            poll_interval_ms: DEFAULT_IDLE_INTERVAL.as_millis() as u64,
            auto_start: true,
            execution: ExecutionMode::default(),
            network_dependent_types: DEFAULT_NETWORK_DEPENDENT_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
            retry: RetryConfig::default(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file named by `DRIFTQ_CONFIG`, falling back to defaults.
    pub fn load() -> Self {
        let Ok(path) = std::env::var(CONFIG_ENV_VAR) else {
            return Self::default();
        };
        let path = PathBuf::from(path);
        match Self::load_from_file(&path) {
            Ok(config) => {
                info!(path = %path.display(), "loaded queue config from {CONFIG_ENV_VAR}");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load queue config, using defaults");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid("max_queue_size must be > 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".into()));
        }
        let retry = &self.retry;
        if retry.base_delay_ms == 0 {
            return Err(ConfigError::Invalid("retry.base_delay_ms must be > 0".into()));
        }
        if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_factor must be >= 1.0 (got {})",
                retry.backoff_factor
            )));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                retry.base_delay_ms, retry.max_delay_ms
            )));
        }
        if self.network_dependent_types.iter().any(String::is_empty) {
            return Err(ConfigError::Invalid(
                "network_dependent_types must not contain empty names".into(),
            ));
        }
        Ok(())
    }
}
