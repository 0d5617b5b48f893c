//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::client::{RetryPolicy, DEFAULT_MESSAGE};
use crate::error::{Result, TurnstileError};
use crate::ratelimit::{PolicyOverride, PolicyTable};

/// Prefix for environment variable overrides, e.g. `TURNSTILE_SWEEP__INTERVAL_SECS`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Sweeper configuration
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Policy overrides keyed by category name
    #[serde(default)]
    pub policies: HashMap<String, PolicyOverride>,

    /// Server-side rejection responses
    #[serde(default)]
    pub rejection: RejectionConfig,

    /// Client-side reporting and retry, read by library callers
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweeps of expired windows
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

impl SweepConfig {
    /// The sweep interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_sweep_interval() -> u64 {
    300
}

/// Rejection response configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionConfig {
    /// Message placed in the 429 payload when an attempt is limited
    #[serde(default = "default_limited_message")]
    pub message: String,
}

impl Default for RejectionConfig {
    fn default() -> Self {
        Self {
            message: default_limited_message(),
        }
    }
}

fn default_limited_message() -> String {
    "Too many requests".to_string()
}

/// Client-side configuration.
///
/// The binary never acts as a client; these settings are for applications
/// that build a [`SignalState`](crate::client::SignalState) or call
/// [`refresh_with_retry`](crate::client::refresh_with_retry) from a loaded
/// [`TurnstileConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Message shown when a rejection carries none
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,

    /// Retries for background refreshes
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Cap on a single backoff delay, in seconds
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            fallback_message: default_fallback_message(),
            max_retries: default_max_retries(),
            max_retry_delay_secs: default_max_retry_delay(),
        }
    }
}

impl ClientConfig {
    /// Backoff settings for [`refresh_with_retry`](crate::client::refresh_with_retry).
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            max_delay: Duration::from_secs(self.max_retry_delay_secs),
        }
    }
}

fn default_fallback_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_retry_delay() -> u64 {
    30
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from an optional file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(TurnstileError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        let config: TurnstileConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig =
            serde_yaml::from_str(yaml).map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde can't.
    pub fn validate(&self) -> Result<()> {
        if self.sweep.interval_secs == 0 {
            return Err(TurnstileError::Config(
                "sweep.interval_secs must be greater than zero".to_string(),
            ));
        }
        self.policy_table().map(|_| ())
    }

    /// The built-in policies with this configuration's overrides applied.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        PolicyTable::from_overrides(&self.policies)
    }
}
