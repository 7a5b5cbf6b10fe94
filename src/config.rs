//! Crate configuration.
//!
//! Loaded from an optional TOML file plus `RESILIENCE__`-prefixed
//! environment overrides; every field has a default so an empty
//! configuration is valid.

use crate::circuit_breaker::BreakerConfig;
use crate::retry::RetryStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the resilience core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Background sweeper configuration
    #[serde(default)]
    pub background: BackgroundConfig,

    /// Dead letter queue configuration
    #[serde(default)]
    pub dead_letter: DeadLetterConfig,

    /// Default retry strategy parameters
    #[serde(default)]
    pub retry: RetryDefaults,

    /// Default circuit breaker parameters
    #[serde(default)]
    pub breaker: BreakerDefaults,

    /// Error history configuration
    #[serde(default)]
    pub history: HistoryConfig,
}

impl ResilienceConfig {
    /// Load configuration from file and environment.
    ///
    /// The file path comes from `RESILIENCE_CONFIG` (default
    /// `config/resilience.toml`) and is optional; environment variables
    /// use the `RESILIENCE__` prefix with `__` separators, e.g.
    /// `RESILIENCE__DEAD_LETTER__MAX_SIZE=500`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("RESILIENCE_CONFIG")
            .unwrap_or_else(|_| "config/resilience.toml".to_string());

        config::Config::builder()
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(
                config::Environment::with_prefix("RESILIENCE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

/// Background sweeper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundConfig {
    /// Whether the background sweeper runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sweep_interval(),
        }
    }
}

impl BackgroundConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Dead letter queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterConfig {
    /// Maximum queued items before FIFO eviction kicks in
    #[serde(default = "default_dlq_max_size")]
    pub max_size: usize,

    /// Reprocess attempts before an item is marked failed
    #[serde(default = "default_dlq_retry_ceiling")]
    pub retry_ceiling: u32,

    /// Seconds a requeued item waits before it is due for another attempt
    #[serde(default = "default_dlq_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            max_size: default_dlq_max_size(),
            retry_ceiling: default_dlq_retry_ceiling(),
            retry_delay_secs: default_dlq_retry_delay(),
        }
    }
}

impl DeadLetterConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Default retry strategy parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryDefaults {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
            jitter: true,
        }
    }
}

impl RetryDefaults {
    pub fn to_strategy(&self) -> RetryStrategy {
        RetryStrategy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            jitter: self.jitter,
        }
    }
}

/// Default circuit breaker parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerDefaults {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Seconds an open breaker waits before admitting a probe
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_secs: u64,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_calls: u32,

    #[serde(default = "default_volume_threshold")]
    pub volume_threshold: u64,

    #[serde(default = "default_error_rate")]
    pub error_rate_threshold: f64,
}

impl Default for BreakerDefaults {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            recovery_timeout_secs: default_recovery_timeout(),
            max_concurrent_calls: default_max_concurrent(),
            volume_threshold: default_volume_threshold(),
            error_rate_threshold: default_error_rate(),
        }
    }
}

impl BreakerDefaults {
    pub fn to_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            timeout: Duration::from_secs(self.recovery_timeout_secs),
            max_concurrent_calls: self.max_concurrent_calls,
            volume_threshold: self.volume_threshold,
            error_rate_threshold: self.error_rate_threshold,
        }
    }
}

/// Error history settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Hours a recorded error is retained before trimming
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Seconds between metric aggregation passes
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            metrics_interval_secs: default_metrics_interval(),
        }
    }
}

impl HistoryConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours.min(i64::MAX as u64) as i64)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs.max(1))
    }
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_dlq_max_size() -> usize {
    1000
}

fn default_dlq_retry_ceiling() -> u32 {
    5
}

fn default_dlq_retry_delay() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_recovery_timeout() -> u64 {
    60
}

fn default_max_concurrent() -> u32 {
    10
}

fn default_volume_threshold() -> u64 {
    20
}

fn default_error_rate() -> f64 {
    50.0
}

fn default_retention_hours() -> u64 {
    24
}

fn default_metrics_interval() -> u64 {
    60
}
