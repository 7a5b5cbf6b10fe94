//! Circuit breaker configuration with builder pattern.

use crate::circuit_breaker::BreakerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// Consecutive successes in half-open state before closing
    pub success_threshold: u32,

    /// How long an open circuit waits before admitting a probe
    pub timeout: Duration,

    /// Maximum in-flight calls admitted while closed
    pub max_concurrent_calls: u32,

    /// Minimum lifetime call volume before the error-rate check applies
    pub volume_threshold: u64,

    /// Lifetime error rate (percent) that opens the circuit once the
    /// volume threshold is met
    pub error_rate_threshold: f64,
}

impl BreakerConfig {
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), BreakerError> {
        if self.failure_threshold == 0 {
            return Err(BreakerError::InvalidConfig(
                "failure_threshold must be greater than 0".to_string(),
            ));
        }

        if self.success_threshold == 0 {
            return Err(BreakerError::InvalidConfig(
                "success_threshold must be greater than 0".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(BreakerError::InvalidConfig(
                "timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_calls == 0 {
            return Err(BreakerError::InvalidConfig(
                "max_concurrent_calls must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.error_rate_threshold) {
            return Err(BreakerError::InvalidConfig(
                "error_rate_threshold must be between 0 and 100".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            max_concurrent_calls: 10,
            volume_threshold: 20,
            error_rate_threshold: 50.0,
        }
    }
}

/// Partial configuration for administrative updates; unset fields keep
/// their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakerConfigUpdate {
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
    pub timeout: Option<Duration>,
    pub max_concurrent_calls: Option<u32>,
    pub volume_threshold: Option<u64>,
    pub error_rate_threshold: Option<f64>,
}

impl BreakerConfigUpdate {
    /// Apply this update on top of an existing configuration
    pub fn apply(&self, base: &BreakerConfig) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            success_threshold: self.success_threshold.unwrap_or(base.success_threshold),
            timeout: self.timeout.unwrap_or(base.timeout),
            max_concurrent_calls: self
                .max_concurrent_calls
                .unwrap_or(base.max_concurrent_calls),
            volume_threshold: self.volume_threshold.unwrap_or(base.volume_threshold),
            error_rate_threshold: self
                .error_rate_threshold
                .unwrap_or(base.error_rate_threshold),
        }
    }
}

/// Builder for [`BreakerConfig`] with fluent API
#[derive(Debug, Clone, Default)]
pub struct BreakerConfigBuilder {
    failure_threshold: Option<u32>,
    success_threshold: Option<u32>,
    timeout: Option<Duration>,
    max_concurrent_calls: Option<u32>,
    volume_threshold: Option<u64>,
    error_rate_threshold: Option<f64>,
}

impl BreakerConfigBuilder {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = Some(threshold);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_concurrent_calls(mut self, max: u32) -> Self {
        self.max_concurrent_calls = Some(max);
        self
    }

    pub fn volume_threshold(mut self, threshold: u64) -> Self {
        self.volume_threshold = Some(threshold);
        self
    }

    pub fn error_rate_threshold(mut self, threshold: f64) -> Self {
        self.error_rate_threshold = Some(threshold);
        self
    }

    pub fn build(self) -> Result<BreakerConfig, BreakerError> {
        let default = BreakerConfig::default();

        let config = BreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(default.failure_threshold),
            success_threshold: self.success_threshold.unwrap_or(default.success_threshold),
            timeout: self.timeout.unwrap_or(default.timeout),
            max_concurrent_calls: self
                .max_concurrent_calls
                .unwrap_or(default.max_concurrent_calls),
            volume_threshold: self.volume_threshold.unwrap_or(default.volume_threshold),
            error_rate_threshold: self
                .error_rate_threshold
                .unwrap_or(default.error_rate_threshold),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Predefined configurations for common dependency classes
impl BreakerConfig {
    /// Databases: open quickly, recover quickly
    pub fn for_database() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 3,
            timeout: Duration::from_secs(10),
            max_concurrent_calls: 50,
            volume_threshold: 20,
            error_rate_threshold: 50.0,
        }
    }

    /// External HTTP APIs: moderate tolerance
    pub fn for_http_api() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            max_concurrent_calls: 20,
            volume_threshold: 10,
            error_rate_threshold: 50.0,
        }
    }

    /// Blockchain nodes: slow to recover, long open timeout
    pub fn for_blockchain_node() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            timeout: Duration::from_secs(120),
            max_concurrent_calls: 10,
            volume_threshold: 5,
            error_rate_threshold: 40.0,
        }
    }

    /// Message brokers: high tolerance before opening
    pub fn for_message_broker() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            max_concurrent_calls: 30,
            volume_threshold: 15,
            error_rate_threshold: 60.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.max_concurrent_calls, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = BreakerConfig::builder()
            .failure_threshold(3)
            .success_threshold(2)
            .timeout(Duration::from_secs(5))
            .max_concurrent_calls(10)
            .build()
            .unwrap();

        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_with_defaults() {
        let config = BreakerConfig::builder().failure_threshold(7).build().unwrap();
        assert_eq!(config.failure_threshold, 7);
        assert_eq!(config.success_threshold, 2);
    }

    #[test]
    fn test_invalid_zero_failure_threshold() {
        assert!(BreakerConfig::builder().failure_threshold(0).build().is_err());
    }

    #[test]
    fn test_invalid_zero_success_threshold() {
        assert!(BreakerConfig::builder().success_threshold(0).build().is_err());
    }

    #[test]
    fn test_invalid_zero_concurrency() {
        assert!(BreakerConfig::builder().max_concurrent_calls(0).build().is_err());
    }

    #[test]
    fn test_invalid_error_rate() {
        assert!(BreakerConfig::builder().error_rate_threshold(120.0).build().is_err());
    }

    #[test]
    fn test_partial_update() {
        let base = BreakerConfig::default();
        let update = BreakerConfigUpdate {
            failure_threshold: Some(9),
            ..Default::default()
        };

        let updated = update.apply(&base);
        assert_eq!(updated.failure_threshold, 9);
        assert_eq!(updated.success_threshold, base.success_threshold);
        assert_eq!(updated.timeout, base.timeout);
    }

    #[test]
    fn test_predefined_configs() {
        assert!(BreakerConfig::for_database().validate().is_ok());
        assert!(BreakerConfig::for_http_api().validate().is_ok());
        assert!(BreakerConfig::for_blockchain_node().validate().is_ok());
        assert!(BreakerConfig::for_message_broker().validate().is_ok());
    }
}
