//! Retry strategies and the retry executor.
//!
//! A [`RetryStrategy`] is a named, immutable backoff policy. The
//! [`RetryExecutor`] runs a caller-supplied operation under a strategy,
//! sleeping between attempts with exponential backoff (optionally
//! jittered) and observing an external cancellation signal. When the
//! budget is exhausted the final error is classified and handed to the
//! dead letter queue rather than discarded.

use crate::classification::ErrorContext;
use crate::dead_letter::DeadLetterQueue;
use crate::history::ErrorHistory;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// A named, immutable retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryStrategy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt
    pub backoff_factor: f64,
    /// Randomize each delay to avoid synchronized retry storms
    pub jitter: bool,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryStrategy {
    /// Fewer, faster retries for latency-sensitive paths
    pub fn aggressive() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_factor: 1.5,
            jitter: true,
        }
    }

    /// Patient retries for batch or background work
    pub fn conservative() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 3.0,
            jitter: true,
        }
    }

    /// Delay before the retry following `attempt` (0-indexed).
    ///
    /// `initial_delay * backoff_factor^attempt`, capped at `max_delay`,
    /// with up to ±50% jitter when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let raw = (base_ms * self.backoff_factor.powi(attempt as i32)).min(max_ms);

        let ms = if self.jitter {
            raw * rand::thread_rng().gen_range(0.5..1.5)
        } else {
            raw
        };

        Duration::from_millis(ms.max(1.0) as u64)
    }
}

/// Named strategy directory, configured at startup
#[derive(Debug, Clone)]
pub struct RetryPolicies {
    strategies: HashMap<String, RetryStrategy>,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        let mut strategies = HashMap::new();
        strategies.insert("default".to_string(), RetryStrategy::default());
        strategies.insert("aggressive".to_string(), RetryStrategy::aggressive());
        strategies.insert("conservative".to_string(), RetryStrategy::conservative());
        Self { strategies }
    }
}

impl RetryPolicies {
    /// Add or replace a named strategy
    pub fn insert(&mut self, name: impl Into<String>, strategy: RetryStrategy) {
        self.strategies.insert(name.into(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<&RetryStrategy> {
        self.strategies.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }
}

/// Failure of a retried operation.
///
/// Exhaustion and cancellation are distinct from the operation's own error,
/// which exhaustion carries as its source.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// All attempts failed; the final error is attached as the source
    #[error("retry budget exhausted after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The caller's cancellation signal fired
    #[error("operation cancelled during retry")]
    Cancelled,

    /// The named strategy is not configured
    #[error("unknown retry strategy '{0}'")]
    UnknownStrategy(String),
}

/// Executes operations under named retry strategies
pub struct RetryExecutor {
    policies: RetryPolicies,
    dead_letters: Arc<DeadLetterQueue>,
    history: Arc<ErrorHistory>,
}

impl RetryExecutor {
    pub fn new(
        policies: RetryPolicies,
        dead_letters: Arc<DeadLetterQueue>,
        history: Arc<ErrorHistory>,
    ) -> Self {
        Self {
            policies,
            dead_letters,
            history,
        }
    }

    pub fn policies(&self) -> &RetryPolicies {
        &self.policies
    }

    /// Execute `op` under the named strategy.
    ///
    /// Performs the initial attempt plus up to `max_retries` retries. On
    /// exhaustion the final error is classified, recorded in the history,
    /// and enqueued as a dead letter with the supplied payload; the
    /// returned id lets the caller correlate. Cancellation aborts any
    /// pending backoff sleep immediately.
    pub async fn execute<F, Fut, T, E>(
        &self,
        strategy_name: &str,
        operation_name: &str,
        payload: serde_json::Value,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let strategy = self
            .policies
            .get(strategy_name)
            .ok_or_else(|| RetryError::UnknownStrategy(strategy_name.to_string()))?
            .clone();

        let total_attempts = strategy.max_retries + 1;
        let mut last_err: Option<E> = None;

        for attempt in 0..total_attempts {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = %operation_name,
                            attempt = attempt + 1,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        operation = %operation_name,
                        strategy = %strategy_name,
                        attempt = attempt + 1,
                        error = %e,
                        "Attempt failed"
                    );
                    last_err = Some(e);
                }
            }

            // No sleep after the final attempt
            if attempt + 1 < total_attempts {
                let delay = strategy.delay_for_attempt(attempt);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let source = last_err.expect("at least one attempt always runs");
        let id = self.hand_off(operation_name, payload, &source, total_attempts);
        debug!(operation = %operation_name, dead_letter_id = %id, "Retry budget exhausted");

        Err(RetryError::Exhausted {
            attempts: total_attempts,
            source,
        })
    }

    /// Record the exhausted failure and enqueue it as a dead letter
    fn hand_off<E: std::fmt::Display>(
        &self,
        operation_name: &str,
        payload: serde_json::Value,
        error: &E,
        attempts: u32,
    ) -> Uuid {
        let message = error.to_string();
        let context = ErrorContext::new(operation_name, message.clone())
            .with_retry_count(attempts.saturating_sub(1));

        self.history.record(context.clone());
        self.dead_letters
            .enqueue(operation_name, payload, message, context)
    }
}
