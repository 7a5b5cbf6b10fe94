//! Circuit breaker state machine and registry.
//!
//! Each breaker guards one logical downstream operation with the classic
//! Closed / Open / HalfOpen cycle:
//!
//! - **Closed**: calls admitted up to the concurrency cap; failures counted
//! - **Open**: fast-fail, every call rejected until the timeout elapses
//! - **HalfOpen**: a single probe call at a time tests recovery
//!
//! # Example
//!
//! ```no_run
//! use resilience_core::circuit_breaker::{BreakerConfig, BreakerRegistry};
//! use resilience_core::events::TracingPublisher;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = BreakerRegistry::new(Arc::new(TracingPublisher));
//!     registry.register("payments-db", BreakerConfig::for_database())?;
//!
//!     let result = registry
//!         .execute("payments-db", || async {
//!             // your downstream call here
//!             Ok::<_, std::io::Error>(42)
//!         })
//!         .await?;
//!
//!     assert_eq!(result, 42);
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod metrics;
mod registry;
mod state;

pub use config::{BreakerConfig, BreakerConfigBuilder, BreakerConfigUpdate};
pub use core::{BreakerCallMetrics, BreakerStatus, CircuitBreaker};
pub use metrics::{init_metrics, ResilienceMetrics, RESILIENCE_METRICS};
pub use registry::{BreakerRegistry, RegistryHealth, StateCount};
pub use state::{BreakerState, StateData, StateTransition};

/// Administrative errors for breaker configuration and lookup
#[derive(Debug, Clone, thiserror::Error)]
pub enum BreakerError {
    /// A breaker with this name is already registered
    #[error("circuit breaker '{0}' already exists")]
    AlreadyExists(String),

    /// No breaker registered under this name
    #[error("circuit breaker '{0}' not found")]
    NotFound(String),

    /// Configuration failed validation
    #[error("invalid circuit breaker configuration: {0}")]
    InvalidConfig(String),
}

/// Outcome of a guarded call.
///
/// The wrapped operation's own error is carried unchanged in `Operation`;
/// the other variants are rejections where the operation never ran.
#[derive(Debug, thiserror::Error)]
pub enum GuardError<E> {
    /// The breaker is open; the operation was not invoked
    #[error("circuit breaker '{0}' is open")]
    Open(String),

    /// The closed-state concurrency cap was reached
    #[error("circuit breaker '{name}' concurrency limit reached ({limit})")]
    ConcurrencyLimit { name: String, limit: u32 },

    /// No breaker registered under this name
    #[error("circuit breaker '{0}' not found")]
    NotFound(String),

    /// The guarded operation itself failed
    #[error(transparent)]
    Operation(E),
}

impl<E> GuardError<E> {
    /// Whether the guarded operation was ever invoked
    pub fn operation_ran(&self) -> bool {
        matches!(self, GuardError::Operation(_))
    }

    /// The wrapped operation error, if the operation ran and failed
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            GuardError::Operation(e) => Some(e),
            _ => None,
        }
    }
}
