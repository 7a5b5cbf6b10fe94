//! Resilience control layer for downstream calls.
//!
//! Circuit breakers guard unstable dependencies, a retry executor adds
//! bounded backoff, failures are classified and recorded for analysis,
//! and operations that exhaust their retry budget land in a bounded dead
//! letter queue for later reprocessing. A background sweeper keeps the
//! whole thing moving: it promotes expired open breakers, reprocesses
//! pending dead letters, and trims aged-out history.
//!
//! Most callers go through [`service::ResilienceService`]; the
//! individual components are public for direct use.
//!
//! ```no_run
//! use resilience_core::service::ResilienceService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ResilienceService::with_defaults();
//!     service.register_breaker("payments-api")?;
//!
//!     let value = service
//!         .execute_guarded("payments-api", || async {
//!             Ok::<_, std::io::Error>(42)
//!         })
//!         .await?;
//!     assert_eq!(value, 42);
//!     Ok(())
//! }
//! ```

pub mod circuit_breaker;
pub mod classification;
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod events;
pub mod history;
pub mod retry;
pub mod service;
pub mod sweeper;

pub use circuit_breaker::{
    BreakerConfig, BreakerError, BreakerRegistry, BreakerState, BreakerStatus, CircuitBreaker,
    GuardError,
};
pub use classification::{classify, severity_of, ErrorCode, ErrorContext, ErrorSeverity};
pub use config::ResilienceConfig;
pub use dead_letter::{DeadLetterItem, DeadLetterQueue, DeadLetterStatus, ReprocessHandler};
pub use error::{ResilienceError, Result};
pub use events::{EventPublisher, PublishError, TracingPublisher};
pub use history::{ErrorHistory, ErrorMetrics};
pub use retry::{RetryError, RetryExecutor, RetryStrategy};
pub use service::{RecoveryStrategy, ResilienceService};
pub use sweeper::{Sweeper, SweeperHandle};
