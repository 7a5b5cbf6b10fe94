//! Event publishing seam.
//!
//! Breaker transitions, classified errors, and dead-letter admissions are
//! announced through an injected [`EventPublisher`]. Publishing is always
//! best-effort: failures are logged and swallowed, never surfaced to the
//! guarded operation's caller.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::info;

/// Event type names emitted by the core
pub mod event {
    pub const BREAKER_OPENED: &str = "circuit_breaker.opened";
    pub const BREAKER_CLOSED: &str = "circuit_breaker.closed";
    pub const BREAKER_HALF_OPEN: &str = "circuit_breaker.half_open";
    pub const BREAKER_MANUAL_TRIP: &str = "circuit_breaker.manual_trip";
    pub const BREAKER_MANUAL_RESET: &str = "circuit_breaker.manual_reset";
    pub const CALL_EXECUTED: &str = "circuit_breaker.call_executed";
    pub const ERROR_OCCURRED: &str = "error.occurred";
    pub const DEAD_LETTER_ADDED: &str = "dead.letter.added";
    pub const MANUAL_REVIEW_REQUESTED: &str = "error.manual_review";
}

/// Error returned by a publisher backend
#[derive(Debug, thiserror::Error)]
#[error("event publish failed: {0}")]
pub struct PublishError(pub String);

/// Capability for announcing structured events to external monitoring
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a structured event payload under the given event type
    async fn publish(&self, event_type: &str, payload: Value) -> Result<(), PublishError>;
}

/// Publisher that emits events as structured log lines.
///
/// The default backend when no external bus is wired in.
#[derive(Debug, Default, Clone)]
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, event_type: &str, payload: Value) -> Result<(), PublishError> {
        info!(event_type = %event_type, payload = %payload, "Event published");
        Ok(())
    }
}

/// In-memory publisher that records every event, for assertions in tests.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<(String, Value)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events published so far
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }

    /// Count events of a given type
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(t, _)| t == event_type)
            .count()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event_type: &str, payload: Value) -> Result<(), PublishError> {
        self.events.lock().push((event_type.to_string(), payload));
        Ok(())
    }
}
