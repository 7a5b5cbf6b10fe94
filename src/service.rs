//! Service facade tying the resilience components together.
//!
//! `ResilienceService` wires the breaker registry, retry executor, error
//! history, and dead letter queue behind one entry point, publishes
//! lifecycle events, and owns the background sweeper.

use crate::circuit_breaker::{
    BreakerCallMetrics, BreakerConfig, BreakerConfigUpdate, BreakerRegistry, BreakerStatus,
    CircuitBreaker, GuardError, RegistryHealth,
};
use crate::classification::ErrorContext;
use crate::config::ResilienceConfig;
use crate::dead_letter::{DeadLetterItem, DeadLetterQueue, ReprocessHandler, ReprocessReport};
use crate::error::{ResilienceError, Result};
use crate::events::{event, EventPublisher, TracingPublisher};
use crate::history::{ErrorHistory, ErrorMetrics, TrendPoint};
use crate::retry::{RetryError, RetryExecutor, RetryPolicies};
use crate::sweeper::{Sweeper, SweeperHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// What to do about a failure that needs intervention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Return a dead letter to Pending so the next sweep retries it
    Retry,
    /// Trip the named circuit breaker open
    CircuitBreak,
    /// Resolve the dead letter; a fallback already covered it
    Fallback,
    /// Flag the failure for a human to look at
    ManualReview,
    /// Resolve the dead letter without further action
    Ignore,
}

/// Facade over the breaker registry, retries, history, and dead letters
pub struct ResilienceService {
    config: ResilienceConfig,
    registry: Arc<BreakerRegistry>,
    history: Arc<ErrorHistory>,
    dead_letters: Arc<DeadLetterQueue>,
    retries: RetryExecutor,
    publisher: Arc<dyn EventPublisher>,
}

impl ResilienceService {
    pub fn new(config: ResilienceConfig, publisher: Arc<dyn EventPublisher>) -> Self {
        let registry = Arc::new(BreakerRegistry::new(Arc::clone(&publisher)));
        let history = Arc::new(ErrorHistory::new(config.history.retention()));
        let dead_letters = Arc::new(
            DeadLetterQueue::new(config.dead_letter.max_size, config.dead_letter.retry_ceiling)
                .with_retry_delay(config.dead_letter.retry_delay()),
        );

        let mut policies = RetryPolicies::default();
        policies.insert("default", config.retry.to_strategy());
        let retries = RetryExecutor::new(
            policies,
            Arc::clone(&dead_letters),
            Arc::clone(&history),
        );

        info!(
            dead_letter_capacity = config.dead_letter.max_size,
            retention_hours = config.history.retention_hours,
            "Resilience service initialized"
        );

        Self {
            config,
            registry,
            history,
            dead_letters,
            retries,
            publisher,
        }
    }

    /// Default configuration with events routed to tracing
    pub fn with_defaults() -> Self {
        Self::new(ResilienceConfig::default(), Arc::new(TracingPublisher))
    }

    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterQueue> {
        &self.dead_letters
    }

    pub fn history(&self) -> &Arc<ErrorHistory> {
        &self.history
    }

    // ---- circuit breakers ----

    /// Register a breaker using the configured defaults
    pub fn register_breaker(&self, name: impl Into<String>) -> Result<Arc<CircuitBreaker>> {
        Ok(self
            .registry
            .register(name, self.config.breaker.to_config())?)
    }

    /// Register a breaker with explicit parameters
    pub fn register_breaker_with(
        &self,
        name: impl Into<String>,
        config: BreakerConfig,
    ) -> Result<Arc<CircuitBreaker>> {
        Ok(self.registry.register(name, config)?)
    }

    /// Run an operation through the named breaker.
    ///
    /// The call duration and outcome are published as a `call_executed`
    /// event; an operation failure is additionally classified, recorded
    /// in the history, and published as `error.occurred`. Rejections
    /// (open breaker, concurrency cap) are not recorded as errors since
    /// the operation never ran.
    pub async fn execute_guarded<F, Fut, T, E>(
        &self,
        name: &str,
        f: F,
    ) -> std::result::Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let started = Instant::now();
        let result = self.registry.execute(name, f).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.publish(
            event::CALL_EXECUTED,
            json!({
                "breaker": name,
                "success": result.is_ok(),
                "duration_ms": duration_ms,
            }),
        )
        .await;

        if let Err(GuardError::Operation(e)) = &result {
            let context = ErrorContext::new(name, e.to_string());
            self.publish_error(&context).await;
            self.history.record(context);
        }

        result
    }

    /// Force the named breaker open
    pub fn trip_breaker(&self, name: &str, reason: impl Into<String>) -> Result<()> {
        Ok(self.registry.trip(name, reason)?)
    }

    /// Force the named breaker closed
    pub fn reset_breaker(&self, name: &str) -> Result<()> {
        Ok(self.registry.reset(name)?)
    }

    /// Apply a partial configuration update to the named breaker
    pub fn update_breaker(
        &self,
        name: &str,
        update: &BreakerConfigUpdate,
    ) -> Result<BreakerConfig> {
        Ok(self.registry.update(name, update)?)
    }

    pub fn breaker_status(&self, name: &str) -> Result<BreakerStatus> {
        Ok(self.registry.status(name)?)
    }

    pub fn list_breaker_statuses(&self) -> Vec<BreakerStatus> {
        self.registry.statuses()
    }

    pub fn breaker_metrics(&self, name: &str) -> Result<BreakerCallMetrics> {
        Ok(self.registry.call_metrics(name)?)
    }

    pub fn registry_health(&self) -> RegistryHealth {
        self.registry.health()
    }

    // ---- errors ----

    /// Classify and record a failure, returning the enriched context
    pub async fn handle_error(
        &self,
        operation: impl Into<String>,
        message: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> ErrorContext {
        let context = ErrorContext::new(operation, message).with_metadata(metadata);
        self.publish_error(&context).await;
        self.history.record(context.clone());
        context
    }

    /// Mark a recorded error as resolved
    pub fn resolve_error(&self, id: Uuid) -> bool {
        self.history.resolve(id)
    }

    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorContext> {
        self.history.recent(limit)
    }

    pub fn error_metrics(&self, window: chrono::Duration) -> ErrorMetrics {
        self.history.metrics(window)
    }

    pub fn error_trends(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<TrendPoint> {
        self.history.trends(start, end)
    }

    // ---- retries ----

    /// Execute an operation under the named retry strategy.
    ///
    /// Exhausted failures are recorded in the history and enqueued as
    /// dead letters by the executor.
    pub async fn retry_with_strategy<F, Fut, T, E>(
        &self,
        strategy_name: &str,
        operation_name: &str,
        payload: serde_json::Value,
        cancel: &CancellationToken,
        op: F,
    ) -> std::result::Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        self.retries
            .execute(strategy_name, operation_name, payload, cancel, op)
            .await
    }

    // ---- dead letters ----

    /// Park a failed operation for later reprocessing
    pub async fn enqueue_dead_letter(
        &self,
        operation: impl Into<String>,
        payload: serde_json::Value,
        error_message: impl Into<String>,
    ) -> Uuid {
        let operation = operation.into();
        let error_message = error_message.into();
        let context = ErrorContext::new(operation.clone(), error_message.clone());
        self.history.record(context.clone());

        let id = self
            .dead_letters
            .enqueue(operation.clone(), payload, error_message, context);

        self.publish(
            event::DEAD_LETTER_ADDED,
            json!({ "id": id, "operation": operation }),
        )
        .await;

        id
    }

    /// Run one reprocessing pass over pending dead letters
    pub async fn reprocess_dead_letters(
        &self,
        handler: &dyn ReprocessHandler,
        cancel: &CancellationToken,
    ) -> ReprocessReport {
        self.dead_letters.reprocess(handler, cancel).await
    }

    pub fn list_dead_letters(&self, limit: usize) -> Vec<DeadLetterItem> {
        self.dead_letters.list(limit)
    }

    pub fn get_dead_letter(&self, id: Uuid) -> Option<DeadLetterItem> {
        self.dead_letters.get(id)
    }

    // ---- recovery ----

    /// Apply a recovery strategy to a target.
    ///
    /// For `CircuitBreak` the target is a breaker name; for every other
    /// strategy it is a dead letter id.
    pub async fn execute_recovery_strategy(
        &self,
        strategy: RecoveryStrategy,
        target: &str,
    ) -> Result<()> {
        info!(strategy = %strategy, target = %target, "Executing recovery strategy");

        match strategy {
            RecoveryStrategy::Retry => {
                let id = self.dead_letter_id(target)?;
                if !self.dead_letters.mark_pending(id) {
                    return Err(ResilienceError::DeadLetterNotFound(id));
                }
            }
            RecoveryStrategy::CircuitBreak => {
                self.registry.trip(target, "recovery strategy")?;
            }
            RecoveryStrategy::Fallback | RecoveryStrategy::Ignore => {
                let id = self.dead_letter_id(target)?;
                if !self.dead_letters.mark_resolved(id) {
                    return Err(ResilienceError::DeadLetterNotFound(id));
                }
            }
            RecoveryStrategy::ManualReview => {
                self.publish(
                    event::MANUAL_REVIEW_REQUESTED,
                    json!({ "target": target }),
                )
                .await;
            }
        }

        Ok(())
    }

    fn dead_letter_id(&self, target: &str) -> Result<Uuid> {
        target
            .parse()
            .map_err(|_| ResilienceError::InvalidRecoveryTarget(target.to_string()))
    }

    // ---- background ----

    /// Start the background sweeper if enabled; returns its handle.
    ///
    /// With a handler installed each sweep also reprocesses pending dead
    /// letters; without one it only promotes expired breakers and trims
    /// the history.
    pub fn start_sweeper(&self, handler: Option<Arc<dyn ReprocessHandler>>) -> Option<SweeperHandle> {
        if !self.config.background.enabled {
            info!("Background sweeper disabled by configuration");
            return None;
        }

        let mut sweeper = Sweeper::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.dead_letters),
            Arc::clone(&self.history),
            self.config.background.interval(),
        )
        .with_metrics_interval(self.config.history.metrics_interval());
        if let Some(handler) = handler {
            sweeper = sweeper.with_reprocess_handler(handler);
        }

        Some(sweeper.start())
    }

    async fn publish_error(&self, context: &ErrorContext) {
        self.publish(
            event::ERROR_OCCURRED,
            json!({
                "id": context.id,
                "operation": context.operation,
                "code": context.code,
                "severity": context.severity,
                "message": context.message,
            }),
        )
        .await;
    }

    async fn publish(&self, event_type: &str, payload: serde_json::Value) {
        if let Err(e) = self.publisher.publish(event_type, payload).await {
            warn!(event_type = %event_type, error = %e, "Event publish failed");
        }
    }
}
