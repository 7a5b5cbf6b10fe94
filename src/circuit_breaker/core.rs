//! Core circuit breaker implementation.
//!
//! One `CircuitBreaker` guards one logical operation. All counter updates
//! and state transitions for a breaker happen under that breaker's own
//! lock, so concurrent callers never corrupt its counters while calls to
//! other breakers proceed in parallel. The Open to HalfOpen check runs
//! inside the same critical section as admission, so exactly one probe is
//! admitted per half-open episode.

use crate::circuit_breaker::{
    metrics::RESILIENCE_METRICS, BreakerConfig, BreakerConfigUpdate, BreakerError, BreakerState,
    GuardError, StateData, StateTransition,
};
use crate::events::{event, EventPublisher};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A thread-safe circuit breaker guarding one named operation
pub struct CircuitBreaker {
    /// Unique name for this circuit breaker
    name: String,
    /// Configuration; mutable via administrative updates
    config: RwLock<BreakerConfig>,
    /// Runtime state, guarded by this breaker's own lock
    state: Mutex<StateData>,
    /// Best-effort transition announcements
    publisher: Arc<dyn EventPublisher>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state.lock().state)
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        config: BreakerConfig,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let name = name.into();
        info!(name = %name, config = ?config, "Creating circuit breaker");

        Self {
            name,
            config: RwLock::new(config),
            state: Mutex::new(StateData::new()),
            publisher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.state.lock().state
    }

    pub fn config(&self) -> BreakerConfig {
        self.config.read().clone()
    }

    /// Apply a partial configuration update
    pub fn update_config(&self, update: &BreakerConfigUpdate) -> Result<BreakerConfig, BreakerError> {
        let mut config = self.config.write();
        let updated = update.apply(&config);
        updated.validate()?;
        *config = updated.clone();
        info!(name = %self.name, config = ?updated, "Circuit breaker configuration updated");
        Ok(updated)
    }

    /// Execute an async operation protected by this breaker.
    ///
    /// The operation's own error is returned unchanged inside
    /// [`GuardError::Operation`]; rejections are distinct variants so the
    /// caller can tell "your operation failed" apart from "we refused to
    /// even try".
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_acquire()?;

        RESILIENCE_METRICS
            .calls_total
            .with_label_values(&[&self.name])
            .inc();

        // Release the in-flight slot even if the caller drops us mid-await
        let mut in_flight = InFlightGuard {
            breaker: self,
            armed: true,
        };

        let start = std::time::Instant::now();
        let result = f().await;
        let duration = start.elapsed();

        RESILIENCE_METRICS
            .call_duration
            .with_label_values(&[&self.name])
            .observe(duration.as_secs_f64());

        in_flight.armed = false;

        match result {
            Ok(value) => {
                self.on_success();
                RESILIENCE_METRICS
                    .successful_calls
                    .with_label_values(&[&self.name])
                    .inc();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                RESILIENCE_METRICS
                    .failed_calls
                    .with_label_values(&[&self.name])
                    .inc();
                Err(GuardError::Operation(err))
            }
        }
    }

    /// Execute with a fallback used when this breaker rejects the call
    pub async fn call_with_fallback<F, Fut, FB, FbFut, T, E>(
        &self,
        f: F,
        fallback: FB,
    ) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = T>,
    {
        match self.call(f).await {
            Ok(value) => Ok(value),
            Err(GuardError::Open(_)) | Err(GuardError::ConcurrencyLimit { .. }) => {
                debug!(name = %self.name, "Circuit breaker rejected call, using fallback");
                Ok(fallback().await)
            }
            Err(err) => Err(err),
        }
    }

    /// Admission check. Runs the Open to HalfOpen promotion and the
    /// concurrency check atomically under the breaker lock.
    fn try_acquire<E>(&self) -> Result<(), GuardError<E>> {
        let config = self.config.read().clone();
        let mut state = self.state.lock();
        let now = Utc::now();

        if state.open_timeout_elapsed(now) {
            let transition = state.transition_to(
                BreakerState::HalfOpen,
                None,
                "open timeout elapsed, admitting probe",
            );
            self.report_transition(&transition);
        }

        match state.state {
            BreakerState::Closed => {
                if state.current_calls >= config.max_concurrent_calls {
                    RESILIENCE_METRICS
                        .rejected_calls
                        .with_label_values(&[&self.name, "concurrency"])
                        .inc();
                    return Err(GuardError::ConcurrencyLimit {
                        name: self.name.clone(),
                        limit: config.max_concurrent_calls,
                    });
                }
                state.current_calls += 1;
                state.total_calls += 1;
                Ok(())
            }
            BreakerState::Open => {
                RESILIENCE_METRICS
                    .rejected_calls
                    .with_label_values(&[&self.name, "open"])
                    .inc();
                Err(GuardError::Open(self.name.clone()))
            }
            BreakerState::HalfOpen => {
                // Only a single probe call may be in flight
                if state.current_calls > 0 {
                    RESILIENCE_METRICS
                        .rejected_calls
                        .with_label_values(&[&self.name, "open"])
                        .inc();
                    return Err(GuardError::Open(self.name.clone()));
                }
                state.current_calls += 1;
                state.total_calls += 1;
                Ok(())
            }
        }
    }

    fn on_success(&self) {
        let config = self.config.read().clone();
        let mut state = self.state.lock();

        state.current_calls = state.current_calls.saturating_sub(1);
        state.failure_count = 0;
        state.success_count += 1;

        debug!(
            name = %self.name,
            state = %state.state,
            success_count = state.success_count,
            "Guarded operation succeeded"
        );

        if state.state == BreakerState::HalfOpen
            && state.success_count >= config.success_threshold
        {
            let reason = format!(
                "recovery confirmed ({} consecutive successes)",
                state.success_count
            );
            let transition = state.transition_to(BreakerState::Closed, None, reason);
            self.report_transition(&transition);
        }
    }

    fn on_failure(&self) {
        let config = self.config.read().clone();
        let mut state = self.state.lock();
        let now = Utc::now();

        state.current_calls = state.current_calls.saturating_sub(1);
        state.total_failures += 1;
        state.failure_count += 1;
        state.success_count = 0;
        state.last_failure_time = Some(now);

        warn!(
            name = %self.name,
            state = %state.state,
            failure_count = state.failure_count,
            "Guarded operation failed"
        );

        match state.state {
            BreakerState::Closed => {
                let error_rate = if state.total_calls > 0 {
                    state.total_failures as f64 / state.total_calls as f64 * 100.0
                } else {
                    0.0
                };

                let threshold_hit = state.failure_count >= config.failure_threshold;
                let rate_hit = state.total_calls >= config.volume_threshold
                    && error_rate >= config.error_rate_threshold;

                if threshold_hit || rate_hit {
                    let reason = if threshold_hit {
                        format!(
                            "failure threshold exceeded ({} consecutive failures)",
                            state.failure_count
                        )
                    } else {
                        format!("error rate {:.1}% over threshold", error_rate)
                    };
                    let next = now + chrono_duration(config.timeout);
                    let transition = state.transition_to(BreakerState::Open, Some(next), reason);
                    self.report_transition(&transition);
                }
            }
            BreakerState::HalfOpen => {
                // Any failure while probing reopens the circuit
                let next = now + chrono_duration(config.timeout);
                let transition =
                    state.transition_to(BreakerState::Open, Some(next), "recovery probe failed");
                self.report_transition(&transition);
            }
            BreakerState::Open => {}
        }
    }

    /// Force this breaker open, bypassing threshold checks
    pub fn trip(&self, reason: impl Into<String>) {
        let config = self.config.read().clone();
        let mut state = self.state.lock();
        let reason = reason.into();

        let next = Utc::now() + chrono_duration(config.timeout);
        if state.state != BreakerState::Open {
            let transition = state.transition_to(
                BreakerState::Open,
                Some(next),
                format!("manual trip: {}", reason),
            );
            self.report_transition(&transition);
        } else {
            state.next_attempt_time = Some(next);
        }

        self.publish_event(
            event::BREAKER_MANUAL_TRIP,
            json!({ "name": self.name, "reason": reason }),
        );
    }

    /// Force this breaker closed and zero its streak counters
    pub fn reset(&self) {
        let mut state = self.state.lock();

        if state.state != BreakerState::Closed {
            let transition = state.transition_to(BreakerState::Closed, None, "manual reset");
            self.report_transition(&transition);
        } else {
            state.failure_count = 0;
            state.success_count = 0;
        }

        self.publish_event(event::BREAKER_MANUAL_RESET, json!({ "name": self.name }));
    }

    /// Promote an expired Open breaker to HalfOpen without admitting a call.
    /// Used by the background sweeper; returns true when a promotion happened.
    pub fn try_promote(&self) -> bool {
        let mut state = self.state.lock();
        if state.open_timeout_elapsed(Utc::now()) {
            let transition = state.transition_to(
                BreakerState::HalfOpen,
                None,
                "open timeout elapsed (sweeper)",
            );
            self.report_transition(&transition);
            true
        } else {
            false
        }
    }

    /// Current status snapshot
    pub fn status(&self) -> BreakerStatus {
        let state = self.state.lock();
        BreakerStatus {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            current_calls: state.current_calls,
            last_failure_time: state.last_failure_time,
            next_attempt_time: state.next_attempt_time,
            total_calls: state.total_calls,
            total_failures: state.total_failures,
            last_state_change: state.last_state_change,
            transition_count: state.transition_count,
        }
    }

    /// Derived call metrics for this breaker
    pub fn metrics(&self) -> BreakerCallMetrics {
        let state = self.state.lock();
        let (error_rate, success_rate) = if state.total_calls > 0 {
            let failures = state.total_failures as f64;
            let total = state.total_calls as f64;
            (
                failures / total * 100.0,
                (total - failures) / total * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        BreakerCallMetrics {
            name: self.name.clone(),
            state: state.state,
            total_calls: state.total_calls,
            total_failures: state.total_failures,
            error_rate,
            success_rate,
        }
    }

    fn report_transition(&self, transition: &StateTransition) {
        info!(
            name = %self.name,
            from = %transition.from,
            to = %transition.to,
            reason = %transition.reason,
            "Circuit breaker state transition"
        );

        RESILIENCE_METRICS
            .state
            .with_label_values(&[&self.name])
            .set(transition.to.to_metric_value());
        RESILIENCE_METRICS
            .state_transitions
            .with_label_values(&[
                &self.name,
                &transition.from.to_string(),
                &transition.to.to_string(),
            ])
            .inc();

        let event_type = match transition.to {
            BreakerState::Open => event::BREAKER_OPENED,
            BreakerState::Closed => event::BREAKER_CLOSED,
            BreakerState::HalfOpen => event::BREAKER_HALF_OPEN,
        };
        self.publish_event(
            event_type,
            json!({
                "name": self.name,
                "from": transition.from,
                "to": transition.to,
                "reason": transition.reason,
                "timestamp": transition.timestamp,
            }),
        );
    }

    /// Best-effort publish; outside a runtime the event is only logged
    fn publish_event(&self, event_type: &'static str, payload: serde_json::Value) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(event_type, payload = %payload, "No runtime, event logged only");
            return;
        };
        let publisher = self.publisher.clone();
        handle.spawn(async move {
            if let Err(e) = publisher.publish(event_type, payload).await {
                warn!(event_type, error = %e, "Event publish failed");
            }
        });
    }
}

/// Releases the in-flight slot when a guarded call is dropped before
/// completing
struct InFlightGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.breaker.state.lock();
            state.current_calls = state.current_calls.saturating_sub(1);
        }
    }
}

/// Status snapshot of a circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub success_count: u32,
    pub current_calls: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
    pub total_calls: u64,
    pub total_failures: u64,
    pub last_state_change: DateTime<Utc>,
    pub transition_count: u64,
}

/// Derived per-breaker call metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerCallMetrics {
    pub name: String,
    pub state: BreakerState,
    pub total_calls: u64,
    pub total_failures: u64,
    pub error_rate: f64,
    pub success_rate: f64,
}

fn chrono_duration(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365_000))
}
