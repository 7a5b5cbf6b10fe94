//! Circuit breaker state machine data.
//!
//! This module holds the per-breaker runtime state and the transition
//! bookkeeping; the admission and outcome logic lives in `core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// The current state of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BreakerState {
    /// Requests are admitted up to the concurrency cap; failures are counted
    Closed,
    /// All requests are rejected until the open timeout elapses
    Open,
    /// A single probe request is admitted to test recovery
    HalfOpen,
}

impl BreakerState {
    /// Numeric value for the Prometheus state gauge
    pub fn to_metric_value(&self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 2.0,
        }
    }

    /// Whether this state can admit requests at all
    pub fn admits_requests(&self) -> bool {
        matches!(self, BreakerState::Closed | BreakerState::HalfOpen)
    }
}

/// A recorded state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: BreakerState,
    pub to: BreakerState,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

impl StateTransition {
    pub fn new(from: BreakerState, to: BreakerState, reason: String) -> Self {
        Self {
            from,
            to,
            timestamp: Utc::now(),
            reason,
        }
    }
}

/// Mutable per-breaker state, guarded by the breaker's own lock
#[derive(Debug, Clone)]
pub struct StateData {
    /// Current state
    pub state: BreakerState,
    /// Consecutive failures since the last success or state entry
    pub failure_count: u32,
    /// Consecutive successes since the last failure or state entry
    pub success_count: u32,
    /// Calls currently in flight
    pub current_calls: u32,
    /// When the last failure was observed
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Earliest time an Open breaker will admit a probe
    pub next_attempt_time: Option<DateTime<Utc>>,
    /// Lifetime admitted calls
    pub total_calls: u64,
    /// Lifetime failed calls
    pub total_failures: u64,
    /// When the state last changed
    pub last_state_change: DateTime<Utc>,
    /// Lifetime number of transitions
    pub transition_count: u64,
}

impl StateData {
    pub fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            success_count: 0,
            current_calls: 0,
            last_failure_time: None,
            next_attempt_time: None,
            total_calls: 0,
            total_failures: 0,
            last_state_change: Utc::now(),
            transition_count: 0,
        }
    }

    /// Transition to a new state, resetting counters where the state entry
    /// demands it. Entering Closed zeroes both streak counters; entering
    /// Open records `next_attempt_time`; leaving Open clears it.
    pub fn transition_to(
        &mut self,
        new_state: BreakerState,
        next_attempt: Option<DateTime<Utc>>,
        reason: impl Into<String>,
    ) -> StateTransition {
        let transition = StateTransition::new(self.state, new_state, reason.into());

        self.state = new_state;
        self.last_state_change = Utc::now();
        self.transition_count += 1;

        match new_state {
            BreakerState::Open => {
                self.next_attempt_time = next_attempt;
            }
            BreakerState::HalfOpen => {
                self.success_count = 0;
                self.failure_count = 0;
            }
            BreakerState::Closed => {
                self.failure_count = 0;
                self.success_count = 0;
                self.next_attempt_time = None;
            }
        }

        transition
    }

    /// Whether the open timeout has elapsed and a probe may be admitted
    pub fn open_timeout_elapsed(&self, now: DateTime<Utc>) -> bool {
        if self.state != BreakerState::Open {
            return false;
        }
        match self.next_attempt_time {
            Some(next) => now > next,
            None => false,
        }
    }
}

impl Default for StateData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_state_metric_values() {
        assert_eq!(BreakerState::Closed.to_metric_value(), 0.0);
        assert_eq!(BreakerState::Open.to_metric_value(), 1.0);
        assert_eq!(BreakerState::HalfOpen.to_metric_value(), 2.0);
    }

    #[test]
    fn test_state_admits_requests() {
        assert!(BreakerState::Closed.admits_requests());
        assert!(!BreakerState::Open.admits_requests());
        assert!(BreakerState::HalfOpen.admits_requests());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(BreakerState::Closed.to_string(), "closed");
        assert_eq!(BreakerState::Open.to_string(), "open");
        assert_eq!(BreakerState::HalfOpen.to_string(), "half_open");
    }

    #[test]
    fn test_transition_to_open_sets_next_attempt() {
        let mut data = StateData::new();
        let next = Utc::now() + Duration::seconds(30);
        let transition =
            data.transition_to(BreakerState::Open, Some(next), "failure threshold exceeded");

        assert_eq!(transition.from, BreakerState::Closed);
        assert_eq!(transition.to, BreakerState::Open);
        assert_eq!(data.state, BreakerState::Open);
        assert_eq!(data.next_attempt_time, Some(next));
        assert_eq!(data.transition_count, 1);
    }

    #[test]
    fn test_transition_to_closed_resets_counters() {
        let mut data = StateData::new();
        data.failure_count = 4;
        data.success_count = 2;
        data.next_attempt_time = Some(Utc::now());

        data.transition_to(BreakerState::Closed, None, "manual reset");
        assert_eq!(data.failure_count, 0);
        assert_eq!(data.success_count, 0);
        assert!(data.next_attempt_time.is_none());
    }

    #[test]
    fn test_open_timeout_elapsed() {
        let mut data = StateData::new();
        let now = Utc::now();
        data.transition_to(BreakerState::Open, Some(now - Duration::seconds(1)), "test");
        assert!(data.open_timeout_elapsed(now));

        data.next_attempt_time = Some(now + Duration::seconds(10));
        assert!(!data.open_timeout_elapsed(now));
    }

    #[test]
    fn test_open_timeout_only_in_open_state() {
        let data = StateData::new();
        assert!(!data.open_timeout_elapsed(Utc::now()));
    }
}
