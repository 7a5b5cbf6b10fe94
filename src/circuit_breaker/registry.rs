//! Directory of named circuit breakers.
//!
//! The registry is constructed once at startup and passed by reference to
//! every component that needs it; there is no process-wide singleton. The
//! name map lock is held only during registration and lookup, never while a
//! guarded operation executes, so calls to different breakers proceed fully
//! in parallel.

use crate::circuit_breaker::{
    BreakerCallMetrics, BreakerConfig, BreakerConfigUpdate, BreakerError, BreakerState,
    BreakerStatus, CircuitBreaker, GuardError,
};
use crate::events::EventPublisher;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Registry of all circuit breakers in the process
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    publisher: Arc<dyn EventPublisher>,
}

impl BreakerRegistry {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            breakers: DashMap::new(),
            publisher,
        }
    }

    /// Register a new breaker under a unique name.
    ///
    /// Fails with [`BreakerError::AlreadyExists`] when the name is taken.
    pub fn register(
        &self,
        name: impl Into<String>,
        config: BreakerConfig,
    ) -> Result<Arc<CircuitBreaker>, BreakerError> {
        let name = name.into();
        config.validate()?;

        match self.breakers.entry(name.clone()) {
            Entry::Occupied(_) => Err(BreakerError::AlreadyExists(name)),
            Entry::Vacant(entry) => {
                let breaker = Arc::new(CircuitBreaker::new(
                    name.clone(),
                    config,
                    self.publisher.clone(),
                ));
                entry.insert(breaker.clone());
                info!(name = %name, "Registered circuit breaker");
                Ok(breaker)
            }
        }
    }

    /// Look up an existing breaker by name
    pub fn get(&self, name: &str) -> Result<Arc<CircuitBreaker>, BreakerError> {
        self.breakers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BreakerError::NotFound(name.to_string()))
    }

    /// Execute an operation guarded by the named breaker
    pub async fn execute<F, Fut, T, E>(&self, name: &str, f: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self
            .breakers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GuardError::NotFound(name.to_string()))?;

        breaker.call(f).await
    }

    /// Force the named breaker open
    pub fn trip(&self, name: &str, reason: impl Into<String>) -> Result<(), BreakerError> {
        self.get(name)?.trip(reason);
        Ok(())
    }

    /// Force the named breaker closed
    pub fn reset(&self, name: &str) -> Result<(), BreakerError> {
        self.get(name)?.reset();
        Ok(())
    }

    /// Apply a partial configuration update to the named breaker
    pub fn update(
        &self,
        name: &str,
        update: &BreakerConfigUpdate,
    ) -> Result<BreakerConfig, BreakerError> {
        self.get(name)?.update_config(update)
    }

    /// Status snapshot for the named breaker
    pub fn status(&self, name: &str) -> Result<BreakerStatus, BreakerError> {
        Ok(self.get(name)?.status())
    }

    /// Status snapshots for all breakers
    pub fn statuses(&self) -> Vec<BreakerStatus> {
        self.breakers
            .iter()
            .map(|entry| entry.value().status())
            .collect()
    }

    /// Derived call metrics for the named breaker
    pub fn call_metrics(&self, name: &str) -> Result<BreakerCallMetrics, BreakerError> {
        Ok(self.get(name)?.metrics())
    }

    /// All registered breaker names
    pub fn names(&self) -> Vec<String> {
        self.breakers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Reset every breaker to closed
    pub fn reset_all(&self) {
        info!("Resetting all circuit breakers");
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    /// Promote every expired Open breaker to HalfOpen; returns how many
    /// were promoted. Invoked by the background sweeper.
    pub fn promote_expired(&self) -> usize {
        self.breakers
            .iter()
            .filter(|entry| entry.value().try_promote())
            .count()
    }

    /// Count of breakers in each state
    pub fn state_counts(&self) -> StateCount {
        let mut counts = StateCount::default();
        for entry in self.breakers.iter() {
            match entry.value().state() {
                BreakerState::Closed => counts.closed += 1,
                BreakerState::Open => counts.open += 1,
                BreakerState::HalfOpen => counts.half_open += 1,
            }
        }
        counts
    }

    /// Whether any breaker is currently open
    pub fn has_open_circuits(&self) -> bool {
        self.breakers
            .iter()
            .any(|entry| entry.value().state() == BreakerState::Open)
    }

    /// Health snapshot across all breakers
    pub fn health(&self) -> RegistryHealth {
        let counts = self.state_counts();
        RegistryHealth {
            total_breakers: counts.total(),
            closed: counts.closed,
            open: counts.open,
            half_open: counts.half_open,
            healthy: counts.open == 0,
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

/// Count of breakers in each state
#[derive(Debug, Clone, Default)]
pub struct StateCount {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
}

impl StateCount {
    pub fn total(&self) -> usize {
        self.closed + self.open + self.half_open
    }
}

/// Health information for the breaker registry
#[derive(Debug, Clone, Serialize)]
pub struct RegistryHealth {
    pub total_breakers: usize,
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
    pub healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TracingPublisher;
    use std::io;
    use std::time::Duration;

    fn registry() -> BreakerRegistry {
        BreakerRegistry::new(Arc::new(TracingPublisher))
    }

    #[test]
    fn test_registry_new() {
        let registry = registry();
        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_and_get() {
        let registry = registry();
        let breaker = registry.register("db", BreakerConfig::default()).unwrap();
        assert_eq!(breaker.name(), "db");
        assert_eq!(registry.len(), 1);

        let fetched = registry.get("db").unwrap();
        assert!(Arc::ptr_eq(&breaker, &fetched));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = registry();
        registry.register("db", BreakerConfig::default()).unwrap();

        let err = registry.register("db", BreakerConfig::default()).unwrap_err();
        assert!(matches!(err, BreakerError::AlreadyExists(name) if name == "db"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let registry = registry();
        assert!(matches!(
            registry.get("nope"),
            Err(BreakerError::NotFound(_))
        ));
    }

    #[test]
    fn test_register_rejects_invalid_config() {
        let registry = registry();
        let config = BreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(
            registry.register("bad", config),
            Err(BreakerError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_guarded() {
        let registry = registry();
        registry.register("api", BreakerConfig::default()).unwrap();

        let result = registry
            .execute("api", || async { Ok::<i32, io::Error>(7) })
            .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_execute_unknown_breaker() {
        let registry = registry();
        let result = registry
            .execute("ghost", || async { Ok::<i32, io::Error>(7) })
            .await;
        assert!(matches!(result, Err(GuardError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_trip_and_reset() {
        let registry = registry();
        registry.register("svc", BreakerConfig::default()).unwrap();

        registry.trip("svc", "maintenance").unwrap();
        assert_eq!(registry.get("svc").unwrap().state(), BreakerState::Open);

        registry.reset("svc").unwrap();
        assert_eq!(registry.get("svc").unwrap().state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_state_counts_and_health() {
        let registry = registry();
        registry.register("a", BreakerConfig::default()).unwrap();
        registry.register("b", BreakerConfig::default()).unwrap();
        registry.register("c", BreakerConfig::default()).unwrap();

        registry.trip("b", "test").unwrap();

        let counts = registry.state_counts();
        assert_eq!(counts.closed, 2);
        assert_eq!(counts.open, 1);
        assert_eq!(counts.total(), 3);

        assert!(registry.has_open_circuits());
        let health = registry.health();
        assert!(!health.healthy);
        assert_eq!(health.open, 1);

        registry.reset_all();
        assert!(!registry.has_open_circuits());
        assert!(registry.health().healthy);
    }

    #[tokio::test]
    async fn test_promote_expired() {
        let registry = registry();
        let config = BreakerConfig::builder()
            .failure_threshold(1)
            .timeout(Duration::from_millis(30))
            .build()
            .unwrap();
        registry.register("slow", config).unwrap();

        let _ = registry
            .execute("slow", || async { Err::<i32, io::Error>(io::Error::other("down")) })
            .await;
        assert_eq!(registry.get("slow").unwrap().state(), BreakerState::Open);

        assert_eq!(registry.promote_expired(), 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.promote_expired(), 1);
        assert_eq!(registry.get("slow").unwrap().state(), BreakerState::HalfOpen);
    }

    #[tokio::test]
    async fn test_update() {
        let registry = registry();
        registry.register("svc", BreakerConfig::default()).unwrap();

        let updated = registry
            .update(
                "svc",
                &BreakerConfigUpdate {
                    timeout: Some(Duration::from_secs(5)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.timeout, Duration::from_secs(5));
    }
}
