// Comprehensive Circuit Breaker Test Suite
// Unit, integration, and scenario coverage for the breaker and registry

use resilience_core::circuit_breaker::{
    BreakerConfig, BreakerConfigUpdate, BreakerError, BreakerRegistry, BreakerState,
    CircuitBreaker, GuardError,
};
use resilience_core::events::MemoryPublisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn publisher() -> Arc<MemoryPublisher> {
    Arc::new(MemoryPublisher::new())
}

fn breaker(name: &str, config: BreakerConfig) -> CircuitBreaker {
    CircuitBreaker::new(name, config, publisher())
}

async fn fail(cb: &CircuitBreaker) {
    let _ = cb
        .call(|| async { Err::<i32, _>(std::io::Error::other("error")) })
        .await;
}

async fn succeed(cb: &CircuitBreaker) {
    let _ = cb.call(|| async { Ok::<i32, std::io::Error>(1) }).await;
}

// ============================================================================
// UNIT TESTS - State Transitions
// ============================================================================

#[tokio::test]
async fn test_circuit_breaker_starts_closed() {
    let cb = breaker("test_starts_closed", BreakerConfig::default());
    assert_eq!(cb.state(), BreakerState::Closed);
}

#[tokio::test]
async fn test_successful_call_stays_closed() {
    let cb = breaker("test_success", BreakerConfig::default());

    let result = cb
        .call(|| async { Ok::<i32, std::io::Error>(42) })
        .await
        .unwrap();

    assert_eq!(result, 42);
    assert_eq!(cb.state(), BreakerState::Closed);

    let status = cb.status();
    assert_eq!(status.success_count, 1);
    assert_eq!(status.failure_count, 0);
    assert_eq!(status.total_calls, 1);
}

#[tokio::test]
async fn test_circuit_opens_after_threshold_failures() {
    let config = BreakerConfig::builder().failure_threshold(3).build().unwrap();
    let cb = breaker("test_opens", config);

    for _ in 0..3 {
        fail(&cb).await;
    }

    assert_eq!(cb.state(), BreakerState::Open);
    let status = cb.status();
    assert_eq!(status.total_failures, 3);
    assert!(status.next_attempt_time.is_some());
}

#[tokio::test]
async fn test_success_resets_failure_streak() {
    let config = BreakerConfig::builder().failure_threshold(3).build().unwrap();
    let cb = breaker("test_streak_reset", config);

    fail(&cb).await;
    fail(&cb).await;
    succeed(&cb).await;
    fail(&cb).await;
    fail(&cb).await;

    // Never three consecutive failures
    assert_eq!(cb.state(), BreakerState::Closed);
}

#[tokio::test]
async fn test_open_circuit_rejects_calls() {
    let config = BreakerConfig::builder().failure_threshold(2).build().unwrap();
    let cb = breaker("test_rejects", config);

    fail(&cb).await;
    fail(&cb).await;
    assert_eq!(cb.state(), BreakerState::Open);

    let result = cb.call(|| async { Ok::<i32, std::io::Error>(1) }).await;
    match result {
        Err(GuardError::Open(name)) => assert_eq!(name, "test_rejects"),
        other => panic!("expected Open rejection, got {:?}", other.map(|_| ())),
    }

    // Rejected calls do not count toward totals
    assert_eq!(cb.status().total_calls, 2);
}

#[tokio::test]
async fn test_open_transitions_to_half_open_after_timeout() {
    let config = BreakerConfig::builder()
        .failure_threshold(1)
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let cb = breaker("test_half_open", config);

    fail(&cb).await;
    assert_eq!(cb.state(), BreakerState::Open);

    sleep(Duration::from_millis(80)).await;

    // Next call is admitted as the probe
    let result = cb.call(|| async { Ok::<i32, std::io::Error>(7) }).await;
    assert_eq!(result.unwrap(), 7);
}

#[tokio::test]
async fn test_half_open_closes_after_success_threshold() {
    let config = BreakerConfig::builder()
        .failure_threshold(1)
        .success_threshold(2)
        .timeout(Duration::from_millis(20))
        .build()
        .unwrap();
    let cb = breaker("test_closes", config);

    fail(&cb).await;
    sleep(Duration::from_millis(40)).await;

    succeed(&cb).await;
    assert_eq!(cb.state(), BreakerState::HalfOpen);
    succeed(&cb).await;
    assert_eq!(cb.state(), BreakerState::Closed);
}

#[tokio::test]
async fn test_half_open_failure_reopens() {
    let config = BreakerConfig::builder()
        .failure_threshold(1)
        .timeout(Duration::from_millis(20))
        .build()
        .unwrap();
    let cb = breaker("test_reopens", config);

    fail(&cb).await;
    sleep(Duration::from_millis(40)).await;
    fail(&cb).await;

    assert_eq!(cb.state(), BreakerState::Open);
}

#[tokio::test]
async fn test_half_open_admits_single_probe() {
    let config = BreakerConfig::builder()
        .failure_threshold(1)
        .success_threshold(2)
        .timeout(Duration::from_millis(20))
        .build()
        .unwrap();
    let cb = Arc::new(breaker("test_single_probe", config));

    fail(&cb).await;
    sleep(Duration::from_millis(40)).await;

    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let probe_cb = Arc::clone(&cb);
    let probe = tokio::spawn(async move {
        probe_cb
            .call(|| async move {
                let _ = started_tx.send(());
                let _ = release_rx.await;
                Ok::<i32, std::io::Error>(1)
            })
            .await
    });

    started_rx.await.unwrap();
    assert_eq!(cb.state(), BreakerState::HalfOpen);

    // Second call while the probe is in flight gets rejected
    let second = cb.call(|| async { Ok::<i32, std::io::Error>(2) }).await;
    assert!(matches!(second, Err(GuardError::Open(_))));

    release_tx.send(()).unwrap();
    assert!(probe.await.unwrap().is_ok());
}

// ============================================================================
// UNIT TESTS - Admission Control
// ============================================================================

#[tokio::test]
async fn test_concurrency_limit_enforced() {
    let config = BreakerConfig::builder().max_concurrent_calls(1).build().unwrap();
    let cb = Arc::new(breaker("test_concurrency", config));

    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let held_cb = Arc::clone(&cb);
    let held = tokio::spawn(async move {
        held_cb
            .call(|| async move {
                let _ = started_tx.send(());
                let _ = release_rx.await;
                Ok::<i32, std::io::Error>(1)
            })
            .await
    });

    started_rx.await.unwrap();
    let overflow = cb.call(|| async { Ok::<i32, std::io::Error>(2) }).await;
    assert!(matches!(
        overflow,
        Err(GuardError::ConcurrencyLimit { limit: 1, .. })
    ));

    release_tx.send(()).unwrap();
    assert!(held.await.unwrap().is_ok());

    // Slot released; next call admitted
    let after = cb.call(|| async { Ok::<i32, std::io::Error>(3) }).await;
    assert!(after.is_ok());
}

#[tokio::test]
async fn test_volume_based_opening() {
    let config = BreakerConfig {
        failure_threshold: 100, // streak alone never trips
        volume_threshold: 10,
        error_rate_threshold: 50.0,
        ..Default::default()
    };
    let cb = breaker("test_volume", config);

    // 5 successes then 6 failures: 11 calls, ~55% error rate
    for _ in 0..5 {
        succeed(&cb).await;
    }
    for _ in 0..6 {
        fail(&cb).await;
    }

    assert_eq!(cb.state(), BreakerState::Open);
}

#[tokio::test]
async fn test_volume_threshold_suppresses_early_opening() {
    let config = BreakerConfig {
        failure_threshold: 100,
        volume_threshold: 20,
        error_rate_threshold: 50.0,
        ..Default::default()
    };
    let cb = breaker("test_low_volume", config);

    // 100% error rate but below the volume threshold
    for _ in 0..5 {
        fail(&cb).await;
    }

    assert_eq!(cb.state(), BreakerState::Closed);
}

// ============================================================================
// UNIT TESTS - Manual Controls & Config
// ============================================================================

#[tokio::test]
async fn test_manual_trip_and_reset() {
    let cb = breaker("test_manual", BreakerConfig::default());

    cb.trip("maintenance window");
    assert_eq!(cb.state(), BreakerState::Open);

    cb.reset();
    assert_eq!(cb.state(), BreakerState::Closed);

    let status = cb.status();
    assert_eq!(status.failure_count, 0);
    assert_eq!(status.success_count, 0);
    assert!(status.next_attempt_time.is_none());
}

#[tokio::test]
async fn test_config_update_validated() {
    let cb = breaker("test_update", BreakerConfig::default());

    let updated = cb
        .update_config(&BreakerConfigUpdate {
            failure_threshold: Some(9),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(updated.failure_threshold, 9);

    let invalid = cb.update_config(&BreakerConfigUpdate {
        failure_threshold: Some(0),
        ..Default::default()
    });
    assert!(invalid.is_err());
    // Rejected update leaves the config untouched
    assert_eq!(cb.config().failure_threshold, 9);
}

#[tokio::test]
async fn test_fallback_covers_rejection() {
    let cb = breaker(
        "test_fallback",
        BreakerConfig::builder().failure_threshold(1).build().unwrap(),
    );
    fail(&cb).await;

    let value = cb
        .call_with_fallback(
            || async { Ok::<i32, std::io::Error>(1) },
            || async { -1 },
        )
        .await
        .unwrap();
    assert_eq!(value, -1);
}

// ============================================================================
// INTEGRATION TESTS - Registry
// ============================================================================

#[tokio::test]
async fn test_registry_register_and_execute() {
    let registry = BreakerRegistry::new(publisher());
    registry.register("db", BreakerConfig::for_database()).unwrap();

    let value = registry
        .execute("db", || async { Ok::<i32, std::io::Error>(5) })
        .await
        .unwrap();
    assert_eq!(value, 5);

    assert!(matches!(
        registry.register("db", BreakerConfig::default()),
        Err(BreakerError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_registry_unknown_breaker() {
    let registry = BreakerRegistry::new(publisher());

    let result = registry
        .execute("ghost", || async { Ok::<i32, std::io::Error>(1) })
        .await;
    assert!(matches!(result, Err(GuardError::NotFound(_))));
    assert!(matches!(registry.status("ghost"), Err(BreakerError::NotFound(_))));
}

#[tokio::test]
async fn test_registry_health_and_counts() {
    let registry = BreakerRegistry::new(publisher());
    registry.register("a", BreakerConfig::default()).unwrap();
    registry.register("b", BreakerConfig::default()).unwrap();
    registry.register("c", BreakerConfig::default()).unwrap();

    registry.trip("b", "test").unwrap();

    let health = registry.health();
    assert_eq!(health.total_breakers, 3);
    assert_eq!(health.open, 1);
    assert_eq!(health.closed, 2);
    assert!(!health.healthy);
    assert!(registry.has_open_circuits());

    registry.reset_all();
    assert!(!registry.has_open_circuits());
    assert!(registry.health().healthy);
}

#[tokio::test]
async fn test_registry_promote_expired() {
    let registry = BreakerRegistry::new(publisher());
    registry
        .register(
            "fast",
            BreakerConfig {
                failure_threshold: 1,
                timeout: Duration::from_millis(30),
                ..Default::default()
            },
        )
        .unwrap();
    registry.register("slow", BreakerConfig::default()).unwrap();

    let _ = registry
        .execute("fast", || async { Err::<(), _>(std::io::Error::other("boom")) })
        .await;
    registry.trip("slow", "test").unwrap();

    sleep(Duration::from_millis(60)).await;

    // Only the expired breaker is promoted
    assert_eq!(registry.promote_expired(), 1);
    assert_eq!(registry.status("fast").unwrap().state, BreakerState::HalfOpen);
    assert_eq!(registry.status("slow").unwrap().state, BreakerState::Open);
}

// ============================================================================
// SCENARIO TESTS - Full Recovery Cycle
// ============================================================================

#[tokio::test]
async fn test_full_open_half_open_closed_cycle() {
    let config = BreakerConfig::builder()
        .failure_threshold(2)
        .success_threshold(2)
        .timeout(Duration::from_millis(30))
        .build()
        .unwrap();
    let cb = breaker("test_cycle", config);

    // Closed -> Open
    fail(&cb).await;
    fail(&cb).await;
    assert_eq!(cb.state(), BreakerState::Open);

    // Open -> HalfOpen -> Open on probe failure
    sleep(Duration::from_millis(50)).await;
    fail(&cb).await;
    assert_eq!(cb.state(), BreakerState::Open);

    // Open -> HalfOpen -> Closed on recovery
    sleep(Duration::from_millis(50)).await;
    succeed(&cb).await;
    succeed(&cb).await;
    assert_eq!(cb.state(), BreakerState::Closed);

    let status = cb.status();
    assert!(status.transition_count >= 5);
}

#[tokio::test]
async fn test_operation_error_passes_through_unchanged() {
    let cb = breaker("test_passthrough", BreakerConfig::default());

    let result = cb
        .call(|| async {
            Err::<i32, _>(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "denied",
            ))
        })
        .await;

    let err = result.unwrap_err().into_operation_error().unwrap();
    assert_eq!(err.kind(), std::io::ErrorKind::PermissionDenied);
    assert_eq!(err.to_string(), "denied");
}

#[tokio::test]
async fn test_call_metrics_error_rate() {
    let config = BreakerConfig::builder().failure_threshold(100).build().unwrap();
    let cb = breaker("test_metrics", config);

    for _ in 0..3 {
        succeed(&cb).await;
    }
    fail(&cb).await;

    let metrics = cb.metrics();
    assert_eq!(metrics.total_calls, 4);
    assert_eq!(metrics.total_failures, 1);
    assert!((metrics.error_rate - 25.0).abs() < 1e-9);
    assert!((metrics.success_rate - 75.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_transitions_publish_events() {
    let publisher = publisher();
    let cb = CircuitBreaker::new(
        "test_events",
        BreakerConfig::builder().failure_threshold(1).build().unwrap(),
        publisher.clone(),
    );

    fail(&cb).await;
    cb.reset();

    // Publishes are spawned; yield so they land
    tokio::task::yield_now().await;
    sleep(Duration::from_millis(10)).await;

    let events: Vec<String> = publisher.events().into_iter().map(|(t, _)| t).collect();
    assert!(events.iter().any(|t| t == "circuit_breaker.opened"));
    assert!(events.iter().any(|t| t == "circuit_breaker.closed"));
}
