//! Prometheus metrics for the resilience core.

use lazy_static::lazy_static;
use prometheus::{CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};

const NAMESPACE: &str = "resilience_core";

/// Container for all resilience metrics
pub struct ResilienceMetrics {
    /// Current state of circuit breakers (0=closed, 1=open, 2=half-open)
    pub state: GaugeVec,

    /// Total calls admitted through circuit breakers
    pub calls_total: CounterVec,

    /// Total successful calls
    pub successful_calls: CounterVec,

    /// Total failed calls
    pub failed_calls: CounterVec,

    /// Total rejected calls (circuit open or concurrency limit)
    pub rejected_calls: CounterVec,

    /// Duration of guarded calls
    pub call_duration: HistogramVec,

    /// State transition events
    pub state_transitions: CounterVec,

    /// Classified errors recorded into the history
    pub errors_recorded: CounterVec,

    /// Current depth of the dead letter queue
    pub dead_letter_depth: Gauge,

    /// Dead letter items enqueued
    pub dead_letters_total: CounterVec,
}

impl ResilienceMetrics {
    fn new() -> Self {
        Self {
            state: GaugeVec::new(
                Opts::new("circuit_breaker_state", "Current state of circuit breakers")
                    .namespace(NAMESPACE),
                &["name"],
            )
            .expect("Failed to create circuit_breaker_state metric"),

            calls_total: CounterVec::new(
                Opts::new(
                    "circuit_breaker_calls_total",
                    "Total calls admitted through circuit breakers",
                )
                .namespace(NAMESPACE),
                &["name"],
            )
            .expect("Failed to create circuit_breaker_calls_total metric"),

            successful_calls: CounterVec::new(
                Opts::new(
                    "circuit_breaker_successful_calls_total",
                    "Total successful calls",
                )
                .namespace(NAMESPACE),
                &["name"],
            )
            .expect("Failed to create circuit_breaker_successful_calls_total metric"),

            failed_calls: CounterVec::new(
                Opts::new("circuit_breaker_failed_calls_total", "Total failed calls")
                    .namespace(NAMESPACE),
                &["name"],
            )
            .expect("Failed to create circuit_breaker_failed_calls_total metric"),

            rejected_calls: CounterVec::new(
                Opts::new(
                    "circuit_breaker_rejected_calls_total",
                    "Total rejected calls (circuit open or concurrency limit)",
                )
                .namespace(NAMESPACE),
                &["name", "reason"],
            )
            .expect("Failed to create circuit_breaker_rejected_calls_total metric"),

            call_duration: HistogramVec::new(
                HistogramOpts::new(
                    "circuit_breaker_call_duration_seconds",
                    "Duration of guarded calls",
                )
                .namespace(NAMESPACE),
                &["name"],
            )
            .expect("Failed to create circuit_breaker_call_duration_seconds metric"),

            state_transitions: CounterVec::new(
                Opts::new(
                    "circuit_breaker_state_transitions_total",
                    "Circuit breaker state transition events",
                )
                .namespace(NAMESPACE),
                &["name", "from", "to"],
            )
            .expect("Failed to create circuit_breaker_state_transitions_total metric"),

            errors_recorded: CounterVec::new(
                Opts::new(
                    "errors_recorded_total",
                    "Classified errors recorded into the history",
                )
                .namespace(NAMESPACE),
                &["code", "severity"],
            )
            .expect("Failed to create errors_recorded_total metric"),

            dead_letter_depth: Gauge::with_opts(
                Opts::new("dead_letter_queue_depth", "Current depth of the dead letter queue")
                    .namespace(NAMESPACE),
            )
            .expect("Failed to create dead_letter_queue_depth metric"),

            dead_letters_total: CounterVec::new(
                Opts::new("dead_letters_total", "Dead letter items enqueued")
                    .namespace(NAMESPACE),
                &["operation"],
            )
            .expect("Failed to create dead_letters_total metric"),
        }
    }

    /// Register all metrics with the given Prometheus registry
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.state.clone()))?;
        registry.register(Box::new(self.calls_total.clone()))?;
        registry.register(Box::new(self.successful_calls.clone()))?;
        registry.register(Box::new(self.failed_calls.clone()))?;
        registry.register(Box::new(self.rejected_calls.clone()))?;
        registry.register(Box::new(self.call_duration.clone()))?;
        registry.register(Box::new(self.state_transitions.clone()))?;
        registry.register(Box::new(self.errors_recorded.clone()))?;
        registry.register(Box::new(self.dead_letter_depth.clone()))?;
        registry.register(Box::new(self.dead_letters_total.clone()))?;
        Ok(())
    }
}

lazy_static! {
    /// Global metric container; register into a scrape registry via
    /// [`init_metrics`]
    pub static ref RESILIENCE_METRICS: ResilienceMetrics = ResilienceMetrics::new();
}

/// Register the resilience metrics with a Prometheus registry
pub fn init_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    RESILIENCE_METRICS.register(registry)
}
