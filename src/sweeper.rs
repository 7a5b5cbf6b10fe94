//! Background sweeper.
//!
//! One repeating task that promotes expired open breakers, reprocesses
//! pending dead letters, and trims aged-out history entries. The task
//! owns a cancellation token so shutdown is deterministic: `shutdown()`
//! cancels the token and waits for the current tick to finish.

use crate::circuit_breaker::BreakerRegistry;
use crate::dead_letter::{DeadLetterQueue, ReprocessHandler};
use crate::history::ErrorHistory;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters accumulated across sweep ticks
#[derive(Debug, Default)]
pub struct SweeperStats {
    ticks: AtomicU64,
    breakers_promoted: AtomicU64,
    dead_letters_resolved: AtomicU64,
    history_trimmed: AtomicU64,
    metrics_snapshots: AtomicU64,
}

impl SweeperStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn breakers_promoted(&self) -> u64 {
        self.breakers_promoted.load(Ordering::Relaxed)
    }

    pub fn dead_letters_resolved(&self) -> u64 {
        self.dead_letters_resolved.load(Ordering::Relaxed)
    }

    pub fn history_trimmed(&self) -> u64 {
        self.history_trimmed.load(Ordering::Relaxed)
    }

    pub fn metrics_snapshots(&self) -> u64 {
        self.metrics_snapshots.load(Ordering::Relaxed)
    }
}

/// Handle to a running sweeper task
pub struct SweeperHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
    stats: Arc<SweeperStats>,
}

impl SweeperHandle {
    /// Cancel the sweeper and wait for the in-flight tick to finish
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sweeper task did not shut down cleanly");
        }
        info!("Background sweeper stopped");
    }

    /// Counters for the sweeps run so far; the returned handle stays
    /// valid after shutdown
    pub fn stats(&self) -> Arc<SweeperStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Periodic maintenance over the registry, dead letter queue, and history
pub struct Sweeper {
    registry: Arc<BreakerRegistry>,
    dead_letters: Arc<DeadLetterQueue>,
    history: Arc<ErrorHistory>,
    handler: Option<Arc<dyn ReprocessHandler>>,
    interval: Duration,
    metrics_interval: Option<Duration>,
}

impl Sweeper {
    pub fn new(
        registry: Arc<BreakerRegistry>,
        dead_letters: Arc<DeadLetterQueue>,
        history: Arc<ErrorHistory>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            dead_letters,
            history,
            handler: None,
            interval,
            metrics_interval: None,
        }
    }

    /// Install a handler so each sweep also reprocesses pending dead
    /// letters; without one the sweep only promotes breakers and trims
    /// history.
    pub fn with_reprocess_handler(mut self, handler: Arc<dyn ReprocessHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Emit an aggregated error-metrics snapshot on its own cadence,
    /// independent of the sweep interval
    pub fn with_metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    /// Spawn the repeating task and return its handle
    pub fn start(self) -> SweeperHandle {
        let token = CancellationToken::new();
        let stats = Arc::new(SweeperStats::default());

        let task_token = token.clone();
        let task_stats = Arc::clone(&stats);
        let interval = self.interval;

        info!(interval_secs = interval.as_secs(), "Background sweeper started");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval fires immediately; swallow the first tick so the
            // first sweep happens one period after start
            ticker.tick().await;
            let mut last_metrics = tokio::time::Instant::now();

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep_once(&task_token, &task_stats, &mut last_metrics).await;
                    }
                }
            }
        });

        SweeperHandle { token, task, stats }
    }

    async fn sweep_once(
        &self,
        token: &CancellationToken,
        stats: &SweeperStats,
        last_metrics: &mut tokio::time::Instant,
    ) {
        stats.ticks.fetch_add(1, Ordering::Relaxed);

        let promoted = self.registry.promote_expired();
        if promoted > 0 {
            stats
                .breakers_promoted
                .fetch_add(promoted as u64, Ordering::Relaxed);
        }

        if let Some(handler) = &self.handler {
            let report = self.dead_letters.reprocess(handler.as_ref(), token).await;
            if report.attempted > 0 {
                stats
                    .dead_letters_resolved
                    .fetch_add(report.resolved as u64, Ordering::Relaxed);
                debug!(
                    attempted = report.attempted,
                    resolved = report.resolved,
                    requeued = report.requeued,
                    failed = report.failed_terminal,
                    "Swept dead letter queue"
                );
            }
        }

        let trimmed = self.history.trim();
        if trimmed > 0 {
            stats
                .history_trimmed
                .fetch_add(trimmed as u64, Ordering::Relaxed);
        }

        if let Some(interval) = self.metrics_interval {
            if last_metrics.elapsed() >= interval {
                *last_metrics = tokio::time::Instant::now();
                stats.metrics_snapshots.fetch_add(1, Ordering::Relaxed);

                let window = chrono::Duration::from_std(interval)
                    .unwrap_or_else(|_| chrono::Duration::hours(1));
                let metrics = self.history.metrics(window);
                info!(
                    window_hours = metrics.window_hours,
                    total_errors = metrics.total_errors,
                    errors_per_hour = metrics.errors_per_hour,
                    "Error metrics snapshot"
                );
            }
        }

        debug!(
            promoted,
            pending_dead_letters = self.dead_letters.pending_count(),
            history_entries = self.history.len(),
            "Sweep complete"
        );
    }
}
