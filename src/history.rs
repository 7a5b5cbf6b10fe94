//! Error history and aggregated error metrics.
//!
//! An append-only, time-ordered log of classified failures, trimmed
//! periodically by retention age so memory stays bounded.

use crate::circuit_breaker::RESILIENCE_METRICS;
use crate::classification::{ErrorCode, ErrorContext, ErrorSeverity};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Aggregated error metrics over a window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    /// Window length in hours
    pub window_hours: f64,
    /// Total errors in the window
    pub total_errors: u64,
    /// Errors grouped by classified code
    pub by_code: HashMap<ErrorCode, u64>,
    /// Errors grouped by severity
    pub by_severity: HashMap<ErrorSeverity, u64>,
    /// Errors grouped by operation name
    pub by_operation: HashMap<String, u64>,
    /// Errors per hour over the window
    pub errors_per_hour: f64,
}

/// One daily bucket of a trend report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub count: u64,
}

/// In-memory, time-ordered record of classified failures
pub struct ErrorHistory {
    entries: Mutex<Vec<ErrorContext>>,
    retention: Duration,
}

impl ErrorHistory {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            retention,
        }
    }

    /// Append a classified failure to the log
    pub fn record(&self, ctx: ErrorContext) {
        RESILIENCE_METRICS
            .errors_recorded
            .with_label_values(&[&ctx.code.to_string(), &ctx.severity.to_string()])
            .inc();

        debug!(
            id = %ctx.id,
            operation = %ctx.operation,
            code = %ctx.code,
            severity = %ctx.severity,
            "Recorded error"
        );

        self.entries.lock().push(ctx);
    }

    /// Mark a recorded failure as resolved; returns false when unknown
    pub fn resolve(&self, id: Uuid) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.resolve();
                true
            }
            None => false,
        }
    }

    /// Look up a recorded failure by id
    pub fn get(&self, id: Uuid) -> Option<ErrorContext> {
        self.entries.lock().iter().find(|e| e.id == id).cloned()
    }

    /// The most recent entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<ErrorContext> {
        let entries = self.entries.lock();
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// Aggregate metrics over the trailing window
    pub fn metrics(&self, window: Duration) -> ErrorMetrics {
        let cutoff = Utc::now() - window;
        let entries = self.entries.lock();

        let mut by_code: HashMap<ErrorCode, u64> = HashMap::new();
        let mut by_severity: HashMap<ErrorSeverity, u64> = HashMap::new();
        let mut by_operation: HashMap<String, u64> = HashMap::new();
        let mut total = 0u64;

        for entry in entries.iter().filter(|e| e.timestamp >= cutoff) {
            total += 1;
            *by_code.entry(entry.code).or_default() += 1;
            *by_severity.entry(entry.severity).or_default() += 1;
            *by_operation.entry(entry.operation.clone()).or_default() += 1;
        }

        let window_hours = window.num_milliseconds() as f64 / 3_600_000.0;
        let errors_per_hour = if window_hours > 0.0 {
            total as f64 / window_hours
        } else {
            0.0
        };

        ErrorMetrics {
            window_hours,
            total_errors: total,
            by_code,
            by_severity,
            by_operation,
            errors_per_hour,
        }
    }

    /// Daily error counts between `start` and `end` inclusive
    pub fn trends(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<TrendPoint> {
        let entries = self.entries.lock();
        let mut buckets: HashMap<NaiveDate, u64> = HashMap::new();

        for entry in entries
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
        {
            *buckets.entry(entry.timestamp.date_naive()).or_default() += 1;
        }

        let mut points: Vec<TrendPoint> = buckets
            .into_iter()
            .map(|(date, count)| TrendPoint { date, count })
            .collect();
        points.sort_by_key(|p| p.date);
        points
    }

    /// Drop entries older than the retention duration; returns how many
    /// were evicted
    pub fn trim(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        let evicted = before - entries.len();

        if evicted > 0 {
            debug!(evicted, remaining = entries.len(), "Trimmed error history");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> ErrorHistory {
        ErrorHistory::new(Duration::hours(24))
    }

    #[test]
    fn test_record_and_len() {
        let h = history();
        assert!(h.is_empty());

        h.record(ErrorContext::new("op-a", "timeout while calling api"));
        h.record(ErrorContext::new("op-b", "database is locked"));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn test_resolve() {
        let h = history();
        let ctx = ErrorContext::new("op", "boom");
        let id = ctx.id;
        h.record(ctx);

        assert!(h.resolve(id));
        let resolved = h.get(id).unwrap();
        assert!(resolved.resolved);
        assert!(resolved.resolved_at.is_some());

        assert!(!h.resolve(Uuid::new_v4()));
    }

    #[test]
    fn test_metrics_aggregation() {
        let h = history();
        h.record(ErrorContext::new("op-a", "connection timeout"));
        h.record(ErrorContext::new("op-a", "network unreachable"));
        h.record(ErrorContext::new("op-b", "database is locked"));

        let metrics = h.metrics(Duration::hours(1));
        assert_eq!(metrics.total_errors, 3);
        assert_eq!(metrics.by_code.get(&ErrorCode::Timeout), Some(&1));
        assert_eq!(metrics.by_code.get(&ErrorCode::NetworkFailure), Some(&1));
        assert_eq!(metrics.by_code.get(&ErrorCode::DatabaseError), Some(&1));
        assert_eq!(metrics.by_severity.get(&ErrorSeverity::Medium), Some(&2));
        assert_eq!(metrics.by_severity.get(&ErrorSeverity::High), Some(&1));
        assert_eq!(metrics.by_operation.get("op-a"), Some(&2));
        assert!((metrics.errors_per_hour - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metrics_respects_window() {
        let h = history();
        let mut old = ErrorContext::new("op", "boom");
        old.timestamp = Utc::now() - Duration::hours(3);
        h.record(old);
        h.record(ErrorContext::new("op", "boom"));

        let metrics = h.metrics(Duration::hours(1));
        assert_eq!(metrics.total_errors, 1);
    }

    #[test]
    fn test_trends_daily_buckets() {
        let h = history();
        let now = Utc::now();

        let mut yesterday = ErrorContext::new("op", "boom");
        yesterday.timestamp = now - Duration::days(1);
        h.record(yesterday);
        h.record(ErrorContext::new("op", "boom"));
        h.record(ErrorContext::new("op", "boom"));

        let points = h.trends(now - Duration::days(2), Utc::now());
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].count, 1);
        assert_eq!(points[1].count, 2);
        assert!(points[0].date < points[1].date);
    }

    #[test]
    fn test_trim_by_retention() {
        let h = ErrorHistory::new(Duration::hours(1));
        let mut old = ErrorContext::new("op", "boom");
        old.timestamp = Utc::now() - Duration::hours(2);
        h.record(old);
        h.record(ErrorContext::new("op", "boom"));

        assert_eq!(h.trim(), 1);
        assert_eq!(h.len(), 1);
        assert_eq!(h.trim(), 0);
    }

    #[test]
    fn test_recent_newest_first() {
        let h = history();
        h.record(ErrorContext::new("first", "boom"));
        h.record(ErrorContext::new("second", "boom"));
        h.record(ErrorContext::new("third", "boom"));

        let recent = h.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].operation, "third");
        assert_eq!(recent[1].operation, "second");
    }
}
