//! Dead letter queue for operations that exhausted their retry budget.
//!
//! The queue is capacity-bounded: insertion past capacity evicts the oldest
//! entry. Losing the oldest items under sustained overload is a deliberate
//! trade-off, not a bug; the alternative is unbounded memory growth.

use crate::circuit_breaker::RESILIENCE_METRICS;
use crate::classification::ErrorContext;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use strum_macros::Display;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Lifecycle of a dead letter item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeadLetterStatus {
    /// Awaiting reprocessing
    Pending,
    /// A reprocess attempt is in flight
    Retrying,
    /// Exceeded the hard retry ceiling; terminal until manual recovery
    Failed,
    /// Reprocessed successfully or manually resolved
    Resolved,
}

/// One permanently-failed operation awaiting reprocessing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterItem {
    pub id: Uuid,
    /// Identifier of the failed operation
    pub operation: String,
    /// Opaque caller-supplied data needed to retry the operation
    pub payload: Value,
    /// Message of the error that exhausted the retry budget
    pub error_message: String,
    /// Classified context captured at enqueue time
    pub context: ErrorContext,
    pub status: DeadLetterStatus,
    /// Reprocess attempts made from the queue
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Outcome summary of one reprocessing pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReprocessReport {
    /// Items a reprocess attempt was made for
    pub attempted: usize,
    /// Items that succeeded and were marked resolved
    pub resolved: usize,
    /// Items that hit the retry ceiling and were marked failed
    pub failed_terminal: usize,
    /// Items left pending for a future pass
    pub requeued: usize,
}

/// Capability for re-executing a captured operation during reprocessing
#[async_trait]
pub trait ReprocessHandler: Send + Sync {
    /// Re-execute the named operation with its captured payload
    async fn reprocess(&self, operation: &str, payload: &Value) -> anyhow::Result<()>;
}

/// Bounded, ordered store of permanently-failed operations
pub struct DeadLetterQueue {
    items: Mutex<VecDeque<DeadLetterItem>>,
    max_size: usize,
    /// Reprocess attempts allowed before an item is marked Failed
    retry_ceiling: u32,
    /// How long a requeued item waits before it is due again
    retry_delay: Duration,
}

impl DeadLetterQueue {
    pub fn new(max_size: usize, retry_ceiling: u32) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            max_size: max_size.max(1),
            retry_ceiling,
            retry_delay: Duration::seconds(30),
        }
    }

    /// Override the delay before a requeued item becomes due again
    pub fn with_retry_delay(mut self, delay: std::time::Duration) -> Self {
        self.retry_delay =
            Duration::from_std(delay).unwrap_or_else(|_| Duration::seconds(30));
        self
    }

    /// Append a failed operation; evicts the oldest item at capacity
    pub fn enqueue(
        &self,
        operation: impl Into<String>,
        payload: Value,
        error_message: impl Into<String>,
        context: ErrorContext,
    ) -> Uuid {
        let operation = operation.into();
        let error_message = error_message.into();

        let item = DeadLetterItem {
            id: Uuid::new_v4(),
            operation: operation.clone(),
            payload,
            error_message,
            context,
            status: DeadLetterStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            last_retry_at: None,
            next_retry_at: None,
        };
        let id = item.id;

        let mut items = self.items.lock();
        if items.len() >= self.max_size {
            if let Some(evicted) = items.pop_front() {
                warn!(
                    evicted_id = %evicted.id,
                    operation = %evicted.operation,
                    "Dead letter queue at capacity, evicting oldest item"
                );
            }
        }
        items.push_back(item);

        RESILIENCE_METRICS
            .dead_letters_total
            .with_label_values(&[&operation])
            .inc();
        RESILIENCE_METRICS.dead_letter_depth.set(items.len() as f64);

        info!(id = %id, operation = %operation, "Dead letter enqueued");
        id
    }

    /// Reprocess due pending items through the handler.
    ///
    /// Each item is marked Retrying for the duration of its attempt. A
    /// success marks it Resolved; a failure returns it to Pending with a
    /// fresh `next_retry_at` unless its retry count exceeds the ceiling,
    /// in which case it is marked Failed and never retried automatically
    /// again. Items whose `next_retry_at` lies in the future are skipped.
    /// The pass stops promptly when the cancellation token fires.
    pub async fn reprocess(
        &self,
        handler: &dyn ReprocessHandler,
        cancel: &CancellationToken,
    ) -> ReprocessReport {
        let mut report = ReprocessReport::default();
        let now = Utc::now();

        // Snapshot due work; the lock is never held across an await
        let pending: Vec<(Uuid, String, Value)> = {
            let mut items = self.items.lock();
            items
                .iter_mut()
                .filter(|item| {
                    item.status == DeadLetterStatus::Pending
                        && item.next_retry_at.map_or(true, |due| due <= now)
                })
                .map(|item| {
                    item.status = DeadLetterStatus::Retrying;
                    (item.id, item.operation.clone(), item.payload.clone())
                })
                .collect()
        };

        for (id, operation, payload) in pending {
            if cancel.is_cancelled() {
                // Return the untouched remainder to pending; their retry
                // budget is unspent
                self.set_status(id, DeadLetterStatus::Pending);
                continue;
            }

            report.attempted += 1;
            // The ceiling bounds actual handler invocations, so the count
            // only moves once an attempt really starts
            {
                let mut items = self.items.lock();
                if let Some(item) = items.iter_mut().find(|i| i.id == id) {
                    item.retry_count += 1;
                    item.last_retry_at = Some(Utc::now());
                }
            }

            let outcome = tokio::select! {
                result = handler.reprocess(&operation, &payload) => result,
                _ = cancel.cancelled() => {
                    self.set_status(id, DeadLetterStatus::Pending);
                    continue;
                }
            };

            match outcome {
                Ok(()) => {
                    info!(id = %id, operation = %operation, "Dead letter reprocessed");
                    self.set_status(id, DeadLetterStatus::Resolved);
                    report.resolved += 1;
                }
                Err(e) => {
                    let mut items = self.items.lock();
                    if let Some(item) = items.iter_mut().find(|i| i.id == id) {
                        if item.retry_count > self.retry_ceiling {
                            warn!(
                                id = %id,
                                operation = %operation,
                                retry_count = item.retry_count,
                                error = %e,
                                "Dead letter exceeded retry ceiling, marking failed"
                            );
                            item.status = DeadLetterStatus::Failed;
                            report.failed_terminal += 1;
                        } else {
                            item.status = DeadLetterStatus::Pending;
                            item.next_retry_at = Some(Utc::now() + self.retry_delay);
                            report.requeued += 1;
                        }
                    }
                }
            }
        }

        RESILIENCE_METRICS
            .dead_letter_depth
            .set(self.items.lock().len() as f64);
        report
    }

    /// The most recent items, newest first
    pub fn list(&self, limit: usize) -> Vec<DeadLetterItem> {
        let items = self.items.lock();
        items.iter().rev().take(limit).cloned().collect()
    }

    /// Look up an item by id
    pub fn get(&self, id: Uuid) -> Option<DeadLetterItem> {
        self.items.lock().iter().find(|i| i.id == id).cloned()
    }

    /// Return an item to Pending and make it due immediately.
    /// Works on Failed items too; this is the manual recovery path.
    pub fn mark_pending(&self, id: Uuid) -> bool {
        let mut items = self.items.lock();
        match items.iter_mut().find(|i| i.id == id) {
            Some(item) => {
                item.status = DeadLetterStatus::Pending;
                item.next_retry_at = None;
                true
            }
            None => false,
        }
    }

    /// Manually resolve an item
    pub fn mark_resolved(&self, id: Uuid) -> bool {
        self.set_status(id, DeadLetterStatus::Resolved)
    }

    fn set_status(&self, id: Uuid, status: DeadLetterStatus) -> bool {
        let mut items = self.items.lock();
        match items.iter_mut().find(|i| i.id == id) {
            Some(item) => {
                item.status = status;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Count of items currently pending reprocessing
    pub fn pending_count(&self) -> usize {
        self.items
            .lock()
            .iter()
            .filter(|i| i.status == DeadLetterStatus::Pending)
            .count()
    }
}
