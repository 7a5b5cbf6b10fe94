//! Error taxonomy and classification.
//!
//! Classification is a pure, two-stage mapping: the raw failure message is
//! matched against ordered keyword patterns to derive an [`ErrorCode`], and
//! the code alone determines the [`ErrorSeverity`]. Keeping both stages free
//! of state lets the taxonomy evolve without touching retry or breaker logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{Display, EnumIter};
use uuid::Uuid;

/// Structured code for a classified failure
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    NetworkFailure,
    Timeout,
    ValidationFailure,
    AuthenticationFailure,
    AuthorizationFailure,
    ResourceNotFound,
    ResourceExhausted,
    InternalError,
    ExternalServiceError,
    BlockchainError,
    DatabaseError,
    ConfigurationError,
}

/// Severity derived deterministically from the error code
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Map a raw failure message to an [`ErrorCode`].
///
/// Matching is ordered: the first pattern group that hits wins, so a message
/// like "connection timeout" classifies as `Timeout`, not `NetworkFailure`.
pub fn classify(message: &str) -> ErrorCode {
    let msg = message.to_lowercase();

    if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline") {
        ErrorCode::Timeout
    } else if msg.contains("network") || msg.contains("connection") || msg.contains("unreachable") {
        ErrorCode::NetworkFailure
    } else if msg.contains("unauthorized") || msg.contains("forbidden") {
        ErrorCode::AuthorizationFailure
    } else if msg.contains("unauthenticated") || msg.contains("authentication") {
        ErrorCode::AuthenticationFailure
    } else if msg.contains("not found") || msg.contains("no such") {
        ErrorCode::ResourceNotFound
    } else if msg.contains("validation") || msg.contains("invalid") {
        ErrorCode::ValidationFailure
    } else if msg.contains("blockchain")
        || msg.contains("ledger")
        || msg.contains("wallet")
        || msg.contains("consensus")
    {
        ErrorCode::BlockchainError
    } else if msg.contains("database") || msg.contains("sql") || msg.contains("deadlock") {
        ErrorCode::DatabaseError
    } else if msg.contains("exhausted") || msg.contains("rate limit") || msg.contains("too many") {
        ErrorCode::ResourceExhausted
    } else {
        ErrorCode::InternalError
    }
}

/// Map an [`ErrorCode`] to its severity.
pub fn severity_of(code: ErrorCode) -> ErrorSeverity {
    match code {
        ErrorCode::ResourceExhausted => ErrorSeverity::Critical,
        ErrorCode::AuthenticationFailure
        | ErrorCode::AuthorizationFailure
        | ErrorCode::BlockchainError
        | ErrorCode::DatabaseError => ErrorSeverity::High,
        ErrorCode::NetworkFailure | ErrorCode::Timeout | ErrorCode::ExternalServiceError => {
            ErrorSeverity::Medium
        }
        _ => ErrorSeverity::Low,
    }
}

/// One handled failure, classified and timestamped.
///
/// Created on every failure routed through the core; immutable afterwards
/// except for resolution marking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique identifier for this failure record
    pub id: Uuid,
    /// Name of the operation that failed
    pub operation: String,
    /// The underlying error message
    pub message: String,
    /// Classified error code
    pub code: ErrorCode,
    /// Severity derived from the code
    pub severity: ErrorSeverity,
    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata supplied by the caller
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Correlation: originating user, if known
    pub user_id: Option<String>,
    /// Correlation: originating request, if known
    pub request_id: Option<String>,
    /// How many retries had been attempted when this was recorded
    pub retry_count: u32,
    /// Whether this failure has been marked resolved
    pub resolved: bool,
    /// When resolution was marked
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ErrorContext {
    /// Classify a failure message for the given operation
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let code = classify(&message);

        Self {
            id: Uuid::new_v4(),
            operation: operation.into(),
            message,
            code,
            severity: severity_of(code),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
            user_id: None,
            request_id: None,
            retry_count: 0,
            resolved: false,
            resolved_at: None,
        }
    }

    /// Attach caller-supplied metadata
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the retry count observed at recording time
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Set correlation identifiers
    pub fn with_correlation(
        mut self,
        user_id: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        self.user_id = user_id;
        self.request_id = request_id;
        self
    }

    /// Mark this failure as resolved
    pub fn resolve(&mut self) {
        self.resolved = true;
        self.resolved_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_timeout_before_network() {
        assert_eq!(classify("connection timeout after 30s"), ErrorCode::Timeout);
        assert_eq!(classify("request timed out"), ErrorCode::Timeout);
    }

    #[test]
    fn test_classify_network() {
        assert_eq!(classify("network unreachable"), ErrorCode::NetworkFailure);
        assert_eq!(classify("connection refused"), ErrorCode::NetworkFailure);
    }

    #[test]
    fn test_classify_authorization() {
        assert_eq!(classify("403 Forbidden"), ErrorCode::AuthorizationFailure);
        assert_eq!(
            classify("unauthorized access to resource"),
            ErrorCode::AuthorizationFailure
        );
    }

    #[test]
    fn test_classify_not_found() {
        assert_eq!(classify("record not found"), ErrorCode::ResourceNotFound);
    }

    #[test]
    fn test_classify_validation() {
        assert_eq!(classify("validation failed for field"), ErrorCode::ValidationFailure);
        assert_eq!(classify("invalid payload shape"), ErrorCode::ValidationFailure);
    }

    #[test]
    fn test_classify_blockchain() {
        assert_eq!(classify("blockchain node rejected tx"), ErrorCode::BlockchainError);
        assert_eq!(classify("ledger sequence mismatch"), ErrorCode::BlockchainError);
    }

    #[test]
    fn test_classify_database() {
        assert_eq!(classify("database is locked"), ErrorCode::DatabaseError);
        assert_eq!(classify("sql syntax error"), ErrorCode::DatabaseError);
        assert_eq!(classify("deadlock detected"), ErrorCode::DatabaseError);
    }

    #[test]
    fn test_classify_default() {
        assert_eq!(classify("something unexpected happened"), ErrorCode::InternalError);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let msg = "upstream gateway timeout";
        let first = classify(msg);
        for _ in 0..10 {
            assert_eq!(classify(msg), first);
        }
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(severity_of(ErrorCode::ResourceExhausted), ErrorSeverity::Critical);
        assert_eq!(severity_of(ErrorCode::AuthorizationFailure), ErrorSeverity::High);
        assert_eq!(severity_of(ErrorCode::BlockchainError), ErrorSeverity::High);
        assert_eq!(severity_of(ErrorCode::DatabaseError), ErrorSeverity::High);
        assert_eq!(severity_of(ErrorCode::Timeout), ErrorSeverity::Medium);
        assert_eq!(severity_of(ErrorCode::NetworkFailure), ErrorSeverity::Medium);
        assert_eq!(severity_of(ErrorCode::ValidationFailure), ErrorSeverity::Low);
        assert_eq!(severity_of(ErrorCode::InternalError), ErrorSeverity::Low);
    }

    #[test]
    fn test_error_context_new() {
        let ctx = ErrorContext::new("payments.settle", "database deadlock detected");
        assert_eq!(ctx.code, ErrorCode::DatabaseError);
        assert_eq!(ctx.severity, ErrorSeverity::High);
        assert_eq!(ctx.operation, "payments.settle");
        assert!(!ctx.resolved);
        assert!(ctx.resolved_at.is_none());
        assert_eq!(ctx.retry_count, 0);
    }

    #[test]
    fn test_error_context_resolve() {
        let mut ctx = ErrorContext::new("op", "boom");
        ctx.resolve();
        assert!(ctx.resolved);
        assert!(ctx.resolved_at.is_some());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Critical > ErrorSeverity::High);
        assert!(ErrorSeverity::High > ErrorSeverity::Medium);
        assert!(ErrorSeverity::Medium > ErrorSeverity::Low);
    }
}
