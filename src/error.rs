//! Crate-level error type and result alias.

use crate::circuit_breaker::BreakerError;
use crate::events::PublishError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the service facade
#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error(transparent)]
    Breaker(#[from] BreakerError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("dead letter item '{0}' not found")]
    DeadLetterNotFound(Uuid),

    #[error("recovery target '{0}' is not a valid dead letter id")]
    InvalidRecoveryTarget(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ResilienceError>;
