//! Error types for the trading engine

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for engine operations
///
/// The executor uses [`EngineError::is_retryable`] to decide whether a failed
/// opportunity should be handed back to the queue for redelivery or moved to
/// the dead-letter store.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad input to a single evaluation, never retried
    #[error("validation error: {0}")]
    Validation(String),

    /// HTTP transport errors (connection refused, timeout, TLS)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Marketplace API returned a non-success status
    #[error("marketplace API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Outbound quota exhausted or the API returned 429
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Circuit breaker is open, the request was not attempted
    #[error("circuit open after {failure_count} consecutive failures")]
    CircuitOpen { failure_count: u32 },

    /// A budget gate rejected the spend; conditions will not change quickly,
    /// so this is not retried
    #[error("insufficient budget: {0}")]
    InsufficientBudget(String),

    /// A reservation already exists for this id; invariant violation
    #[error("duplicate reservation for id {0}")]
    DuplicateReservation(String),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Invalid API response payload
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// Authentication errors
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Database errors
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Opportunity queue send errors
    #[error("queue send error: {0}")]
    QueueSend(String),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the executor should surface this error for queue redelivery.
    ///
    /// Transient conditions (transport faults, 5xx responses, rate limiting)
    /// are worth retrying. Everything else is either a normal outcome or a
    /// condition that will not improve on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Transport(_) => true,
            EngineError::RateLimited { .. } => true,
            EngineError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this failure should consume a redelivery attempt.
    ///
    /// A rejection from the circuit breaker never reached the API, so the
    /// opportunity is requeued without burning retry budget.
    pub fn consumes_retry_budget(&self) -> bool {
        !matches!(self, EngineError::CircuitOpen { .. })
    }
}
