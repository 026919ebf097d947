//! Queue Error Types

use std::fmt;

/// Error type returned by message handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a single handler invocation
pub type HandlerResult = Result<(), HandlerError>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Invalid queue name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid prefetch {value}: must be a positive integer")]
    InvalidPrefetch { value: usize },

    #[error("Payload field '{field}' collides with a reserved message field")]
    ReservedField { field: String },

    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    #[error(transparent)]
    Handler(HandlerFailure),

    #[error(transparent)]
    HandlerFailures(AggregateError),

    #[error("Timed out after {timeout_ms}ms waiting for condition")]
    Timeout { timeout_ms: u128 },

    #[error("Deserialization failed: {message}")]
    Deserialization { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl QueueError {
    /// All handler failures carried by this error, whether aggregated or single
    pub fn handler_failures(&self) -> &[HandlerFailure] {
        match self {
            QueueError::Handler(failure) => std::slice::from_ref(failure),
            QueueError::HandlerFailures(aggregate) => &aggregate.failures,
            _ => &[],
        }
    }
}

/// A handler invocation that completed with an error during `flush`
#[derive(Debug, thiserror::Error)]
#[error("Handler for consumer {consumer_id} failed on message {message_id}: {source}")]
pub struct HandlerFailure {
    pub consumer_id: u64,
    pub message_id: u64,
    pub message_type: Option<String>,
    #[source]
    pub source: HandlerError,
}

/// Every handler failure captured during a single `flush` call
#[derive(Debug)]
pub struct AggregateError {
    pub failures: Vec<HandlerFailure>,
}

impl AggregateError {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn first(&self) -> Option<&HandlerFailure> {
        self.failures.first()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} handler(s) failed during flush", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;
