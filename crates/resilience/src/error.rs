use std::time::Duration;
use thiserror::Error;

/// Outcome of running an operation through a resilience primitive.
///
/// `E` is the operation's own error type; the wrapper adds the failure modes
/// introduced by the primitives themselves.
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// The circuit for this dependency is open; the call was not attempted.
    #[error("circuit breaker for '{dependency}' is open")]
    CircuitOpen { dependency: String },

    /// No bulkhead permit became available within the configured wait.
    #[error("bulkhead for '{dependency}' is at capacity")]
    BulkheadFull { dependency: String },

    /// Every allowed attempt failed with a retryable error.
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// The operation failed with an error the caller declared non-retryable.
    #[error(transparent)]
    Inner(E),
}

impl<E> ResilienceError<E> {
    /// The operation error, if one was observed at all.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::RetriesExhausted { last, .. } => Some(last),
            Self::Inner(e) => Some(e),
            Self::CircuitOpen { .. } | Self::BulkheadFull { .. } => None,
        }
    }

    /// True when the call never reached the dependency.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::BulkheadFull { .. })
    }
}

/// Placeholder duration formatting shared by pattern configs.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
