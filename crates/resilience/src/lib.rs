//! Resilience primitives shared by every dependency edge.
//!
//! Three patterns, used together around the vault, the cache and the
//! backend: bounded retry with jittered backoff, a failure-ratio circuit
//! breaker over a sliding outcome window, and a semaphore bulkhead so one
//! saturated dependency cannot starve the others.

mod bulkhead;
mod circuit_breaker;
mod error;
mod retry;

pub use bulkhead::{Bulkhead, BulkheadConfig, BulkheadPermit};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::ResilienceError;
pub use retry::{BackoffPolicy, JitterPolicy, RetryStrategy};
