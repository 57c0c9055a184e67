//! Failure-ratio circuit breaker over a sliding outcome window.
//!
//! Unlike a consecutive-failure counter, the window tolerates interleaved
//! successes: the circuit opens when at least half of the recent calls
//! failed, with a minimum sample count so a single early failure cannot
//! trip it.

use crate::ResilienceError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; outcomes feed the window.
    Closed,
    /// Calls are rejected until the cool-down elapses.
    Open,
    /// A limited number of probe calls decide whether to close again.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Open => f.write_str("open"),
            Self::HalfOpen => f.write_str("half-open"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of recent outcomes considered.
    pub window_size: usize,
    /// Minimum outcomes in the window before the ratio is judged.
    pub min_samples: usize,
    /// Failure ratio at or above which the circuit opens.
    pub failure_ratio: f64,
    /// Time to wait in `Open` before probing.
    #[serde(with = "humantime_serde")]
    pub cool_down: Duration,
    /// Concurrent probes allowed in `HalfOpen`.
    pub half_open_max_probes: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            min_samples: 10,
            failure_ratio: 0.5,
            cool_down: Duration::from_secs(30),
            half_open_max_probes: 3,
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_in_flight: usize,
}

/// Per-dependency circuit breaker.
pub struct CircuitBreaker {
    dependency: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(dependency: impl Into<String>) -> Self {
        Self::with_config(dependency, CircuitBreakerConfig::default())
    }

    pub fn with_config(dependency: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            dependency: dependency.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                half_open_in_flight: 0,
            }),
        }
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state(), CircuitState::Open)
    }

    /// Admission check. In `Open`, flips to `HalfOpen` once the cool-down
    /// has elapsed and admits the caller as a probe.
    pub fn try_acquire(&self) -> Result<(), ResilienceError<std::convert::Infallible>> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= self.config.cool_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_in_flight = 1;
                    tracing::info!(
                        dependency = %self.dependency,
                        "circuit breaker half-open, probing"
                    );
                    Ok(())
                } else {
                    Err(ResilienceError::CircuitOpen {
                        dependency: self.dependency.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max_probes {
                    inner.half_open_in_flight += 1;
                    Ok(())
                } else {
                    Err(ResilienceError::CircuitOpen {
                        dependency: self.dependency.clone(),
                    })
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                Self::push_outcome(&mut inner.window, self.config.window_size, true);
            }
            CircuitState::HalfOpen => {
                // One good probe closes the circuit and resets the window.
                inner.state = CircuitState::Closed;
                inner.window.clear();
                inner.opened_at = None;
                inner.half_open_in_flight = 0;
                tracing::info!(
                    dependency = %self.dependency,
                    "circuit breaker closed after successful probe"
                );
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                Self::push_outcome(&mut inner.window, self.config.window_size, false);
                let samples = inner.window.len();
                if samples >= self.config.min_samples {
                    let failures = inner.window.iter().filter(|ok| !**ok).count();
                    let ratio = failures as f64 / samples as f64;
                    if ratio >= self.config.failure_ratio {
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(Instant::now());
                        tracing::warn!(
                            dependency = %self.dependency,
                            failures,
                            samples,
                            "circuit breaker opened"
                        );
                    }
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_in_flight = 0;
                tracing::warn!(
                    dependency = %self.dependency,
                    "circuit breaker re-opened after failed probe"
                );
            }
            CircuitState::Open => {}
        }
    }

    /// Run `op` under the breaker. `counts_as_failure` decides which errors
    /// feed the window; a rejected business input is not an outage.
    pub async fn execute<T, E, F, Fut, P>(
        &self,
        op: F,
        counts_as_failure: P,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        if let Err(rejection) = self.try_acquire() {
            return Err(match rejection {
                ResilienceError::CircuitOpen { dependency } => {
                    ResilienceError::CircuitOpen { dependency }
                }
                // try_acquire only produces CircuitOpen
                _ => unreachable!(),
            });
        }

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                if counts_as_failure(&e) {
                    self.record_failure();
                } else {
                    self.record_success();
                }
                Err(ResilienceError::Inner(e))
            }
        }
    }

    fn push_outcome(window: &mut VecDeque<bool>, cap: usize, ok: bool) {
        if window.len() == cap {
            window.pop_front();
        }
        window.push_back(ok);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("dependency", &self.dependency)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
