//! Bounded retry with configurable backoff and jitter.

use crate::ResilienceError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry strategy: attempt cap plus a backoff policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryStrategy {
    /// Maximum number of attempts, first try included.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

/// Delay computation between attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed {
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    /// `base_delay * multiplier^(attempt-1)`, capped, with jitter.
    Exponential {
        #[serde(with = "humantime_serde")]
        base_delay: Duration,
        multiplier: f64,
        #[serde(with = "humantime_serde")]
        max_delay: Duration,
        jitter: JitterPolicy,
    },
}

/// Jitter applied to a computed delay to spread out retry storms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterPolicy {
    None,
    /// `random(0, delay)`.
    Full,
    /// `delay/2 + random(0, delay/2)`.
    Equal,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(500), 1.5)
    }
}

impl RetryStrategy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffPolicy::Fixed { delay },
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            backoff: BackoffPolicy::Exponential {
                base_delay,
                multiplier,
                max_delay: Duration::from_secs(30),
                jitter: JitterPolicy::Equal,
            },
        }
    }

    /// Strategy that gives up after the first failure.
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-indexed; attempt 1 is the
    /// first retry). `None` when the attempt budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let delay = match &self.backoff {
            BackoffPolicy::Fixed { delay } => *delay,
            BackoffPolicy::Exponential {
                base_delay,
                multiplier,
                max_delay,
                jitter,
            } => {
                let scaled = base_delay.as_millis() as f64 * multiplier.powi(attempt as i32 - 1);
                let capped = Duration::from_millis(scaled as u64).min(*max_delay);
                apply_jitter(capped, *jitter)
            }
        };
        Some(delay)
    }

    /// Run `op`, retrying while `should_retry` approves the error and the
    /// attempt budget lasts. Non-retryable errors pass straight through.
    pub async fn execute<T, E, F, Fut, P>(
        &self,
        mut op: F,
        should_retry: P,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !should_retry(&e) => return Err(ResilienceError::Inner(e)),
                Err(e) => match self.delay_for_attempt(attempt) {
                    Some(delay) => {
                        tracing::debug!(
                            attempt,
                            max_attempts = self.max_attempts,
                            delay_ms = crate::error::millis(delay),
                            "retrying after failure"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(ResilienceError::RetriesExhausted {
                            attempts: attempt,
                            last: e,
                        });
                    }
                },
            }
        }
    }
}

fn apply_jitter(delay: Duration, jitter: JitterPolicy) -> Duration {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    match jitter {
        JitterPolicy::None => delay,
        JitterPolicy::Full => Duration::from_millis(rng.gen_range(0..=delay.as_millis() as u64)),
        JitterPolicy::Equal => {
            let half = delay.as_millis() as u64 / 2;
            Duration::from_millis(half + rng.gen_range(0..=half))
        }
    }
}
