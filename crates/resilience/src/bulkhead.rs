//! Semaphore bulkhead: a concurrency quota per dependency.

use crate::ResilienceError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkheadConfig {
    /// Maximum concurrent operations against the dependency.
    pub max_concurrency: usize,
    /// How long a caller may wait for a permit before being rejected.
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 32,
            acquire_timeout: Duration::from_secs(2),
        }
    }
}

/// Concurrency quota for one dependency (vault, cache, backend each get
/// their own instance so saturation does not cross over).
#[derive(Debug, Clone)]
pub struct Bulkhead {
    dependency: String,
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
}

/// Held permit; the slot frees on drop.
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

impl Bulkhead {
    pub fn new(dependency: impl Into<String>, max_concurrency: usize) -> Self {
        Self::with_config(
            dependency,
            BulkheadConfig {
                max_concurrency,
                ..BulkheadConfig::default()
            },
        )
    }

    pub fn with_config(dependency: impl Into<String>, config: BulkheadConfig) -> Self {
        Self {
            dependency: dependency.into(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire a permit, waiting up to the configured timeout.
    pub async fn acquire<E>(&self) -> Result<BulkheadPermit, ResilienceError<E>> {
        let acquired = tokio::time::timeout(
            self.config.acquire_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await;

        match acquired {
            Ok(Ok(permit)) => Ok(BulkheadPermit { _permit: permit }),
            // Semaphore closed never happens (we never close it) but maps
            // to the same rejection; timeout is the expected path.
            Ok(Err(_)) | Err(_) => {
                tracing::warn!(dependency = %self.dependency, "bulkhead rejected caller");
                Err(ResilienceError::BulkheadFull {
                    dependency: self.dependency.clone(),
                })
            }
        }
    }

    /// Run `op` while holding a permit.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _permit = self.acquire::<E>().await?;
        op().await.map_err(ResilienceError::Inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_free_on_drop() {
        let bulkhead = Bulkhead::new("backend", 2);
        let p1 = bulkhead.acquire::<()>().await.unwrap();
        let _p2 = bulkhead.acquire::<()>().await.unwrap();
        assert_eq!(bulkhead.available_permits(), 0);
        drop(p1);
        assert_eq!(bulkhead.available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_when_saturated() {
        let bulkhead = Bulkhead::with_config(
            "vault",
            BulkheadConfig {
                max_concurrency: 1,
                acquire_timeout: Duration::from_millis(50),
            },
        );
        let _held = bulkhead.acquire::<()>().await.unwrap();
        let rejected = bulkhead.acquire::<()>().await;
        assert!(matches!(
            rejected,
            Err(ResilienceError::BulkheadFull { ref dependency }) if dependency == "vault"
        ));
    }

    #[tokio::test]
    async fn test_execute_propagates_inner_error() {
        let bulkhead = Bulkhead::new("cache", 4);
        let result: Result<(), _> = bulkhead.execute(|| async { Err("boom") }).await;
        assert!(matches!(result, Err(ResilienceError::Inner("boom"))));
        assert_eq!(bulkhead.available_permits(), 4);
    }
}
