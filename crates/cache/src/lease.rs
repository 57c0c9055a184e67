//! Best-effort distributed lease on top of the cache.
//!
//! The rotation driver must not race another driver instance for the same
//! client. A TTL key under `rotation-lock:{client_id}` with a per-holder
//! fencing value gives acquire-if-absent semantics that are good enough:
//! the store writes behind the lease stay the single source of truth, the
//! lease only narrows the window for duplicate work.

use crate::{Cache, CacheError, keys};
use keygate_core::ClientId;
use std::sync::Arc;
use std::time::Duration;

/// Lease factory bound to a cache and a TTL.
#[derive(Clone)]
pub struct CacheLease {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

/// A held lease. Release explicitly; an unreleased lease dies with its TTL.
pub struct LeaseGuard {
    cache: Arc<dyn Cache>,
    key: String,
    fencing: String,
}

impl CacheLease {
    pub fn new(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Try to take the per-client rotation lease. `None` means another
    /// holder is live.
    pub async fn try_acquire(&self, client_id: &ClientId) -> Result<Option<LeaseGuard>, CacheError> {
        let key = keys::rotation_lock(client_id);
        if self.cache.get(&key).await?.is_some() {
            return Ok(None);
        }

        let fencing = uuid::Uuid::new_v4().to_string();
        self.cache
            .set_with_ttl(&key, fencing.as_bytes(), self.ttl)
            .await?;

        // Read back: if a concurrent writer overwrote us between the probe
        // and the write, whoever's fencing value survived owns the lease.
        match self.cache.get(&key).await? {
            Some(current) if current == fencing.as_bytes() => Ok(Some(LeaseGuard {
                cache: Arc::clone(&self.cache),
                key,
                fencing,
            })),
            _ => Ok(None),
        }
    }
}

impl LeaseGuard {
    /// Release the lease, but only if we still hold it; a lease that
    /// expired and was re-acquired by someone else must not be deleted.
    pub async fn release(self) -> Result<(), CacheError> {
        match self.cache.get(&self.key).await? {
            Some(current) if current == self.fencing.as_bytes() => {
                self.cache.delete(&self.key).await
            }
            _ => Ok(()),
        }
    }
}
