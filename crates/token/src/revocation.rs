//! Token revocation set.

use async_trait::async_trait;
use keygate_cache::{Cache, keys};
use std::sync::Arc;
use std::time::Duration;

/// Revoked-token lookup consulted on every verification.
#[async_trait]
pub trait RevocationSet: Send + Sync {
    /// Mark `jti` revoked for `ttl` (the token's remaining lifetime is
    /// enough; after that, expiry rejects it anyway).
    async fn revoke(&self, jti: &str, ttl: Duration);

    /// Whether `jti` has been revoked.
    async fn is_revoked(&self, jti: &str) -> bool;
}

/// Cache-backed revocation set under `revoked:{jti}` keys.
///
/// Lookups fail open: the cache is best-effort, and a cache outage must not
/// take authentication down with it. The hard stop for any token remains
/// its `exp`.
pub struct CacheRevocationSet {
    cache: Arc<dyn Cache>,
}

impl CacheRevocationSet {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl RevocationSet for CacheRevocationSet {
    async fn revoke(&self, jti: &str, ttl: Duration) {
        if let Err(e) = self
            .cache
            .set_with_ttl(&keys::revoked(jti), b"1", ttl)
            .await
        {
            tracing::warn!(error = %e, "failed to persist revocation marker");
        }
    }

    async fn is_revoked(&self, jti: &str) -> bool {
        match self.cache.get(&keys::revoked(jti)).await {
            Ok(entry) => entry.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "revocation lookup failed, failing open");
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use keygate_cache::MemoryCache;
    use std::collections::HashSet;

    /// Fixed revocation set for codec tests.
    pub(crate) struct StaticRevocations(HashSet<String>);

    impl StaticRevocations {
        pub(crate) fn none() -> Self {
            Self(HashSet::new())
        }

        pub(crate) fn of(jti: &str) -> Self {
            Self(HashSet::from([jti.to_owned()]))
        }
    }

    #[async_trait]
    impl RevocationSet for StaticRevocations {
        async fn revoke(&self, _jti: &str, _ttl: Duration) {}

        async fn is_revoked(&self, jti: &str) -> bool {
            self.0.contains(jti)
        }
    }

    #[tokio::test]
    async fn test_revoke_then_lookup() {
        let set = CacheRevocationSet::new(Arc::new(MemoryCache::new(16)));
        assert!(!set.is_revoked("j-1").await);
        set.revoke("j-1", Duration::from_secs(60)).await;
        assert!(set.is_revoked("j-1").await);
        assert!(!set.is_revoked("j-2").await);
    }
}
