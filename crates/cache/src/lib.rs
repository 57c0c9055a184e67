//! TTL key-value cache abstraction.
//!
//! The cache is best-effort everywhere it is used: a miss is a signal to
//! fall through to the authoritative source, never an error. Values that
//! carry cryptographic material go through [`EncryptedCache`] so nothing
//! secret sits in the cache tier in the clear.

mod encrypted;
pub mod keys;
mod lease;
mod memory;

pub use encrypted::EncryptedCache;
pub use lease::{CacheLease, LeaseGuard};
pub use memory::{CacheStats, MemoryCache};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Cache backend failure. Deliberately narrow: absence of a key is not an
/// error, so the only failures are backend trouble and crypto trouble.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend failure: {reason}")]
    Backend { reason: String },

    #[error("cache value could not be decrypted")]
    Decryption,
}

impl From<CacheError> for keygate_error::Error {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Backend { .. } => {
                keygate_error::Error::dependency_unavailable("cache unreachable")
            }
            CacheError::Decryption => keygate_error::Error::internal("cache value undecryptable"),
        }
    }
}

/// Capability set of the cache tier.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a live value; expired and absent keys both return `None`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value with a TTL; a zero TTL is an immediate no-op.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration)
    -> Result<(), CacheError>;

    /// Remove a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Keys under `prefix` whose entries are still live.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    /// Drop every key under `prefix`.
    async fn invalidate_prefix(&self, prefix: &str) -> Result<(), CacheError>;
}
