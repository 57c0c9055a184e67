//! Secret-store adapter.
//!
//! The store is the authoritative home of client credentials, transition
//! records and the token signing key. The rest of the workspace only sees
//! the [`SecretStore`] capability set; the REST implementation against the
//! vault lives in [`VaultHttpStore`], and tests run against
//! [`MemorySecretStore`].

mod error;
mod http;
mod memory;
pub mod paths;

pub use error::StoreError;
pub use http::{VaultHttpConfig, VaultHttpStore};
pub use memory::MemorySecretStore;

use async_trait::async_trait;

/// Capability set of the secret store.
///
/// Values cross this boundary as opaque bytes; decoding them (JSON records,
/// raw key material) is the caller's concern. Failure semantics matter more
/// than the operations themselves: connection trouble and absent paths are
/// recoverable, a rejected adapter credential is not.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Establish (or re-establish) the adapter's own session.
    async fn authenticate(&self) -> Result<(), StoreError>;

    /// Read the value at `path`. Absent paths are `StoreError::NotFound`.
    async fn get_secret(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or replace the value at `path`.
    async fn put_secret(&self, path: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Remove the value at `path`. Deleting an absent path succeeds.
    async fn delete_secret(&self, path: &str) -> Result<(), StoreError>;

    /// Cheap liveness probe; never errors.
    async fn is_connected(&self) -> bool;
}
