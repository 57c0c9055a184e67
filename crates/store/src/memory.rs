//! In-memory secret store for tests and local development.

use crate::{SecretStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Hash-map backed [`SecretStore`] with fault injection.
///
/// `fail_next(n)` makes the next `n` operations fail with a connection
/// error and `set_connected(false)` simulates a full outage; both are used
/// by the degraded-mode and rotation-rollback suites.
#[derive(Default)]
pub struct MemorySecretStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    secrets: HashMap<String, Vec<u8>>,
    connected: bool,
    skip_before_fail: u32,
    fail_next: u32,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                secrets: HashMap::new(),
                connected: true,
                skip_before_fail: 0,
                fail_next: 0,
            }),
        }
    }

    /// Fail the next `n` operations with a connection error.
    pub fn fail_next(&self, n: u32) {
        self.fail_after(0, n);
    }

    /// Let `skip` operations through, then fail the following `count`.
    pub fn fail_after(&self, skip: u32, count: u32) {
        let mut inner = self.inner.lock();
        inner.skip_before_fail = skip;
        inner.fail_next = count;
    }

    /// Simulate the store being (un)reachable.
    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().connected = connected;
    }

    /// Number of stored secrets; test assertion helper.
    pub fn len(&self) -> usize {
        self.inner.lock().secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a path currently holds a value.
    pub fn contains(&self, path: &str) -> bool {
        self.inner.lock().secrets.contains_key(path)
    }

    fn check_faults(inner: &mut Inner) -> Result<(), StoreError> {
        if !inner.connected {
            return Err(StoreError::connection("store offline"));
        }
        if inner.fail_next > 0 {
            if inner.skip_before_fail > 0 {
                inner.skip_before_fail -= 1;
                return Ok(());
            }
            inner.fail_next -= 1;
            return Err(StoreError::connection("injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn authenticate(&self) -> Result<(), StoreError> {
        Self::check_faults(&mut self.inner.lock())
    }

    async fn get_secret(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let mut inner = self.inner.lock();
        Self::check_faults(&mut inner)?;
        inner
            .secrets
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_owned(),
            })
    }

    async fn put_secret(&self, path: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::check_faults(&mut inner)?;
        inner.secrets.insert(path.to_owned(), value.to_vec());
        Ok(())
    }

    async fn delete_secret(&self, path: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::check_faults(&mut inner)?;
        inner.secrets.remove(path);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemorySecretStore::new();
        store.put_secret("creds/acme", b"record").await.unwrap();
        assert_eq!(store.get_secret("creds/acme").await.unwrap(), b"record");
        store.delete_secret("creds/acme").await.unwrap();
        assert!(store.get_secret("creds/acme").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemorySecretStore::new();
        store.delete_secret("creds/ghost").await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_next_injects_connection_errors() {
        let store = MemorySecretStore::new();
        store.put_secret("creds/acme", b"record").await.unwrap();
        store.fail_next(2);
        assert!(store.get_secret("creds/acme").await.unwrap_err().is_connection());
        assert!(store.get_secret("creds/acme").await.unwrap_err().is_connection());
        assert!(store.get_secret("creds/acme").await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect() {
        let store = MemorySecretStore::new();
        store.set_connected(false);
        assert!(!store.is_connected().await);
        assert!(store.authenticate().await.unwrap_err().is_connection());
    }
}
