//! Encryption-at-rest wrapper for cache values.
//!
//! Token strings and credential metadata pass through the cache tier; this
//! wrapper makes sure they do so as AES-256-GCM ciphertext. Keys stay in
//! the clear (they carry no secret material, only identifiers).

use crate::{Cache, CacheError};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use std::time::Duration;

const NONCE_LEN: usize = 12;

/// [`Cache`] decorator encrypting every value.
///
/// The wire layout per entry is `nonce || ciphertext`; the nonce is fresh
/// per write. An entry that fails to decrypt (key rolled, corrupt backend)
/// is treated as absent and removed — a cache may always lose entries.
pub struct EncryptedCache<C> {
    inner: C,
    cipher: Aes256Gcm,
}

impl<C: Cache> EncryptedCache<C> {
    pub fn new(inner: C, key: &[u8; 32]) -> Self {
        Self {
            inner,
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Wrap with a freshly generated key. Entries do not survive a restart,
    /// which is exactly the property wanted for a process-local cache.
    pub fn with_ephemeral_key(inner: C) -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self {
            inner,
            cipher: Aes256Gcm::new(&key),
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CacheError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext =
            self.cipher
                .encrypt(&nonce, plaintext)
                .map_err(|_| CacheError::Backend {
                    reason: "encryption failure".into(),
                })?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CacheError> {
        if sealed.len() < NONCE_LEN {
            return Err(CacheError::Decryption);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CacheError::Decryption)
    }
}

#[async_trait]
impl<C: Cache> Cache for EncryptedCache<C> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let Some(sealed) = self.inner.get(key).await? else {
            return Ok(None);
        };
        match self.open(&sealed) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(_) => {
                tracing::warn!(key, "dropping undecryptable cache entry");
                self.inner.delete(key).await?;
                Ok(None)
            }
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let sealed = self.seal(value)?;
        self.inner.set_with_ttl(key, &sealed, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        self.inner.scan_prefix(prefix).await
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.inner.invalidate_prefix(prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryCache;

    #[tokio::test]
    async fn test_round_trip() {
        let cache = EncryptedCache::new(MemoryCache::new(16), &[7u8; 32]);
        cache
            .set_with_ttl("token:acme:j1", b"bearer-token", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get("token:acme:j1").await.unwrap(),
            Some(b"bearer-token".to_vec())
        );
    }

    #[tokio::test]
    async fn test_backend_never_sees_plaintext() {
        let inner = MemoryCache::new(16);
        let cache = EncryptedCache::new(inner, &[7u8; 32]);
        cache
            .set_with_ttl("token:acme:j1", b"bearer-token", Duration::from_secs(60))
            .await
            .unwrap();

        // Read the raw entry straight from the wrapped cache.
        let raw = cache
            .inner
            .get("token:acme:j1")
            .await
            .unwrap()
            .expect("entry exists");
        assert_ne!(raw, b"bearer-token");
        assert!(
            !raw.windows(b"bearer-token".len()).any(|w| w == b"bearer-token"),
            "plaintext leaked into the backend"
        );
    }

    #[tokio::test]
    async fn test_wrong_key_reads_as_miss() {
        let inner = MemoryCache::new(16);
        let writer = EncryptedCache::new(inner, &[1u8; 32]);
        writer
            .set_with_ttl("k", b"v", Duration::from_secs(60))
            .await
            .unwrap();

        let reader = EncryptedCache::new(writer.inner, &[2u8; 32]);
        assert_eq!(reader.get("k").await.unwrap(), None);
        // and the poisoned entry is gone
        assert_eq!(reader.inner.get("k").await.unwrap(), None);
    }
}
