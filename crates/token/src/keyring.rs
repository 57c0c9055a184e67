//! Copy-on-write signing-key ring.

use crate::TokenError;
use arc_swap::ArcSwap;
use keygate_store::{SecretStore, paths};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Current and previous signing key.
///
/// Verifiers accept signatures under either key, which is what keeps the
/// fleet verifying tokens minted just before a key roll. Readers take a
/// lock-free snapshot; [`KeyRing::rotate_to`] swaps the whole pair.
pub struct KeyRing {
    keys: ArcSwap<KeyPair>,
}

#[derive(Clone)]
pub struct KeyPair {
    current: Vec<u8>,
    previous: Option<Vec<u8>>,
}

impl KeyPair {
    pub fn current(&self) -> &[u8] {
        &self.current
    }

    pub fn previous(&self) -> Option<&[u8]> {
        self.previous.as_deref()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("has_previous", &self.previous.is_some())
            .finish_non_exhaustive()
    }
}

impl KeyRing {
    pub fn new(initial: Vec<u8>) -> Self {
        Self {
            keys: ArcSwap::from_pointee(KeyPair {
                current: initial,
                previous: None,
            }),
        }
    }

    /// Read the signing key from the secret store at service start.
    pub async fn load(store: &dyn SecretStore) -> Result<Self, TokenError> {
        let material = store
            .get_secret(paths::TOKEN_SIGNING_KEY)
            .await
            .map_err(|e| TokenError::KeyUnavailable(e.to_string()))?;
        Ok(Self::new(material))
    }

    /// Lock-free snapshot for mint/verify.
    pub fn snapshot(&self) -> Arc<KeyPair> {
        self.keys.load_full()
    }

    /// Install a new current key; the displaced one stays verifiable.
    pub fn rotate_to(&self, new_material: Vec<u8>) {
        let old = self.keys.load_full();
        self.keys.store(Arc::new(KeyPair {
            current: new_material,
            previous: Some(old.current.clone()),
        }));
        tracing::info!("token signing key rotated");
    }

    /// Re-read the key from the store; swap only when it changed.
    /// Returns whether a swap happened.
    pub async fn refresh_from(&self, store: &dyn SecretStore) -> Result<bool, TokenError> {
        let material = store
            .get_secret(paths::TOKEN_SIGNING_KEY)
            .await
            .map_err(|e| TokenError::KeyUnavailable(e.to_string()))?;
        if material == self.keys.load().current {
            return Ok(false);
        }
        self.rotate_to(material);
        Ok(true)
    }
}

/// Periodic key refresh, cancellable on shutdown.
///
/// A failed refresh keeps the old key and tries again next tick; there is
/// no correct way to verify tokens with no key at all.
pub async fn run_key_refresh(
    ring: Arc<KeyRing>,
    store: Arc<dyn SecretStore>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of `interval` fires immediately; the key was already
    // loaded at startup, so skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match ring.refresh_from(store.as_ref()).await {
                    Ok(true) => tracing::info!("signing key refreshed from store"),
                    Ok(false) => tracing::debug!("signing key unchanged"),
                    Err(e) => tracing::warn!(error = %e, "signing key refresh failed"),
                }
            }
            () = shutdown.cancelled() => {
                tracing::debug!("key refresh loop shutting down");
                return;
            }
        }
    }
}
