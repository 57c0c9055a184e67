//! Composition root.

use crate::forward::BackendForwarder;
use keygate_auth::{AuthService, AuthServiceConfig, EventSink, TracingEventSink};
use keygate_cache::{Cache, EncryptedCache, MemoryCache};
use keygate_config::Settings;
use keygate_core::{Clock, SystemClock};
use keygate_error::Error;
use keygate_resilience::{CircuitBreaker, RetryStrategy};
use keygate_rotation::{RotationDriver, RotationManager, RotationManagerConfig};
use keygate_store::{SecretStore, VaultHttpConfig, VaultHttpStore};
use keygate_token::{CacheRevocationSet, KeyRing, TokenCodec, TokenCodecConfig, run_key_refresh};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub rotation: Arc<RotationManager>,
    pub forwarder: Arc<BackendForwarder>,
}

/// Wire the full production dependency graph from settings.
///
/// Talks to the vault immediately (session + signing key); refusing to
/// start beats starting blind.
pub async fn build(settings: &Settings, shutdown: CancellationToken) -> Result<AppState, Error> {
    let store: Arc<dyn SecretStore> = Arc::new(
        VaultHttpStore::new(VaultHttpConfig {
            address: settings.vault.address.clone(),
            path_prefix: settings.vault.path_prefix.clone(),
            client_identity_pem: settings.vault.client_identity_pem.clone(),
            ca_cert_pem: settings.vault.ca_cert_pem.clone(),
            connect_timeout: settings.vault.connect_timeout,
            read_timeout: settings.vault.read_timeout,
            retry: RetryStrategy::exponential(
                settings.vault.retry_count,
                settings.vault.retry_base_delay,
                settings.vault.retry_backoff_multiplier,
            ),
        })
        .map_err(Error::from)?,
    );
    store.authenticate().await.map_err(Error::from)?;

    // Values in the cache tier carry tokens and credential metadata, so the
    // whole tier is encrypted at rest. The key is ephemeral: cache entries
    // are rebuildable and need not survive a restart.
    let cache: Arc<dyn Cache> = Arc::new(EncryptedCache::with_ephemeral_key(MemoryCache::new(
        settings.cache.capacity,
    )));

    let keyring = Arc::new(KeyRing::load(store.as_ref()).await.map_err(Error::from)?);
    tokio::spawn(run_key_refresh(
        Arc::clone(&keyring),
        Arc::clone(&store),
        settings.token.key_refresh_interval,
        shutdown.clone(),
    ));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    build_with_deps(settings, store, cache, keyring, clock, shutdown)
}

/// Wire the service graph over injected leaf dependencies. Production goes
/// through [`build`]; tests hand in memory-backed stores and a manual
/// clock.
pub fn build_with_deps(
    settings: &Settings,
    store: Arc<dyn SecretStore>,
    cache: Arc<dyn Cache>,
    keyring: Arc<KeyRing>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) -> Result<AppState, Error> {
    let codec = Arc::new(TokenCodec::new(
        TokenCodecConfig {
            issuer: settings.token.issuer.clone(),
            audience: settings.token.audience.clone(),
            allowed_issuers: vec![settings.token.issuer.clone()],
            max_lifetime: settings.token.max_lifetime,
        },
        keyring,
    ));
    let revocations = Arc::new(CacheRevocationSet::new(Arc::clone(&cache)));
    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let vault_breaker = Arc::new(CircuitBreaker::new("vault"));

    let auth = Arc::new(AuthService::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        Arc::clone(&codec),
        revocations,
        events,
        Arc::clone(&clock),
        vault_breaker,
        settings.rotation.accept_deprecated,
        AuthServiceConfig {
            token_lifetime: settings.token.lifetime,
            token_cache_ttl: settings.cache.effective_token_ttl(settings.token.lifetime),
            cred_meta_ttl: settings.cache.cred_meta_ttl,
            transition_cache_ttl: settings.cache.transition_ttl,
            clock_skew: settings.token.clock_skew,
            mint_lock_timeout: settings.gateway.mint_lock_timeout,
            renewal_enabled: settings.token.renewal_enabled,
            renewal_grace: settings.token.renewal_grace,
            degraded_enabled: settings.degraded_mode.enabled,
        },
    ));

    let rotation = Arc::new(RotationManager::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        Arc::clone(&clock),
        RotationManagerConfig {
            default_transition_minutes: settings.rotation.default_transition_minutes,
            min_transition_minutes: keygate_config::MIN_TRANSITION_MINUTES,
            lock_ttl: settings.rotation.lock_ttl,
            finalize_grace: settings.token.lifetime,
        },
    ));

    let driver = RotationDriver::new(Arc::clone(&rotation), settings.rotation.check_interval);
    tokio::spawn(driver.run(shutdown));

    let forwarder = Arc::new(BackendForwarder::new(
        settings.gateway.backend_url.clone(),
        settings.gateway.backend_timeout,
    )?);

    Ok(AppState {
        auth,
        rotation,
        forwarder,
    })
}
