//! Composition root for the backend.

use crate::renewal::HttpRenewalClient;
use keygate_auth::{EventSink, RenewalClient, TokenVerifier, TokenVerifierConfig, TracingEventSink};
use keygate_cache::{Cache, EncryptedCache, MemoryCache};
use keygate_config::Settings;
use keygate_core::{Clock, SystemClock};
use keygate_error::Error;
use keygate_resilience::RetryStrategy;
use keygate_store::{SecretStore, VaultHttpConfig, VaultHttpStore};
use keygate_token::{
    CacheRevocationSet, KeyRing, RevocationSet, TokenCodec, TokenCodecConfig, run_key_refresh,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
}

/// Full production wiring: vault-backed signing key, encrypted cache for
/// the revocation set, renewal delegated to the gateway.
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

    let keyring = Arc::new(KeyRing::load(store.as_ref()).await.map_err(Error::from)?);
    tokio::spawn(run_key_refresh(
        Arc::clone(&keyring),
        Arc::clone(&store),
        settings.token.key_refresh_interval,
        shutdown,
    ));

    let cache: Arc<dyn Cache> = Arc::new(EncryptedCache::with_ephemeral_key(MemoryCache::new(
        settings.cache.capacity,
    )));
    let renewal: Arc<dyn RenewalClient> = Arc::new(HttpRenewalClient::new(
        &settings.backend.gateway_url,
        settings.backend.gateway_timeout,
    )?);

    Ok(build_with_deps(
        settings,
        keyring,
        cache,
        Some(renewal),
        Arc::new(SystemClock),
    ))
}

/// Wiring over injected leaves; tests use this with a manual clock and no
/// real gateway.
pub fn build_with_deps(
    settings: &Settings,
    keyring: Arc<KeyRing>,
    cache: Arc<dyn Cache>,
    renewal: Option<Arc<dyn RenewalClient>>,
    clock: Arc<dyn Clock>,
) -> AppState {
    let codec = Arc::new(TokenCodec::new(
        TokenCodecConfig {
            issuer: settings.token.issuer.clone(),
            audience: settings.token.audience.clone(),
            allowed_issuers: vec![settings.token.issuer.clone()],
            max_lifetime: settings.token.max_lifetime,
        },
        keyring,
    ));
    let revocations: Arc<dyn RevocationSet> = Arc::new(CacheRevocationSet::new(cache));
    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);

    let verifier = Arc::new(TokenVerifier::new(
        codec,
        revocations,
        renewal,
        events,
        clock,
        TokenVerifierConfig {
            renewal_enabled: settings.token.renewal_enabled,
            renewal_grace: settings.token.renewal_grace,
        },
    ));

    AppState { verifier }
}
