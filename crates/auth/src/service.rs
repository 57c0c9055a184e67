//! Gateway authentication service.

use crate::{AuthEvent, AuthEventType, AuthOutcome, EventSink};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use keygate_cache::{Cache, keys};
use keygate_core::{ClientId, Clock, CorrelationId, SecretString};
use keygate_credential::{ClientCredential, CredentialValidator, TransitionRecord};
use keygate_error::{Error, ErrorKind};
use keygate_resilience::{Bulkhead, CircuitBreaker, ResilienceError};
use keygate_store::{SecretStore, paths};
use keygate_token::{TokenCodec, Verdict};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Per-request context threaded into events and logs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: CorrelationId,
    pub source_addr: Option<String>,
}

impl RequestContext {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            source_addr: None,
        }
    }

    pub fn with_source(mut self, addr: impl Into<String>) -> Self {
        self.source_addr = Some(addr.into());
        self
    }
}

/// Token handed back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
    /// Minted from cached credential metadata (vault outage). Internal
    /// only; the wire response never carries it.
    pub degraded: bool,
}

/// Cached token entry under `token:{client_id}:{jti}`.
#[derive(Debug, Serialize, Deserialize)]
struct TokenCacheEntry {
    token: String,
    jti: String,
    exp: i64,
    #[serde(default)]
    degraded: bool,
}

#[derive(Debug, Clone)]
pub struct AuthServiceConfig {
    pub token_lifetime: Duration,
    /// TTL for cached tokens; effectively the token lifetime.
    pub token_cache_ttl: Duration,
    pub cred_meta_ttl: Duration,
    /// Micro-cache TTL for transition records.
    pub transition_cache_ttl: Duration,
    /// Freshness margin when serving cached tokens.
    pub clock_skew: Duration,
    /// Bounded wait for the per-client mint lock.
    pub mint_lock_timeout: Duration,
    pub renewal_enabled: bool,
    pub renewal_grace: Duration,
    pub degraded_enabled: bool,
}

impl Default for AuthServiceConfig {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::from_secs(3600),
            token_cache_ttl: Duration::from_secs(3600),
            cred_meta_ttl: Duration::from_secs(900),
            transition_cache_ttl: Duration::from_secs(5),
            clock_skew: Duration::from_secs(30),
            mint_lock_timeout: Duration::from_secs(5),
            renewal_enabled: true,
            renewal_grace: Duration::from_secs(300),
            degraded_enabled: true,
        }
    }
}

/// Validate → mint → cache orchestration for the gateway.
///
/// Concurrency contract: any number of callers; the per-client mutex keeps
/// at most one mint in flight per client in this process, and waiters
/// re-check the token cache before minting themselves.
pub struct AuthService {
    store: Arc<dyn SecretStore>,
    cache: Arc<dyn Cache>,
    codec: Arc<TokenCodec>,
    revocations: Arc<dyn keygate_token::RevocationSet>,
    validator: CredentialValidator,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    vault_breaker: Arc<CircuitBreaker>,
    vault_bulkhead: Bulkhead,
    cache_bulkhead: Bulkhead,
    mint_locks: DashMap<ClientId, Arc<Mutex<()>>>,
    config: AuthServiceConfig,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn SecretStore>,
        cache: Arc<dyn Cache>,
        codec: Arc<TokenCodec>,
        revocations: Arc<dyn keygate_token::RevocationSet>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        vault_breaker: Arc<CircuitBreaker>,
        accept_deprecated: bool,
        config: AuthServiceConfig,
    ) -> Self {
        Self {
            store,
            cache,
            codec,
            revocations,
            validator: CredentialValidator::new(accept_deprecated),
            events,
            clock,
            vault_breaker,
            vault_bulkhead: Bulkhead::new("vault", 32),
            cache_bulkhead: Bulkhead::new("cache", 64),
            mint_locks: DashMap::new(),
            config,
        }
    }

    /// Authenticate header credentials and return a live token.
    ///
    /// Serves from the token cache when possible; otherwise validates
    /// against the acceptable credential-version set and mints. Falls back
    /// to cached credential metadata when the vault is unreachable and
    /// degraded mode is on.
    #[tracing::instrument(
        skip(self, secret, ctx),
        fields(client_id = %client_id, correlation_id = %ctx.correlation_id)
    )]
    pub async fn authenticate(
        &self,
        client_id: &ClientId,
        secret: &SecretString,
        ctx: &RequestContext,
    ) -> keygate_error::Result<IssuedToken> {
        if let Some(token) = self.cached_token(client_id).await {
            tracing::debug!("serving cached token");
            return Ok(token);
        }

        // One mint per client per process; everyone else waits briefly and
        // re-checks the cache.
        let lock = self.mint_lock(client_id);
        let guard = tokio::time::timeout(self.config.mint_lock_timeout, lock.lock()).await;
        let _guard = match guard {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("mint lock wait exceeded");
                return Err(Error::dependency_unavailable(
                    "authentication busy, retry shortly",
                ));
            }
        };

        if let Some(token) = self.cached_token(client_id).await {
            tracing::debug!("token minted by concurrent request");
            return Ok(token);
        }

        match self.validate_against_store(client_id, secret).await {
            Ok(Some(record)) => {
                let token = self.mint_and_cache(client_id, &record, false, ctx).await?;
                Ok(token)
            }
            Ok(None) => {
                self.emit(
                    AuthEventType::Authentication,
                    AuthOutcome::Failure,
                    Some(client_id.clone()),
                    false,
                    ctx,
                )
                .await;
                Err(Error::authentication("invalid client credentials"))
            }
            Err(e) if e.kind == ErrorKind::DependencyUnavailable && self.config.degraded_enabled => {
                self.authenticate_degraded(client_id, secret, ctx).await
            }
            Err(e) => Err(e),
        }
    }

    /// Is this token currently valid? Powers `POST /api/v1/auth/validate`.
    pub async fn validate_token(&self, token: &str) -> bool {
        self.codec
            .verify(token, self.clock.now(), self.revocations.as_ref())
            .await
            .is_valid()
    }

    /// Renew a token: valid tokens re-mint immediately, expired ones only
    /// inside the renewal grace window.
    #[tracing::instrument(skip(self, token, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn renew_token(
        &self,
        token: &str,
        ctx: &RequestContext,
    ) -> keygate_error::Result<IssuedToken> {
        if !self.config.renewal_enabled {
            return Err(Error::authentication("token renewal is disabled"));
        }

        let now = self.clock.now();
        let claims = match self
            .codec
            .verify(token, now, self.revocations.as_ref())
            .await
        {
            Verdict::Valid(claims) => claims,
            Verdict::Expired(claims) => {
                let past_expiry = now.timestamp() - claims.exp;
                if past_expiry > self.config.renewal_grace.as_secs() as i64 {
                    self.emit(
                        AuthEventType::TokenRenewal,
                        AuthOutcome::Failure,
                        ClientId::new(&claims.sub).ok(),
                        false,
                        ctx,
                    )
                    .await;
                    return Err(Error::authentication("renewal window elapsed"));
                }
                claims
            }
            Verdict::Invalid(reason) => {
                tracing::debug!(?reason, "renewal rejected");
                self.emit(
                    AuthEventType::TokenRenewal,
                    AuthOutcome::Failure,
                    None,
                    false,
                    ctx,
                )
                .await;
                return Err(Error::authentication("token invalid"));
            }
        };

        let client_id = ClientId::new(&claims.sub)
            .map_err(|_| Error::internal("token subject is not a valid client id"))?;

        let minted = self
            .codec
            .mint(
                &client_id,
                claims.permissions,
                self.config.token_lifetime,
                claims.degraded,
                now,
            )
            .map_err(Error::from)?;
        let issued = self.cache_minted(&client_id, &minted).await;
        self.emit(
            AuthEventType::TokenRenewal,
            AuthOutcome::Success,
            Some(client_id),
            claims.degraded,
            ctx,
        )
        .await;
        Ok(issued)
    }

    // ── internals ──────────────────────────────────────────────────────────

    /// Cheapest path: a live cached token for this client. Cache trouble
    /// reads as a miss.
    async fn cached_token(&self, client_id: &ClientId) -> Option<IssuedToken> {
        let now = self.clock.now();
        let prefix = keys::token_prefix(client_id);
        let keys = match self
            .cache_bulkhead
            .execute(|| self.cache.scan_prefix(&prefix))
            .await
        {
            Ok(keys) => keys,
            Err(e) => {
                tracing::debug!(error = %e, "token cache scan failed, treating as miss");
                return None;
            }
        };

        for key in keys {
            let Ok(Some(bytes)) = self.cache.get(&key).await else {
                continue;
            };
            let Ok(entry) = serde_json::from_slice::<TokenCacheEntry>(&bytes) else {
                continue;
            };
            if entry.exp > (now + chrono::Duration::from_std(self.config.clock_skew).unwrap_or_default()).timestamp() {
                return Some(IssuedToken {
                    expires_at: DateTime::from_timestamp(entry.exp, 0)?,
                    token: entry.token,
                    jti: entry.jti,
                    degraded: entry.degraded,
                });
            }
        }
        None
    }

    /// Resolve the acceptable credential-version set and try each
    /// candidate. `Ok(None)` means every candidate rejected the secret.
    async fn validate_against_store(
        &self,
        client_id: &ClientId,
        secret: &SecretString,
    ) -> keygate_error::Result<Option<ClientCredential>> {
        let candidates = self.acceptable_records(client_id).await?;
        for record in candidates {
            if self.validator.validate(secret, &record) {
                self.warm_cred_meta(client_id, &record).await;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// The records a client may currently authenticate against: both ends
    /// of a live transition, otherwise the single default record.
    async fn acceptable_records(
        &self,
        client_id: &ClientId,
    ) -> keygate_error::Result<Vec<ClientCredential>> {
        if let Some(transition) = self.transition_record(client_id).await? {
            if transition.broadens_acceptance() {
                let mut records = Vec::with_capacity(2);
                for version in [&transition.old_version, &transition.new_version] {
                    match self
                        .store_read(&paths::cred_version(client_id, version))
                        .await?
                    {
                        Some(bytes) => records.push(parse_credential(&bytes)?),
                        None => tracing::warn!(
                            version = %version,
                            "transition references a missing credential record"
                        ),
                    }
                }
                return Ok(records);
            }
        }

        match self.store_read(&paths::cred_default(client_id)).await? {
            Some(bytes) => Ok(vec![parse_credential(&bytes)?]),
            // Unknown client reads as "no candidates"; the caller turns
            // that into the same 401 as a wrong secret.
            None => Ok(Vec::new()),
        }
    }

    /// Live transition record, micro-cached for a few seconds so a mint
    /// burst does not hammer the vault.
    async fn transition_record(
        &self,
        client_id: &ClientId,
    ) -> keygate_error::Result<Option<TransitionRecord>> {
        let cache_key = keys::transition(client_id);
        if let Ok(Some(bytes)) = self.cache.get(&cache_key).await {
            if let Ok(record) = TransitionRecord::from_bytes(&bytes) {
                return Ok(Some(record));
            }
        }

        let Some(bytes) = self.store_read(&paths::transition(client_id)).await? else {
            return Ok(None);
        };
        let record = TransitionRecord::from_bytes(&bytes)
            .map_err(|_| Error::internal("transition record corrupted"))?;

        if let Err(e) = self
            .cache
            .set_with_ttl(&cache_key, &bytes, self.config.transition_cache_ttl)
            .await
        {
            tracing::debug!(error = %e, "transition micro-cache write failed");
        }
        Ok(Some(record))
    }

    /// Vault read through the circuit breaker and bulkhead. `Ok(None)` is
    /// not-found; connection trouble, an open circuit and a saturated
    /// bulkhead all surface as `DependencyUnavailable`.
    async fn store_read(&self, path: &str) -> keygate_error::Result<Option<Vec<u8>>> {
        let result = self
            .vault_breaker
            .execute(
                || self.vault_bulkhead.execute(|| self.store.get_secret(path)),
                |e| matches!(e, ResilienceError::Inner(s) if s.is_connection()),
            )
            .await;

        match result {
            Ok(bytes) => Ok(Some(bytes)),
            Err(ResilienceError::CircuitOpen { .. }) => {
                Err(Error::dependency_unavailable("secret store circuit open"))
            }
            Err(ResilienceError::Inner(ResilienceError::Inner(e))) => {
                if e.is_not_found() {
                    Ok(None)
                } else {
                    Err(e.into())
                }
            }
            Err(ResilienceError::Inner(ResilienceError::BulkheadFull { .. })) => {
                Err(Error::dependency_unavailable("secret store saturated"))
            }
            Err(_) => Err(Error::dependency_unavailable("secret store unavailable")),
        }
    }

    /// Vault-outage fallback: validate against cached credential metadata.
    async fn authenticate_degraded(
        &self,
        client_id: &ClientId,
        secret: &SecretString,
        ctx: &RequestContext,
    ) -> keygate_error::Result<IssuedToken> {
        let cached = self.cache.get(&keys::cred_meta(client_id)).await;
        let Ok(Some(bytes)) = cached else {
            tracing::error!(
                client_id = %client_id,
                "vault unreachable and no cached credential metadata; failing closed"
            );
            return Err(Error::dependency_unavailable(
                "authentication temporarily unavailable",
            ));
        };
        let record = parse_credential(&bytes)?;

        if self.validator.validate(secret, &record) {
            tracing::warn!(client_id = %client_id, "authenticated in degraded mode");
            self.mint_and_cache(client_id, &record, true, ctx).await
        } else {
            self.emit(
                AuthEventType::Authentication,
                AuthOutcome::Failure,
                Some(client_id.clone()),
                true,
                ctx,
            )
            .await;
            Err(Error::authentication("invalid client credentials"))
        }
    }

    async fn mint_and_cache(
        &self,
        client_id: &ClientId,
        record: &ClientCredential,
        degraded: bool,
        ctx: &RequestContext,
    ) -> keygate_error::Result<IssuedToken> {
        let minted = self
            .codec
            .mint(
                client_id,
                record.permissions.clone(),
                self.config.token_lifetime,
                degraded,
                self.clock.now(),
            )
            .map_err(Error::from)?;

        let issued = self.cache_minted(client_id, &minted).await;
        self.emit(
            AuthEventType::Authentication,
            AuthOutcome::Success,
            Some(client_id.clone()),
            degraded,
            ctx,
        )
        .await;
        Ok(issued)
    }

    /// Best-effort cache write for a fresh token; the token is returned to
    /// the caller either way.
    async fn cache_minted(
        &self,
        client_id: &ClientId,
        minted: &keygate_token::MintedToken,
    ) -> IssuedToken {
        let entry = TokenCacheEntry {
            token: minted.token.clone(),
            jti: minted.claims.jti.clone(),
            exp: minted.claims.exp,
            degraded: minted.claims.degraded,
        };
        match serde_json::to_vec(&entry) {
            Ok(bytes) => {
                if let Err(e) = self
                    .cache
                    .set_with_ttl(
                        &keys::token(client_id, &minted.claims.jti),
                        &bytes,
                        self.config.token_cache_ttl.min(self.config.token_lifetime),
                    )
                    .await
                {
                    tracing::warn!(error = %e, "token cache write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "token cache entry serialization failed"),
        }

        IssuedToken {
            token: minted.token.clone(),
            jti: minted.claims.jti.clone(),
            expires_at: DateTime::from_timestamp(minted.claims.exp, 0)
                .unwrap_or_else(|| self.clock.now()),
            degraded: minted.claims.degraded,
        }
    }

    /// Keep the degraded-mode fallback warm after a successful vault read.
    async fn warm_cred_meta(&self, client_id: &ClientId, record: &ClientCredential) {
        match record.to_bytes() {
            Ok(bytes) => {
                if let Err(e) = self
                    .cache
                    .set_with_ttl(
                        &keys::cred_meta(client_id),
                        &bytes,
                        self.config.cred_meta_ttl,
                    )
                    .await
                {
                    tracing::debug!(error = %e, "cred_meta cache write failed");
                }
            }
            Err(e) => tracing::debug!(error = %e, "cred_meta serialization failed"),
        }
    }

    fn mint_lock(&self, client_id: &ClientId) -> Arc<Mutex<()>> {
        self.mint_locks
            .entry(client_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn emit(
        &self,
        event_type: AuthEventType,
        outcome: AuthOutcome,
        client_id: Option<ClientId>,
        degraded: bool,
        ctx: &RequestContext,
    ) {
        self.events
            .emit(AuthEvent {
                timestamp: self.clock.now(),
                event_type,
                outcome,
                client_id,
                correlation_id: ctx.correlation_id.clone(),
                source_addr: ctx.source_addr.clone(),
                degraded,
            })
            .await;
    }
}

fn parse_credential(bytes: &[u8]) -> keygate_error::Result<ClientCredential> {
    ClientCredential::from_bytes(bytes)
        .map_err(|_| Error::internal("credential record corrupted"))
}
