//! Backend token verification service.

use crate::{AuthEvent, AuthEventType, AuthOutcome, EventSink};
use async_trait::async_trait;
use keygate_core::{ClientId, Clock, CorrelationId};
use keygate_token::{Claims, InvalidReason, RevocationSet, TokenCodec, Verdict};
use std::sync::Arc;
use std::time::Duration;

/// Client for delegating renewal to the gateway, which is the sole minter.
#[async_trait]
pub trait RenewalClient: Send + Sync {
    /// Exchange an expired-but-in-grace token for a fresh one.
    async fn renew(&self, token: &str) -> keygate_error::Result<String>;
}

#[derive(Debug, Clone)]
pub struct TokenVerifierConfig {
    pub renewal_enabled: bool,
    /// How long past expiry a token may still be renewed.
    pub renewal_grace: Duration,
}

impl Default for TokenVerifierConfig {
    fn default() -> Self {
        Self {
            renewal_enabled: true,
            renewal_grace: Duration::from_secs(300),
        }
    }
}

/// Outcome of verifying (and possibly renewing) a bearer token.
///
/// Mirrors the internal wire shape: the HTTP layer serializes this
/// directly into the `/internal/v1/tokens/validate` response.
#[derive(Debug, Clone, Default)]
pub struct VerificationOutcome {
    pub is_valid: bool,
    pub is_expired: bool,
    pub is_forbidden: bool,
    pub is_renewed: bool,
    pub error_message: Option<String>,
    pub renewed_token: Option<String>,
    /// Claims of the accepted token; `None` unless `is_valid`.
    pub claims: Option<Claims>,
}

impl VerificationOutcome {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Verify → renew-in-grace → permission check.
pub struct TokenVerifier {
    codec: Arc<TokenCodec>,
    revocations: Arc<dyn RevocationSet>,
    renewal: Option<Arc<dyn RenewalClient>>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: TokenVerifierConfig,
}

impl TokenVerifier {
    pub fn new(
        codec: Arc<TokenCodec>,
        revocations: Arc<dyn RevocationSet>,
        renewal: Option<Arc<dyn RenewalClient>>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: TokenVerifierConfig,
    ) -> Self {
        Self {
            codec,
            revocations,
            renewal,
            events,
            clock,
            config,
        }
    }

    /// Verify a bearer token and, when given, check one required
    /// permission against its claims.
    #[tracing::instrument(skip(self, token, correlation_id), fields(correlation_id = %correlation_id))]
    pub async fn verify(
        &self,
        token: &str,
        required_permission: Option<&str>,
        correlation_id: &CorrelationId,
    ) -> VerificationOutcome {
        let now = self.clock.now();
        match self
            .codec
            .verify(token, now, self.revocations.as_ref())
            .await
        {
            Verdict::Valid(claims) => self.check_permission(claims, required_permission, false, None),
            Verdict::Expired(claims) => {
                self.handle_expired(token, claims, required_permission, correlation_id)
                    .await
            }
            Verdict::Invalid(reason) => {
                tracing::debug!(?reason, "token rejected");
                self.emit_failure(AuthEventType::TokenVerification, None, correlation_id)
                    .await;
                VerificationOutcome::rejected(describe(reason))
            }
        }
    }

    async fn handle_expired(
        &self,
        token: &str,
        claims: Claims,
        required_permission: Option<&str>,
        correlation_id: &CorrelationId,
    ) -> VerificationOutcome {
        let now = self.clock.now().timestamp();
        let past_expiry = now - claims.exp;
        let client_id = ClientId::new(&claims.sub).ok();

        let renewable = self.config.renewal_enabled
            && past_expiry <= self.config.renewal_grace.as_secs() as i64;
        let Some(renewal) = self.renewal.as_ref().filter(|_| renewable) else {
            self.emit_failure(AuthEventType::TokenVerification, client_id, correlation_id)
                .await;
            return VerificationOutcome {
                is_expired: true,
                error_message: Some("token expired".into()),
                ..VerificationOutcome::default()
            };
        };

        match renewal.renew(token).await {
            Ok(new_token) => {
                // Trust nothing: the renewed token goes through the same
                // verification as any other.
                match self
                    .codec
                    .verify(&new_token, self.clock.now(), self.revocations.as_ref())
                    .await
                {
                    Verdict::Valid(new_claims) => {
                        tracing::info!(client_id = %new_claims.sub, "token renewed");
                        self.check_permission(
                            new_claims,
                            required_permission,
                            true,
                            Some(new_token),
                        )
                    }
                    _ => {
                        self.emit_failure(AuthEventType::TokenRenewal, client_id, correlation_id)
                            .await;
                        VerificationOutcome::rejected("renewed token failed verification")
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "renewal delegation failed");
                self.emit_failure(AuthEventType::TokenRenewal, client_id, correlation_id)
                    .await;
                VerificationOutcome {
                    is_expired: true,
                    error_message: Some("token expired and renewal failed".into()),
                    ..VerificationOutcome::default()
                }
            }
        }
    }

    fn check_permission(
        &self,
        claims: Claims,
        required_permission: Option<&str>,
        renewed: bool,
        renewed_token: Option<String>,
    ) -> VerificationOutcome {
        if let Some(required) = required_permission {
            if !claims.permissions.contains(required) {
                tracing::debug!(client_id = %claims.sub, required, "permission denied");
                return VerificationOutcome {
                    is_forbidden: true,
                    error_message: Some(format!("missing permission '{required}'")),
                    ..VerificationOutcome::default()
                };
            }
        }
        VerificationOutcome {
            is_valid: true,
            is_renewed: renewed,
            renewed_token,
            claims: Some(claims),
            ..VerificationOutcome::default()
        }
    }

    async fn emit_failure(
        &self,
        event_type: AuthEventType,
        client_id: Option<ClientId>,
        correlation_id: &CorrelationId,
    ) {
        self.events
            .emit(AuthEvent {
                timestamp: self.clock.now(),
                event_type,
                outcome: AuthOutcome::Failure,
                client_id,
                correlation_id: correlation_id.clone(),
                source_addr: None,
                degraded: false,
            })
            .await;
    }
}

fn describe(reason: InvalidReason) -> &'static str {
    match reason {
        InvalidReason::Malformed => "token malformed",
        InvalidReason::BadSignature => "token signature invalid",
        InvalidReason::IssuerNotAllowed => "token issuer not allowed",
        InvalidReason::AudienceMismatch => "token audience mismatch",
        InvalidReason::Revoked => "token revoked",
    }
}
