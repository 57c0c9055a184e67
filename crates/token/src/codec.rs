//! Mint and verify.

use crate::{Claims, KeyRing, RevocationSet, TokenError};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use keygate_core::{ClientId, PermissionSet};
use std::sync::Arc;
use std::time::Duration;

/// Static identity configuration of the codec.
#[derive(Debug, Clone)]
pub struct TokenCodecConfig {
    /// `iss` stamped into minted tokens.
    pub issuer: String,
    /// `aud` stamped into minted tokens and demanded on verify.
    pub audience: String,
    /// Issuers accepted on verify.
    pub allowed_issuers: Vec<String>,
    /// Ceiling for any requested lifetime.
    pub max_lifetime: Duration,
}

/// A freshly minted token with its decoded claims.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub claims: Claims,
}

/// Verification outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Valid(Claims),
    /// Structurally sound and correctly signed, but past `exp`. The claims
    /// are returned so renewal can re-mint for the same subject.
    Expired(Claims),
    Invalid(InvalidReason),
}

/// Why a token failed verification. Kept coarse: callers branch on it, the
/// detail stays in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    Malformed,
    BadSignature,
    IssuerNotAllowed,
    AudienceMismatch,
    Revoked,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// HS256 token codec over the key ring.
pub struct TokenCodec {
    config: TokenCodecConfig,
    keys: Arc<KeyRing>,
}

impl TokenCodec {
    pub fn new(config: TokenCodecConfig, keys: Arc<KeyRing>) -> Self {
        Self { config, keys }
    }

    pub fn config(&self) -> &TokenCodecConfig {
        &self.config
    }

    /// Mint a token for `subject` with the given permissions.
    pub fn mint(
        &self,
        subject: &ClientId,
        permissions: PermissionSet,
        lifetime: Duration,
        degraded: bool,
        now: DateTime<Utc>,
    ) -> Result<MintedToken, TokenError> {
        if lifetime.is_zero() || lifetime > self.config.max_lifetime {
            return Err(TokenError::LifetimeTooLong {
                requested: lifetime,
                max: self.config.max_lifetime,
            });
        }

        let iat = now.timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat,
            exp: iat + lifetime.as_secs() as i64,
            jti: uuid::Uuid::new_v4().to_string(),
            permissions,
            degraded,
        };

        let key = EncodingKey::from_secret(self.keys.snapshot().current());
        let token = encode(&Header::new(Algorithm::HS256), &claims, &key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;

        Ok(MintedToken { token, claims })
    }

    /// Verify `token` at `now`, consulting the revocation set last.
    pub async fn verify(
        &self,
        token: &str,
        now: DateTime<Utc>,
        revocations: &dyn RevocationSet,
    ) -> Verdict {
        let claims = match self.decode_against_ring(token) {
            Ok(claims) => claims,
            Err(reason) => return Verdict::Invalid(reason),
        };

        if !self
            .config
            .allowed_issuers
            .iter()
            .any(|iss| *iss == claims.iss)
        {
            return Verdict::Invalid(InvalidReason::IssuerNotAllowed);
        }
        if claims.aud != self.config.audience {
            return Verdict::Invalid(InvalidReason::AudienceMismatch);
        }
        if revocations.is_revoked(&claims.jti).await {
            return Verdict::Invalid(InvalidReason::Revoked);
        }
        if claims.is_expired_at(now.timestamp()) {
            return Verdict::Expired(claims);
        }
        Verdict::Valid(claims)
    }

    /// Signature + shape check against the current key, then the previous
    /// one. Expiry is judged by the caller against the injected clock, so
    /// the library-side `exp` handling is disabled here.
    fn decode_against_ring(&self, token: &str) -> Result<Claims, InvalidReason> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let snapshot = self.keys.snapshot();
        let mut keys = vec![snapshot.current()];
        keys.extend(snapshot.previous());

        let mut saw_bad_signature = false;
        for key in keys {
            match decode::<Claims>(token, &DecodingKey::from_secret(key), &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => match e.kind() {
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        saw_bad_signature = true;
                    }
                    _ => return Err(InvalidReason::Malformed),
                },
            }
        }

        Err(if saw_bad_signature {
            InvalidReason::BadSignature
        } else {
            InvalidReason::Malformed
        })
    }
}
