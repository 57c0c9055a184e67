//! Backend-side verification and renewal delegation.

use async_trait::async_trait;
use keygate_auth::{RecordingEventSink, RenewalClient, TokenVerifier, TokenVerifierConfig};
use keygate_cache::{Cache, MemoryCache};
use keygate_core::{ClientId, Clock, CorrelationId, ManualClock, PermissionSet};
use keygate_token::{CacheRevocationSet, KeyRing, RevocationSet, TokenCodec, TokenCodecConfig};
use std::sync::Arc;
use std::time::Duration;

const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

fn codec() -> Arc<TokenCodec> {
    Arc::new(TokenCodec::new(
        TokenCodecConfig {
            issuer: "keygate-gateway".into(),
            audience: "keygate-backend".into(),
            allowed_issuers: vec!["keygate-gateway".into()],
            max_lifetime: Duration::from_secs(3600),
        },
        Arc::new(KeyRing::new(KEY.to_vec())),
    ))
}

/// Renewal stub standing in for the gateway: mints a fresh token for the
/// same subject.
struct FakeGateway {
    codec: Arc<TokenCodec>,
    clock: ManualClock,
    fail: bool,
}

#[async_trait]
impl RenewalClient for FakeGateway {
    async fn renew(&self, _token: &str) -> keygate_error::Result<String> {
        if self.fail {
            return Err(keygate_error::Error::dependency_unavailable(
                "gateway unreachable",
            ));
        }
        let minted = self
            .codec
            .mint(
                &ClientId::new("acme").unwrap(),
                ["payments:execute"].into_iter().collect::<PermissionSet>(),
                Duration::from_secs(3600),
                false,
                self.clock.now(),
            )
            .map_err(keygate_error::Error::from)?;
        Ok(minted.token)
    }
}

struct Harness {
    codec: Arc<TokenCodec>,
    clock: ManualClock,
    revocations: Arc<CacheRevocationSet>,
    verifier: TokenVerifier,
}

fn harness(renewal_enabled: bool, gateway_fails: bool) -> Harness {
    let clock = ManualClock::starting_now();
    let codec = codec();
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::with_clock(64, Arc::new(clock.clone())));
    let revocations = Arc::new(CacheRevocationSet::new(cache));
    let renewal: Arc<dyn RenewalClient> = Arc::new(FakeGateway {
        codec: Arc::clone(&codec),
        clock: clock.clone(),
        fail: gateway_fails,
    });

    let verifier = TokenVerifier::new(
        Arc::clone(&codec),
        Arc::clone(&revocations) as Arc<dyn RevocationSet>,
        Some(renewal),
        Arc::new(RecordingEventSink::new()),
        Arc::new(clock.clone()),
        TokenVerifierConfig {
            renewal_enabled,
            renewal_grace: Duration::from_secs(300),
        },
    );

    Harness {
        codec,
        clock,
        revocations,
        verifier,
    }
}

fn mint(h: &Harness, lifetime: Duration) -> String {
    h.codec
        .mint(
            &ClientId::new("acme").unwrap(),
            ["payments:execute"].into_iter().collect::<PermissionSet>(),
            lifetime,
            false,
            h.clock.now(),
        )
        .unwrap()
        .token
}

fn correlation() -> CorrelationId {
    CorrelationId::generate()
}

#[tokio::test]
async fn valid_token_with_permission_passes() {
    let h = harness(true, false);
    let token = mint(&h, Duration::from_secs(600));

    let outcome = h
        .verifier
        .verify(&token, Some("payments:execute"), &correlation())
        .await;
    assert!(outcome.is_valid);
    assert!(!outcome.is_renewed);
    assert_eq!(outcome.claims.unwrap().sub, "acme");
}

#[tokio::test]
async fn missing_permission_is_forbidden() {
    let h = harness(true, false);
    let token = mint(&h, Duration::from_secs(600));

    let outcome = h
        .verifier
        .verify(&token, Some("admin:rotate"), &correlation())
        .await;
    assert!(!outcome.is_valid);
    assert!(outcome.is_forbidden);
    assert!(outcome.claims.is_none());
    assert!(outcome.error_message.unwrap().contains("admin:rotate"));
}

#[tokio::test]
async fn expired_token_in_grace_is_renewed_transparently() {
    let h = harness(true, false);
    let token = mint(&h, Duration::from_secs(1));

    h.clock.advance(chrono::Duration::seconds(2));
    let outcome = h
        .verifier
        .verify(&token, Some("payments:execute"), &correlation())
        .await;
    assert!(outcome.is_valid);
    assert!(outcome.is_renewed);
    let renewed = outcome.renewed_token.expect("renewed token present");
    assert_ne!(renewed, token);

    // The renewed token passes on its own.
    let outcome = h
        .verifier
        .verify(&renewed, Some("payments:execute"), &correlation())
        .await;
    assert!(outcome.is_valid);
    assert!(!outcome.is_renewed);
}

#[tokio::test]
async fn expired_token_past_grace_is_not_renewed() {
    let h = harness(true, false);
    let token = mint(&h, Duration::from_secs(1));

    h.clock.advance(chrono::Duration::seconds(302));
    let outcome = h.verifier.verify(&token, None, &correlation()).await;
    assert!(!outcome.is_valid);
    assert!(outcome.is_expired);
    assert!(outcome.renewed_token.is_none());
}

#[tokio::test]
async fn renewal_disabled_means_expired_stays_expired() {
    let h = harness(false, false);
    let token = mint(&h, Duration::from_secs(1));

    h.clock.advance(chrono::Duration::seconds(2));
    let outcome = h.verifier.verify(&token, None, &correlation()).await;
    assert!(!outcome.is_valid);
    assert!(outcome.is_expired);
    assert!(!outcome.is_renewed);
}

#[tokio::test]
async fn gateway_failure_during_renewal_reads_as_expired() {
    let h = harness(true, true);
    let token = mint(&h, Duration::from_secs(1));

    h.clock.advance(chrono::Duration::seconds(2));
    let outcome = h.verifier.verify(&token, None, &correlation()).await;
    assert!(!outcome.is_valid);
    assert!(outcome.is_expired);
    assert!(outcome.error_message.unwrap().contains("renewal failed"));
}

#[tokio::test]
async fn tampered_token_is_rejected() {
    let h = harness(true, false);
    let mut token = mint(&h, Duration::from_secs(600));
    token.push('x');

    let outcome = h.verifier.verify(&token, None, &correlation()).await;
    assert!(!outcome.is_valid);
    assert!(!outcome.is_expired);
    assert!(outcome.error_message.is_some());
}

#[tokio::test]
async fn revoked_token_is_rejected_even_before_expiry() {
    let h = harness(true, false);
    let minted = h
        .codec
        .mint(
            &ClientId::new("acme").unwrap(),
            PermissionSet::new(),
            Duration::from_secs(600),
            false,
            h.clock.now(),
        )
        .unwrap();

    h.revocations
        .revoke(&minted.claims.jti, Duration::from_secs(600))
        .await;
    let outcome = h.verifier.verify(&minted.token, None, &correlation()).await;
    assert!(!outcome.is_valid);
    assert!(outcome.error_message.unwrap().contains("revoked"));
}
