//! Property suite for the token codec.

use chrono::{TimeZone, Utc};
use keygate_core::{ClientId, PermissionSet};
use keygate_token::{InvalidReason, KeyRing, RevocationSet, TokenCodec, TokenCodecConfig, Verdict};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

struct NoRevocations;

#[async_trait::async_trait]
impl RevocationSet for NoRevocations {
    async fn revoke(&self, _jti: &str, _ttl: Duration) {}
    async fn is_revoked(&self, _jti: &str) -> bool {
        false
    }
}

fn codec() -> TokenCodec {
    TokenCodec::new(
        TokenCodecConfig {
            issuer: "keygate-gateway".into(),
            audience: "keygate-backend".into(),
            allowed_issuers: vec!["keygate-gateway".into()],
            max_lifetime: Duration::from_secs(3600),
        },
        Arc::new(KeyRing::new(b"0123456789abcdef0123456789abcdef".to_vec())),
    )
}

fn client_id_strategy() -> impl Strategy<Value = ClientId> {
    "[a-z][a-z0-9_-]{0,30}".prop_map(|raw| ClientId::new(raw).unwrap())
}

fn permissions_strategy() -> impl Strategy<Value = PermissionSet> {
    proptest::collection::btree_set("[a-z]{1,8}:[a-z]{1,8}", 0..5)
        .prop_map(|set| set.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// mint → verify with matching audience and issuer yields Valid with
    /// identical claims.
    #[test]
    fn mint_verify_round_trip(
        client in client_id_strategy(),
        permissions in permissions_strategy(),
        lifetime_secs in 1u64..3600,
        start_secs in 0i64..4_000_000_000,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let codec = codec();
            let now = Utc.timestamp_opt(start_secs, 0).unwrap();
            let minted = codec
                .mint(&client, permissions, Duration::from_secs(lifetime_secs), false, now)
                .unwrap();

            prop_assert!(minted.claims.exp > minted.claims.iat);
            match codec.verify(&minted.token, now, &NoRevocations).await {
                Verdict::Valid(claims) => prop_assert_eq!(claims, minted.claims),
                other => prop_assert!(false, "expected Valid, got {:?}", other),
            }
            Ok(())
        })?;
    }

    /// Verification anywhere inside [iat, iat+lifetime) is Valid; at or
    /// past the boundary it is Expired.
    #[test]
    fn validity_window_is_half_open(
        lifetime_secs in 1u64..3600,
        offset_ratio in 0.0f64..1.0,
        past_secs in 0u64..7200,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let codec = codec();
            let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
            let minted = codec
                .mint(
                    &ClientId::new("acme").unwrap(),
                    PermissionSet::new(),
                    Duration::from_secs(lifetime_secs),
                    false,
                    t0,
                )
                .unwrap();

            let inside = t0 + chrono::Duration::seconds(
                ((lifetime_secs as f64 - 1.0) * offset_ratio) as i64,
            );
            prop_assert!(
                codec.verify(&minted.token, inside, &NoRevocations).await.is_valid(),
                "must be valid inside the window"
            );

            let at_or_past = t0 + chrono::Duration::seconds((lifetime_secs + past_secs) as i64);
            match codec.verify(&minted.token, at_or_past, &NoRevocations).await {
                Verdict::Expired(_) => {}
                other => prop_assert!(false, "expected Expired, got {:?}", other),
            }
            Ok(())
        })?;
    }

    /// Any single-character corruption of a minted token fails
    /// verification; nothing tampered ever reads as Valid or Expired.
    #[test]
    fn tampered_tokens_never_verify(
        position_seed in any::<proptest::sample::Index>(),
        replacement in "[A-Za-z0-9]",
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let codec = codec();
            let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
            let minted = codec
                .mint(
                    &ClientId::new("acme").unwrap(),
                    ["payments:execute"].into_iter().collect(),
                    Duration::from_secs(600),
                    false,
                    now,
                )
                .unwrap();

            let mut bytes = minted.token.into_bytes();
            let position = position_seed.index(bytes.len());
            let replacement = replacement.as_bytes()[0];
            prop_assume!(bytes[position] != replacement);
            prop_assume!(bytes[position] != b'.');
            // The final character of a base64 segment carries unused low
            // bits; skip those positions so the corruption is always
            // semantic, not canonical-encoding trivia.
            prop_assume!(position + 1 < bytes.len() && bytes[position + 1] != b'.');
            bytes[position] = replacement;
            let tampered = String::from_utf8(bytes).unwrap();

            match codec.verify(&tampered, now, &NoRevocations).await {
                Verdict::Invalid(
                    InvalidReason::Malformed | InvalidReason::BadSignature,
                ) => {}
                // Corrupting the payload may alter iss/aud instead of the
                // signature check order seeing it first; any Invalid is a
                // correct rejection.
                Verdict::Invalid(_) => {}
                other => prop_assert!(false, "tampered token verified: {:?}", other),
            }
            Ok(())
        })?;
    }
}
