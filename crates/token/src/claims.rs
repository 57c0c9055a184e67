//! Token claim set.

use keygate_core::PermissionSet;
use serde::{Deserialize, Serialize};

/// Claims embedded in every minted token.
///
/// Deliberately minimal: identity, validity window, a unique `jti`, the
/// permission set, and the internal degraded marker. No secret material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Client id of the authenticated vendor.
    pub sub: String,
    /// Minting gateway.
    pub iss: String,
    /// Target backend.
    pub aud: String,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds. Always `> iat`.
    pub exp: i64,
    /// Unique token id; revocation and caching key material.
    pub jti: String,
    /// Permissions granted to the bearer.
    pub permissions: PermissionSet,
    /// Minted from cached credential metadata during a vault outage.
    /// Internal flag only; never surfaced to vendors.
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub degraded: bool,
}

impl Claims {
    /// Remaining lifetime in seconds at `now`; zero when expired.
    pub fn remaining_lifetime(&self, now: i64) -> u64 {
        u64::try_from(self.exp - now).unwrap_or(0)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> Claims {
        Claims {
            sub: "acme".into(),
            iss: "keygate-gateway".into(),
            aud: "keygate-backend".into(),
            iat: 1_000,
            exp: 4_600,
            jti: "j-1".into(),
            permissions: ["payments:execute"].into_iter().collect(),
            degraded: false,
        }
    }

    #[test]
    fn test_degraded_flag_is_omitted_when_false() {
        let json = serde_json::to_string(&claims()).unwrap();
        assert!(!json.contains("degraded"));

        let mut degraded = claims();
        degraded.degraded = true;
        let json = serde_json::to_string(&degraded).unwrap();
        assert!(json.contains("\"degraded\":true"));
    }

    #[test]
    fn test_remaining_lifetime_clamps_at_zero() {
        let c = claims();
        assert_eq!(c.remaining_lifetime(1_000), 3_600);
        assert_eq!(c.remaining_lifetime(10_000), 0);
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let c = claims();
        assert!(!c.is_expired_at(4_599));
        assert!(c.is_expired_at(4_600));
    }
}
