//! Cache key conventions.
//!
//! Kept in one module so prefix scans and prefix invalidation can never
//! drift from the write-side key shapes.

use keygate_core::ClientId;

/// Cached token, one entry per minted token.
pub fn token(client_id: &ClientId, jti: &str) -> String {
    format!("token:{client_id}:{jti}")
}

/// Prefix covering every cached token of a client.
pub fn token_prefix(client_id: &ClientId) -> String {
    format!("token:{client_id}:")
}

/// Credential-metadata fallback entry.
pub fn cred_meta(client_id: &ClientId) -> String {
    format!("cred_meta:{client_id}")
}

/// Micro-cached transition record.
pub fn transition(client_id: &ClientId) -> String {
    format!("transition:{client_id}")
}

/// Process-level rotation record.
pub fn rotation(client_id: &ClientId) -> String {
    format!("rotation:{client_id}")
}

/// Rotation driver lease.
pub fn rotation_lock(client_id: &ClientId) -> String {
    format!("rotation-lock:{client_id}")
}

/// Revoked token marker.
pub fn revoked(jti: &str) -> String {
    format!("revoked:{jti}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_keys_fall_under_their_prefix() {
        let id = ClientId::new("acme").unwrap();
        assert!(token(&id, "j-1").starts_with(&token_prefix(&id)));
        assert_eq!(token(&id, "j-1"), "token:acme:j-1");
    }

    #[test]
    fn test_prefixes_do_not_collide_across_clients() {
        let a = ClientId::new("acme").unwrap();
        let b = ClientId::new("acme2").unwrap();
        assert!(!token(&b, "j-1").starts_with(&token_prefix(&a)));
    }
}
