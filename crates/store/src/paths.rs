//! Path conventions inside the secret store.
//!
//! Everything keygate persists lives under one prefix; these helpers are the
//! only place the layout is spelled out.

use keygate_core::ClientId;

/// Default live credential record for a client.
pub fn cred_default(client_id: &ClientId) -> String {
    format!("creds/{client_id}")
}

/// Per-version credential record.
pub fn cred_version(client_id: &ClientId, version: &str) -> String {
    format!("creds/{client_id}/{version}")
}

/// Live transition record for a client (at most one).
pub fn transition(client_id: &ClientId) -> String {
    format!("transitions/{client_id}")
}

/// Token signing key shared by gateway and backend.
pub const TOKEN_SIGNING_KEY: &str = "keys/token-signing";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let id = ClientId::new("acme").unwrap();
        assert_eq!(cred_default(&id), "creds/acme");
        assert_eq!(cred_version(&id, "v2"), "creds/acme/v2");
        assert_eq!(transition(&id), "transitions/acme");
    }
}
