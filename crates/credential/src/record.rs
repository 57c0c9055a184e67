//! Versioned credential records.

use chrono::{DateTime, Utc};
use keygate_core::{ClientId, PermissionSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of one credential version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    /// Accepted for authentication.
    Active,
    /// Kept readable for already-issued tokens; new authentications are
    /// policy-dependent (rejected by default).
    Deprecated,
    /// Never accepted.
    Disabled,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Deprecated => f.write_str("deprecated"),
            Self::Disabled => f.write_str("disabled"),
        }
    }
}

/// One version of a client's credential, as stored in the vault.
///
/// `hashed_secret` is an argon2id PHC string; the raw secret is hashed at
/// rotation time and never persisted anywhere.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientCredential {
    pub client_id: ClientId,
    pub version: String,
    pub hashed_secret: String,
    pub status: CredentialStatus,
    pub created_at: DateTime<Utc>,
    /// Permissions minted into tokens for this client.
    pub permissions: PermissionSet,
}

impl ClientCredential {
    pub fn new(
        client_id: ClientId,
        version: impl Into<String>,
        hashed_secret: impl Into<String>,
        created_at: DateTime<Utc>,
        permissions: PermissionSet,
    ) -> Self {
        Self {
            client_id,
            version: version.into(),
            hashed_secret: hashed_secret.into(),
            status: CredentialStatus::Active,
            created_at,
            permissions,
        }
    }

    pub fn with_status(mut self, status: CredentialStatus) -> Self {
        self.status = status;
        self
    }

    /// Serialize for vault storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize a vault payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

// The hash is a verifier, not a secret, but it still has no business in
// logs; Debug drops it.
impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredential")
            .field("client_id", &self.client_id)
            .field("version", &self.version)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}
