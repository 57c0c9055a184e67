//! Credential validation against stored records.

use crate::{ClientCredential, CredentialStatus, SecretHasher};
use keygate_core::SecretString;

/// Validates a presented secret against candidate records.
///
/// Status gates short-circuit before any hashing work: a disabled record
/// never matches, a deprecated one only when the rotation policy says
/// deprecated versions still authenticate. The hash comparison itself is
/// constant-time. During a dual-validity window the caller invokes this
/// once per candidate record and takes the first match.
#[derive(Clone)]
pub struct CredentialValidator {
    hasher: SecretHasher,
    accept_deprecated: bool,
}

impl CredentialValidator {
    pub fn new(accept_deprecated: bool) -> Self {
        Self {
            hasher: SecretHasher::new(),
            accept_deprecated,
        }
    }

    /// True when `presented` authenticates under `record`.
    pub fn validate(&self, presented: &SecretString, record: &ClientCredential) -> bool {
        match record.status {
            CredentialStatus::Active => {}
            CredentialStatus::Deprecated if self.accept_deprecated => {}
            CredentialStatus::Deprecated | CredentialStatus::Disabled => {
                tracing::debug!(
                    client_id = %record.client_id,
                    version = %record.version,
                    status = %record.status,
                    "credential rejected by status gate"
                );
                return false;
            }
        }
        self.hasher.verify(presented, &record.hashed_secret)
    }
}
