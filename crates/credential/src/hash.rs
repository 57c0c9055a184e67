//! Secret hashing and generation.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use keygate_core::SecretString;
use thiserror::Error;

/// Error type for hashing operations. Verification failures are not errors;
/// they are `false`.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("failed to hash secret: {0}")]
    Hashing(String),
}

/// argon2id hasher for stored client secrets.
///
/// Output is a PHC string carrying algorithm, parameters and salt, so
/// parameter upgrades only affect newly hashed secrets. Comparison goes
/// through `verify_password`, which is constant-time over the digest.
#[derive(Clone, Default)]
pub struct SecretHasher {
    argon2: Argon2<'static>,
}

impl SecretHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a raw secret into a PHC string for storage.
    pub fn hash(&self, secret: &SecretString) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        secret.expose_secret(|raw| {
            self.argon2
                .hash_password(raw.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| HashError::Hashing(e.to_string()))
        })
    }

    /// Compare a presented secret against a stored PHC string.
    ///
    /// An unparseable stored hash verifies as `false` rather than erroring:
    /// from the caller's point of view a corrupt record and a wrong secret
    /// are the same non-match.
    pub fn verify(&self, presented: &SecretString, stored_phc: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_phc) else {
            tracing::warn!("stored credential hash is not a valid PHC string");
            return false;
        };
        presented.expose_secret(|raw| {
            self.argon2
                .verify_password(raw.as_bytes(), &parsed)
                .is_ok()
        })
    }
}

/// Generate a fresh client secret: 32 random bytes, URL-safe base64.
pub fn generate_client_secret() -> SecretString {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    SecretString::new(URL_SAFE_NO_PAD.encode(bytes))
}

/// Mint an opaque, unique version label.
pub fn generate_version() -> String {
    format!("v-{}", uuid::Uuid::new_v4().simple())
}
