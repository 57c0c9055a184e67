//! Client credential data model and validation.
//!
//! The vault owns the authoritative records defined here; everything else
//! sees them as serialized bytes. The raw vendor secret exists only inside
//! [`keygate_core::SecretString`] values and is compared exclusively through
//! the argon2id password-hash API.

mod hash;
mod record;
mod transition;
mod validator;

pub use hash::{HashError, SecretHasher, generate_client_secret, generate_version};
pub use record::{ClientCredential, CredentialStatus};
pub use transition::{TransitionRecord, TransitionState};
pub use validator::CredentialValidator;
