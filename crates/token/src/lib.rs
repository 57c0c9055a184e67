//! Signed-token codec, key ring and revocation set.
//!
//! Tokens are HS256 JWTs with the minimum claim set. The signing key lives
//! in the secret store; [`KeyRing`] holds the current and previous key in a
//! copy-on-write cell so verification keeps working across a key roll
//! without a reader-side lock anywhere.

mod claims;
mod codec;
mod error;
mod keyring;
mod revocation;

pub use claims::Claims;
pub use codec::{InvalidReason, MintedToken, TokenCodec, TokenCodecConfig, Verdict};
pub use error::TokenError;
pub use keyring::{KeyRing, run_key_refresh};
pub use revocation::{CacheRevocationSet, RevocationSet};
