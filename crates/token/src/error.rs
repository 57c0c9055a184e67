use std::time::Duration;
use thiserror::Error;

/// Error type for minting and key management. Verification failures are not
/// errors; they are [`crate::Verdict`] variants.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("requested lifetime {requested:?} exceeds maximum {max:?}")]
    LifetimeTooLong { requested: Duration, max: Duration },

    #[error("token encoding failed: {0}")]
    Encoding(String),

    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),
}

impl From<TokenError> for keygate_error::Error {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::LifetimeTooLong { .. } => {
                keygate_error::Error::validation(err.to_string())
            }
            TokenError::Encoding(_) => keygate_error::Error::internal("token encoding failed"),
            TokenError::KeyUnavailable(_) => {
                keygate_error::Error::dependency_unavailable("token signing key unavailable")
            }
        }
    }
}
