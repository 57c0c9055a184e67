use keygate_cache::CacheError;
use keygate_core::ClientId;
use keygate_credential::TransitionState;
use keygate_store::StoreError;
use thiserror::Error;

/// Error type for rotation operations.
#[derive(Debug, Error)]
pub enum RotationError {
    /// A non-terminal rotation already exists for the client.
    #[error("rotation already in progress for '{client_id}'")]
    Conflict { client_id: ClientId },

    /// Another driver holds the per-client lease right now.
    #[error("rotation for '{client_id}' is busy")]
    Busy { client_id: ClientId },

    /// The requested advance is not an edge of the state machine.
    #[error("invalid rotation transition {from} -> {to}")]
    InvalidTransition {
        from: TransitionState,
        to: TransitionState,
    },

    /// No rotation (or no credential) to operate on.
    #[error("no rotation found for '{client_id}'")]
    NotFound { client_id: ClientId },

    /// The requested transition window is shorter than the floor.
    #[error("transition period of {requested} minutes is below the minimum of {minimum}")]
    WindowTooShort { requested: u64, minimum: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("rotation record corrupted: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for RotationError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}

impl From<RotationError> for keygate_error::Error {
    fn from(err: RotationError) -> Self {
        match err {
            RotationError::Conflict { client_id } => keygate_error::Error::rotation_conflict(
                format!("rotation already in progress for '{client_id}'"),
            ),
            RotationError::Busy { client_id } => keygate_error::Error::rotation_conflict(
                format!("rotation for '{client_id}' is busy, retry shortly"),
            ),
            RotationError::InvalidTransition { from, to } => {
                keygate_error::Error::invalid_state_transition(format!(
                    "cannot advance rotation from {from} to {to}"
                ))
            }
            RotationError::NotFound { client_id } => {
                keygate_error::Error::not_found(format!("no rotation for '{client_id}'"))
            }
            RotationError::WindowTooShort { requested, minimum } => {
                keygate_error::Error::validation(format!(
                    "transition period of {requested} minutes is below the minimum of {minimum}"
                ))
            }
            RotationError::Store(e) => e.into(),
            RotationError::Cache(e) => e.into(),
            RotationError::Corrupt(_) => {
                keygate_error::Error::internal("rotation record corrupted")
            }
        }
    }
}
