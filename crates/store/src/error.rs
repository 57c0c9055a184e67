use thiserror::Error;

/// Secret-store failure classes.
///
/// The three-way split drives policy everywhere else: `Connection` retries
/// and may open the vault circuit, `NotFound` falls through to the caller's
/// own handling, `Authentication` aborts the request and alerts.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network-level failure: connect, TLS, timeout, 5xx from the vault.
    #[error("secret store unreachable: {reason}")]
    Connection { reason: String },

    /// The adapter's own credential was rejected. Never retried.
    #[error("secret store rejected adapter credentials: {reason}")]
    Authentication { reason: String },

    /// No value at the requested path.
    #[error("secret '{path}' not found")]
    NotFound { path: String },

    /// The store answered, but the payload was not in the expected shape.
    #[error("malformed secret payload at '{path}': {reason}")]
    Malformed { path: String, reason: String },
}

impl StoreError {
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StoreError> for keygate_error::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection { .. } => {
                keygate_error::Error::dependency_unavailable("secret store unreachable")
            }
            // A bad adapter credential is an operator problem, not a caller
            // problem; surfaces as 500 and alerts.
            StoreError::Authentication { .. } => {
                keygate_error::Error::internal("secret store authentication failed")
            }
            StoreError::NotFound { path } => {
                keygate_error::Error::not_found(format!("secret '{path}' not found"))
            }
            StoreError::Malformed { path, .. } => {
                keygate_error::Error::internal(format!("malformed secret at '{path}'"))
            }
        }
    }
}
