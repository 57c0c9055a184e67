//! Validated identifier newtypes.
//!
//! `ClientId` ends up embedded in secret-store paths and cache keys, so its
//! character set is restricted up front; a hostile id must never be able to
//! traverse out of `creds/{client_id}`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum accepted identifier length.
const MAX_ID_LEN: usize = 128;

/// Error type for identifier validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier cannot be empty")]
    Empty,

    #[error("identifier exceeds {MAX_ID_LEN} characters")]
    TooLong,

    #[error("identifier '{id}' contains invalid character '{ch}'")]
    InvalidCharacter { id: String, ch: char },
}

/// Opaque vendor identity presented in the `X-Client-ID` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Validate and wrap a raw identifier.
    ///
    /// Accepts ASCII alphanumerics plus `.`, `_` and `-`; everything else is
    /// rejected so ids stay safe inside store paths and cache keys.
    pub fn new(raw: impl Into<String>) -> Result<Self, IdError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(IdError::Empty);
        }
        if raw.len() > MAX_ID_LEN {
            return Err(IdError::TooLong);
        }
        if let Some(ch) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(IdError::InvalidCharacter { id: raw.clone(), ch });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ClientId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

/// Request-scoped correlation identifier.
///
/// Taken from the inbound `X-Correlation-ID` header when present, otherwise
/// freshly generated; threaded through every log line and error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh correlation id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Adopt an id supplied by the caller, falling back to a fresh one when
    /// the supplied value is empty or implausibly long.
    pub fn from_header(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_ID_LEN {
            Self::generate()
        } else {
            Self(trimmed.to_owned())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
