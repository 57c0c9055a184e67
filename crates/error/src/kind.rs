use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure classification shared by both services.
///
/// The set is closed on purpose: anything a dependency throws at us is
/// folded into one of these before it reaches a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input is syntactically bad (missing header, malformed token).
    Validation,
    /// Credentials or token signature failed to verify.
    Authentication,
    /// Authenticated, but the permission set does not cover the operation.
    Authorization,
    /// The referenced entity does not exist.
    NotFound,
    /// Vault / cache / backend unreachable after retries and fallbacks.
    DependencyUnavailable,
    /// A rotation is already in flight for this client.
    RotationConflict,
    /// Rotation advance requested from an incompatible state.
    InvalidStateTransition,
    /// Anything unexpected. Alerts.
    Internal,
}

/// Coarse HTTP mapping for a kind; the services turn this into a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpClass {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    ServiceUnavailable,
    Internal,
}

impl ErrorKind {
    /// Stable error code emitted in wire envelopes. Never change these.
    pub fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Authentication => "AUTH_ERROR",
            Self::Authorization => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::DependencyUnavailable => "DEPENDENCY_UNAVAILABLE",
            Self::RotationConflict => "ROTATION_CONFLICT",
            Self::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Whether the resilience layer is allowed to retry the failed call.
    ///
    /// Only dependency outages qualify; authentication failures in
    /// particular must never be retried automatically.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::DependencyUnavailable)
    }

    /// Authentication failures feed brute-force accounting.
    pub fn counts_toward_lockout(self) -> bool {
        matches!(self, Self::Authentication)
    }

    pub fn http_class(self) -> HttpClass {
        match self {
            Self::Validation => HttpClass::BadRequest,
            Self::Authentication => HttpClass::Unauthorized,
            Self::Authorization => HttpClass::Forbidden,
            Self::NotFound => HttpClass::NotFound,
            Self::RotationConflict | Self::InvalidStateTransition => HttpClass::Conflict,
            Self::DependencyUnavailable => HttpClass::ServiceUnavailable,
            Self::Internal => HttpClass::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Classified error with a caller-facing message.
///
/// The message must already be scrubbed by the producing layer; nothing in
/// this type redacts after the fact.
#[derive(Debug, Error, Clone)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn dependency_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DependencyUnavailable, message)
    }

    pub fn rotation_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RotationConflict, message)
    }

    pub fn invalid_state_transition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidStateTransition, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
