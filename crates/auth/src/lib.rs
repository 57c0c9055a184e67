//! Authentication orchestration for both services.
//!
//! [`AuthService`] is the gateway side: header credentials in, cached or
//! freshly minted token out, with the per-client mint lock, the
//! rotation-aware acceptable-version set, and the degraded fallback when
//! the vault is gone. [`TokenVerifier`] is the backend side: bearer token
//! in, permission-checked claims (or a renewal) out.

mod event;
mod service;
mod verifier;

pub use event::{
    AuthEvent, AuthEventType, AuthOutcome, EventSink, RecordingEventSink, TracingEventSink,
};
pub use service::{AuthService, AuthServiceConfig, IssuedToken, RequestContext};
pub use verifier::{RenewalClient, TokenVerifier, TokenVerifierConfig, VerificationOutcome};
