//! Shared primitives for the keygate workspace.
//!
//! Everything here is deliberately small: validated identifiers, a secret
//! wrapper that cannot leak through logs, a clock seam so time-dependent
//! logic is testable, and the permission set carried inside tokens.

mod clock;
mod id;
mod permissions;
mod secret;

pub use clock::{Clock, ManualClock, SystemClock};
pub use id::{ClientId, CorrelationId, IdError};
pub use permissions::PermissionSet;
pub use secret::SecretString;
