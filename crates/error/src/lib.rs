//! Workspace error taxonomy.
//!
//! Every failure that crosses a service boundary is classified into one of
//! the kinds below. The kind decides three things at once: the stable
//! `errorCode` emitted on the wire, whether the resilience layer may retry,
//! and which HTTP class the services map it to. Subsystem crates keep their
//! own `thiserror` enums and convert at the boundary via `From`.

mod kind;

pub use kind::{Error, ErrorKind, HttpClass, Result};
