//! Vendor-facing gateway service.
//!
//! Preserves the legacy header contract (`X-Client-ID` / `X-Client-Secret`)
//! and translates it into short-lived signed tokens for the internal
//! fabric. The composition root in [`state`] wires the vault store, cache,
//! codec, authentication service and rotation machinery together; [`routes`]
//! is the thin axum layer over them.

pub mod error;
pub mod forward;
pub mod routes;
pub mod state;
pub mod telemetry;
