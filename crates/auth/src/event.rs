//! Authentication events.
//!
//! Events are write-only from the core's point of view: the service emits
//! them at the authentication boundary and a sink ships them wherever the
//! installation keeps its audit trail. Events never carry secret material.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keygate_core::{ClientId, CorrelationId};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventType {
    Authentication,
    TokenVerification,
    TokenRenewal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthOutcome {
    Success,
    Failure,
}

/// One authentication-boundary event.
#[derive(Debug, Clone, Serialize)]
pub struct AuthEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuthEventType,
    pub outcome: AuthOutcome,
    pub client_id: Option<ClientId>,
    pub correlation_id: CorrelationId,
    pub source_addr: Option<String>,
    /// Authentication was served from cached credential metadata.
    pub degraded: bool,
}

/// Destination for authentication events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: AuthEvent);
}

/// Sink that writes events as structured log lines; the default in both
/// binaries, where the log pipeline is the audit transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: AuthEvent) {
        tracing::info!(
            target: "keygate::audit",
            event_type = ?event.event_type,
            outcome = ?event.outcome,
            client_id = event.client_id.as_ref().map(ClientId::as_str),
            correlation_id = %event.correlation_id,
            source_addr = event.source_addr.as_deref(),
            degraded = event.degraded,
            "auth event"
        );
    }
}

/// Sink that stores events in memory; test assertions read them back.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<AuthEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().clone()
    }

    pub fn failures(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.outcome == AuthOutcome::Failure)
            .count()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: AuthEvent) {
        self.events.lock().push(event);
    }
}
