//! Process-level rotation records.

use chrono::{DateTime, Utc};
use keygate_core::ClientId;
use keygate_credential::TransitionState;
use serde::{Deserialize, Serialize};

/// Coarse outcome bucket derived from the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStatus {
    Running,
    Completed,
    Failed,
}

/// One rotation attempt, persisted under `rotation:{client_id}`.
///
/// The stored transition record is authoritative for what authenticates;
/// this record is the driver's working state and the operator's status
/// surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationRecord {
    pub rotation_id: String,
    pub client_id: ClientId,
    pub current_state: TransitionState,
    /// Next state the driver is working toward; `None` once terminal.
    pub target_state: Option<TransitionState>,
    pub old_version: String,
    pub new_version: String,
    pub transition_period_minutes: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RotationRecord {
    pub fn new(
        client_id: ClientId,
        old_version: impl Into<String>,
        new_version: impl Into<String>,
        transition_period_minutes: u64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            rotation_id: uuid::Uuid::new_v4().to_string(),
            client_id,
            current_state: TransitionState::Initiated,
            target_state: TransitionState::Initiated.next(),
            old_version: old_version.into(),
            new_version: new_version.into(),
            transition_period_minutes,
            started_at,
            completed_at: None,
        }
    }

    pub fn status(&self) -> RotationStatus {
        match self.current_state {
            TransitionState::NewActive => RotationStatus::Completed,
            TransitionState::Failed => RotationStatus::Failed,
            _ => RotationStatus::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }

    /// Move to `state`, stamping `completed_at` on terminal entry.
    pub(crate) fn enter(&mut self, state: TransitionState, now: DateTime<Utc>) {
        self.current_state = state;
        self.target_state = state.next();
        if state.is_terminal() {
            self.completed_at = Some(now);
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RotationRecord {
        RotationRecord::new(ClientId::new("acme").unwrap(), "v1", "v2", 60, Utc::now())
    }

    #[test]
    fn test_new_record_is_running() {
        let record = record();
        assert_eq!(record.status(), RotationStatus::Running);
        assert_eq!(record.target_state, Some(TransitionState::DualActive));
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn test_terminal_entry_stamps_completion() {
        let mut record = record();
        let now = Utc::now();
        record.enter(TransitionState::NewActive, now);
        assert_eq!(record.status(), RotationStatus::Completed);
        assert_eq!(record.completed_at, Some(now));
        assert_eq!(record.target_state, None);
    }

    #[test]
    fn test_failed_entry() {
        let mut record = record();
        record.enter(TransitionState::Failed, Utc::now());
        assert_eq!(record.status(), RotationStatus::Failed);
        assert!(record.is_terminal());
    }

    #[test]
    fn test_serde_round_trip() {
        let record = record();
        let back = RotationRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(back.rotation_id, record.rotation_id);
        assert_eq!(back.current_state, TransitionState::Initiated);
    }
}
