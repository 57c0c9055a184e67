//! Transition records and the rotation state set.
//!
//! A live transition record is the single source of truth for which
//! credential versions a client may authenticate with. The state enum and
//! its transition table live here, next to the record, because both the
//! authentication path and the rotation driver interpret them.

use chrono::{DateTime, Utc};
use keygate_core::ClientId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rotation phase.
///
/// ```text
/// Initiated → DualActive → OldDeprecated → NewActive
///     ↓            ↓             ↓
///     └──────── Failed ──────────┘
/// ```
///
/// `NewActive` and `Failed` are absorbing; there are no backward edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionState {
    /// New version written, not yet acceptable for authentication.
    Initiated,
    /// Both old and new versions authenticate.
    DualActive,
    /// Old version demoted; ongoing sessions ride cached tokens out.
    OldDeprecated,
    /// Rotation complete; only the new version remains.
    NewActive,
    /// Rotation aborted; the pre-rotation state was restored.
    Failed,
}

impl TransitionState {
    /// Whether the machine may move from `self` to `target`.
    ///
    /// Re-entering the current state is allowed and is a no-op for the
    /// caller; it makes driver ticks idempotent.
    #[must_use]
    pub fn can_transition_to(self, target: TransitionState) -> bool {
        use TransitionState::{DualActive, Failed, Initiated, NewActive, OldDeprecated};

        if self == target {
            return !self.is_terminal();
        }
        match (self, target) {
            (Initiated, DualActive)
            | (DualActive, OldDeprecated)
            | (OldDeprecated, NewActive) => true,
            (Initiated | DualActive | OldDeprecated, Failed) => true,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::NewActive | Self::Failed)
    }

    /// The next state on the success path, if any.
    #[must_use]
    pub fn next(self) -> Option<TransitionState> {
        match self {
            Self::Initiated => Some(Self::DualActive),
            Self::DualActive => Some(Self::OldDeprecated),
            Self::OldDeprecated => Some(Self::NewActive),
            Self::NewActive | Self::Failed => None,
        }
    }
}

impl fmt::Display for TransitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiated => f.write_str("initiated"),
            Self::DualActive => f.write_str("dual_active"),
            Self::OldDeprecated => f.write_str("old_deprecated"),
            Self::NewActive => f.write_str("new_active"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Per-client transition record stored at `transitions/{client_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub client_id: ClientId,
    pub old_version: String,
    pub new_version: String,
    pub state: TransitionState,
    /// Start of the dual-validity window; unset until `DualActive`.
    pub start_time: Option<DateTime<Utc>>,
    /// End of the dual-validity window.
    pub end_time: Option<DateTime<Utc>>,
}

impl TransitionRecord {
    pub fn new(
        client_id: ClientId,
        old_version: impl Into<String>,
        new_version: impl Into<String>,
    ) -> Self {
        Self {
            client_id,
            old_version: old_version.into(),
            new_version: new_version.into(),
            state: TransitionState::Initiated,
            start_time: None,
            end_time: None,
        }
    }

    /// Whether the dual-validity window has run out.
    pub fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.end_time.is_some_and(|end| now >= end)
    }

    /// Whether this record currently widens the acceptable-version set.
    ///
    /// Only `DualActive` and `OldDeprecated` do; an `Initiated` record has
    /// not yet published the new version, and terminal records are dead.
    pub fn broadens_acceptance(&self) -> bool {
        matches!(
            self.state,
            TransitionState::DualActive | TransitionState::OldDeprecated
        )
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
    use TransitionState::{DualActive, Failed, Initiated, NewActive, OldDeprecated};

    #[test]
    fn test_forward_edges() {
        assert!(Initiated.can_transition_to(DualActive));
        assert!(DualActive.can_transition_to(OldDeprecated));
        assert!(OldDeprecated.can_transition_to(NewActive));
    }

    #[test]
    fn test_failure_edges_from_every_non_terminal() {
        for state in [Initiated, DualActive, OldDeprecated] {
            assert!(state.can_transition_to(Failed), "{state} -> failed");
        }
    }

    #[test]
    fn test_no_backward_or_skipping_edges() {
        assert!(!Initiated.can_transition_to(OldDeprecated));
        assert!(!Initiated.can_transition_to(NewActive));
        assert!(!DualActive.can_transition_to(Initiated));
        assert!(!OldDeprecated.can_transition_to(DualActive));
    }

    #[test]
    fn test_terminals_are_absorbing() {
        for target in [Initiated, DualActive, OldDeprecated, NewActive, Failed] {
            assert!(!NewActive.can_transition_to(target));
            assert!(!Failed.can_transition_to(target));
        }
    }

    #[test]
    fn test_same_state_is_allowed_while_live() {
        assert!(DualActive.can_transition_to(DualActive));
        assert!(!NewActive.can_transition_to(NewActive));
    }

    #[test]
    fn test_success_path_walk() {
        let mut state = Initiated;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            state = next;
            seen.push(state);
        }
        assert_eq!(seen, vec![Initiated, DualActive, OldDeprecated, NewActive]);
    }

    #[test]
    fn test_window_elapsed() {
        let now = Utc::now();
        let mut record = TransitionRecord::new(ClientId::new("acme").unwrap(), "v1", "v2");
        assert!(!record.window_elapsed(now), "no window yet");

        record.end_time = Some(now - chrono::Duration::seconds(1));
        assert!(record.window_elapsed(now));
    }

    #[test]
    fn test_broadens_acceptance_per_state() {
        let mut record = TransitionRecord::new(ClientId::new("acme").unwrap(), "v1", "v2");
        assert!(!record.broadens_acceptance());

        record.state = DualActive;
        assert!(record.broadens_acceptance());
        record.state = OldDeprecated;
        assert!(record.broadens_acceptance());
        record.state = NewActive;
        assert!(!record.broadens_acceptance());
    }
}
