//! The published session snapshot and the invariants it must satisfy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ConnectionPhase, LastError};

/// Canonical snapshot of the conversation as seen by every UI surface.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub connection_phase: ConnectionPhase,
    /// Meaningful only while `connection_phase` is `Active`.
    pub is_muted: bool,
    pub agent_speaking: bool,
    pub user_speaking: bool,
    pub last_error: Option<LastError>,
}

/// A mutation that would have published an inconsistent snapshot.
///
/// Seeing one of these means the remote platform delivered events the state
/// machine cannot represent. The store drops the mutation and keeps its
/// last valid value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateInvariantViolation {
    #[error("agent and user cannot both be speaking")]
    SpeakersOverlap,

    #[error("user cannot be speaking while muted")]
    MutedWhileSpeaking,

    #[error("speaking flags set while phase is {0}")]
    SpeakingWhileInactive(ConnectionPhase),

    #[error("mute flag set while phase is {0}")]
    MutedWhileInactive(ConnectionPhase),

    #[error("illegal phase transition {from} -> {to}")]
    IllegalTransition {
        from: ConnectionPhase,
        to: ConnectionPhase,
    },
}

impl SessionState {
    /// A connection attempt is in flight.
    pub fn is_loading(&self) -> bool {
        self.connection_phase == ConnectionPhase::Connecting
    }

    pub fn is_connected(&self) -> bool {
        self.connection_phase == ConnectionPhase::Active
    }

    /// Connected, but neither side is talking.
    pub fn is_anyone_thinking(&self) -> bool {
        self.is_connected() && !self.agent_speaking && !self.user_speaking
    }

    pub fn is_conversation_active(&self) -> bool {
        self.agent_speaking || self.user_speaking
    }

    /// Applies the derived rules a mutation is allowed to rely on.
    ///
    /// Muting silences the user in the same step, so translators only need
    /// to set `is_muted`.
    pub fn normalize(&mut self) {
        if self.is_muted {
            self.user_speaking = false;
        }
    }

    /// Checks `self` as a successor of `previous`.
    pub fn validate_after(&self, previous: &SessionState) -> Result<(), StateInvariantViolation> {
        if !previous
            .connection_phase
            .can_transition_to(&self.connection_phase)
        {
            return Err(StateInvariantViolation::IllegalTransition {
                from: previous.connection_phase.clone(),
                to: self.connection_phase.clone(),
            });
        }
        self.validate()
    }

    /// Checks the snapshot-local invariants.
    pub fn validate(&self) -> Result<(), StateInvariantViolation> {
        if self.agent_speaking && self.user_speaking {
            return Err(StateInvariantViolation::SpeakersOverlap);
        }
        if self.is_muted && self.user_speaking {
            return Err(StateInvariantViolation::MutedWhileSpeaking);
        }
        if !self.is_connected() {
            if self.agent_speaking || self.user_speaking {
                return Err(StateInvariantViolation::SpeakingWhileInactive(
                    self.connection_phase.clone(),
                ));
            }
            if self.is_muted {
                return Err(StateInvariantViolation::MutedWhileInactive(
                    self.connection_phase.clone(),
                ));
            }
        }
        Ok(())
    }
}
