//! Shared types for the BahnCy voice shell.
//!
//! This crate holds the value types that every other crate in the workspace
//! agrees on: the connection phase of a conversation, the published
//! [`SessionState`] snapshot, the error descriptor surfaced to the user, and
//! the invariant violations the state store refuses to publish.
//!
//! Nothing here is async and nothing here owns a resource. The store and
//! controller in `bahncy-voice` are the only writers of these values; UI
//! surfaces only ever read them.

use serde::{Deserialize, Serialize};

mod state;

pub use state::{SessionState, StateInvariantViolation};

/// Lifecycle stage of a conversation session.
///
/// Legal transitions:
///
/// ```text
/// Idle --start--> Connecting --remote ok--> Active --end--> Ending --> Idle
///                   Active --remote reconnect--> Connecting
///            any --unrecoverable failure--> Error --> Idle | Connecting
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// No session is open.
    #[default]
    Idle,
    /// A session open call is in flight.
    Connecting,
    /// The session is open and events are flowing.
    Active,
    /// Teardown has started; the remote close call may still be in flight.
    Ending,
    /// An unrecoverable failure was reported. Never sticky.
    Error(String),
}

impl ConnectionPhase {
    /// Returns the canonical label for this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Ending => "ending",
            Self::Error(_) => "error",
        }
    }

    /// Whether a session is either open or being opened.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Connecting | Self::Active)
    }

    /// Whether moving from `self` to `next` is a legal edge of the phase
    /// machine. Staying in the same phase is always legal.
    pub fn can_transition_to(&self, next: &ConnectionPhase) -> bool {
        if std::mem::discriminant(self) == std::mem::discriminant(next) {
            return true;
        }
        match (self, next) {
            (_, Self::Error(_)) => true,
            (Self::Idle, Self::Connecting) => true,
            (Self::Connecting, Self::Active | Self::Ending) => true,
            (Self::Active, Self::Connecting | Self::Ending) => true,
            (Self::Ending, Self::Idle) => true,
            (Self::Error(_), Self::Idle | Self::Connecting) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(reason) => write!(f, "error({reason})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Which operation produced a user-visible error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Opening the conversation failed.
    Open,
    /// A mute command was rejected or could not be delivered.
    Mute,
    /// The remote platform reported a failure on an open session.
    Remote,
}

/// Error descriptor carried in [`SessionState::last_error`].
///
/// Cleared on the next successful start or by explicit dismissal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

impl LastError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
