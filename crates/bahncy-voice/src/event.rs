//! Tagged decoding of the remote platform's event labels.
//!
//! The platform reports connection status and agent activity as free-form
//! labels whose vocabulary is not under our control. They are decoded here,
//! once, into closed enums with an explicit `Unknown` variant so the
//! controller never matches on strings.

/// Decoded connection-status label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// The session is established.
    Connected,
    /// The platform is (re)establishing the session.
    Connecting,
    /// The platform ended or idled the session.
    Disconnected,
    /// The platform reported an unrecoverable failure.
    Failed(String),
    /// Anything else. Ignored by the controller.
    Unknown(String),
}

impl StatusEvent {
    /// Classifies a raw status label.
    ///
    /// Matching is case-insensitive and by substring, most specific first, so
    /// `"Status.disconnected"` is never mistaken for `"connected"`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase();
        if normalized.contains("error") || normalized.contains("fail") {
            Self::Failed(label.trim().to_string())
        } else if normalized.contains("disconnect")
            || normalized.contains("ended")
            || normalized.contains("idle")
        {
            Self::Disconnected
        } else if normalized.contains("connecting") {
            Self::Connecting
        } else if normalized.contains("connected") || normalized.contains("active") {
            Self::Connected
        } else {
            Self::Unknown(label.to_string())
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Connecting => "connecting",
            Self::Disconnected => "disconnected",
            Self::Failed(_) => "failed",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Decoded agent-activity label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEvent {
    AgentSpeaking,
    UserSpeaking,
    Listening,
    Thinking,
    Idle,
    /// Anything else. Treated as silence.
    Unknown(String),
}

impl ActivityEvent {
    /// Classifies a raw activity label.
    ///
    /// Only labels carrying a "speak" indicator can mark someone as talking.
    /// A label that also names the user is attributed to the user, every
    /// other speaking label to the agent.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase();
        if normalized.contains("speak") {
            if normalized.contains("user") {
                Self::UserSpeaking
            } else {
                Self::AgentSpeaking
            }
        } else {
            match normalized.as_str() {
                "listening" => Self::Listening,
                "thinking" => Self::Thinking,
                "idle" => Self::Idle,
                _ => Self::Unknown(label.to_string()),
            }
        }
    }

    /// Returns `(agent_speaking, user_speaking)` for this activity.
    pub fn speakers(&self) -> (bool, bool) {
        match self {
            Self::AgentSpeaking => (true, false),
            Self::UserSpeaking => (false, true),
            Self::Listening | Self::Thinking | Self::Idle | Self::Unknown(_) => (false, false),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentSpeaking => "agent_speaking",
            Self::UserSpeaking => "user_speaking",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Idle => "idle",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// One event from any of a session's three streams, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    Status(StatusEvent),
    Activity(ActivityEvent),
    Mute(bool),
}
