use thiserror::Error;

/// The remote platform could not open a conversation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteOpenError {
    #[error("conversation rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out opening conversation")]
    TimedOut,
}

impl RemoteOpenError {
    /// Short reason suitable for `SessionState::last_error`.
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected(reason) | Self::Transport(reason) => reason.clone(),
            Self::TimedOut => "timed out".to_string(),
        }
    }
}

/// Closing a session failed. Never fatal: local state resets regardless.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteCloseError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out closing conversation")]
    TimedOut,
}

/// A mute command did not reach the remote platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteMuteError {
    #[error("mute rejected: {0}")]
    Rejected(String),

    #[error("session is not connected")]
    NotConnected,

    #[error("timed out sending mute command")]
    TimedOut,
}
