use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_connect_timeout_ms() -> u64 {
    15_000
}

fn default_close_timeout_ms() -> u64 {
    3_000
}

fn default_mute_confirm_timeout_ms() -> u64 {
    2_000
}

/// Timeouts applied by the controller to remote calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Upper bound on `open`. Default: 15000.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound on `close` and `set_muted`. Default: 3000.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    /// How long `toggle_mute` waits for the confirming mute event. Default: 2000.
    #[serde(default = "default_mute_confirm_timeout_ms")]
    pub mute_confirm_timeout_ms: u64,
    /// Forwarded unchanged to every `open` call.
    #[serde(default)]
    pub conversation: ConversationConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            mute_confirm_timeout_ms: default_mute_confirm_timeout_ms(),
            conversation: ConversationConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn mute_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.mute_confirm_timeout_ms)
    }
}

/// Options forwarded to the remote platform when opening a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Text-only conversations skip audio capture on the remote side.
    #[serde(default)]
    pub text_only: bool,
}
