//! System voice-shortcut entry point.
//!
//! The shortcut can fire before the full view has ever been shown, so it
//! only relies on the store and controller it is handed; it opens the modal
//! snippet surface and starts a conversation with its configured agent.

use bahncy_voice::VoiceSessionController;
use tracing::info;

use crate::surface::{Surface, SurfaceKind};

const APP_NAME: &str = "BahnCy";

pub const SHORT_TITLE: &str = "Voice Chat";

#[derive(Debug, Clone)]
pub struct VoiceShortcut {
    agent_id: String,
    phrases: Vec<String>,
}

impl VoiceShortcut {
    pub fn new(agent_id: impl Into<String>) -> Self {
        let phrases = [
            "Start voice conversation with",
            "Talk to",
            "Voice chat with",
            "Start talking to",
        ]
        .iter()
        .map(|prefix| format!("{prefix} {APP_NAME}"))
        .collect();
        Self {
            agent_id: agent_id.into(),
            phrases,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Whether a spoken `utterance` triggers this shortcut.
    pub fn matches(&self, utterance: &str) -> bool {
        let utterance = utterance.trim().trim_end_matches(['.', '!', '?']);
        self.phrases
            .iter()
            .any(|phrase| phrase.eq_ignore_ascii_case(utterance))
    }

    /// Presents the modal snippet and starts the conversation.
    ///
    /// The returned surface stays attached until dropped.
    pub async fn invoke(&self, controller: &VoiceSessionController) -> Surface {
        info!(agent_id = %self.agent_id, "voice shortcut invoked");
        let modal = Surface::attach(SurfaceKind::Modal, controller.store().clone());
        controller.start(&self.agent_id).await;
        modal
    }
}
