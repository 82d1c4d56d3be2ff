//! Presentation surfaces that observe the session store.
//!
//! Two surfaces exist: the full-screen view and the modal snippet opened by
//! the voice shortcut. Both render from the same snapshots and send
//! commands to the same controller; neither writes state.

use std::sync::{Arc, Mutex, PoisonError};

use bahncy_types::SessionState;
use bahncy_voice::{SessionStore, SubscriptionHandle, VoiceSessionController};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    Full,
    Modal,
}

impl SurfaceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Modal => "modal",
        }
    }
}

/// How the orb scene should look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrbAppearance {
    /// No conversation.
    Dormant,
    /// Connected, nobody talking.
    Thinking,
    AgentSpeaking,
    UserSpeaking,
}

/// What the primary button does when pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryAction {
    Start,
    Stop,
    /// Disabled while a connection attempt is in flight.
    Wait,
}

/// Everything a surface needs to render one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurfaceModel {
    pub primary_label: &'static str,
    pub primary_action: PrimaryAction,
    pub status_badge: Option<&'static str>,
    pub orb: OrbAppearance,
    pub muted: bool,
    pub error: Option<String>,
    /// Tap-outside dismissal is only allowed when nothing is in progress.
    pub can_dismiss: bool,
}

impl SurfaceModel {
    pub fn from_state(state: &SessionState) -> Self {
        let (primary_label, primary_action) = if state.is_connected() {
            ("Stop Talking", PrimaryAction::Stop)
        } else if state.is_loading() {
            ("Connecting...", PrimaryAction::Wait)
        } else {
            ("Start Talking", PrimaryAction::Start)
        };

        let status_badge = state.is_connected().then_some(if state.agent_speaking {
            "Agent Speaking"
        } else {
            "Ready to Talk"
        });

        let orb = if state.agent_speaking {
            OrbAppearance::AgentSpeaking
        } else if state.user_speaking {
            OrbAppearance::UserSpeaking
        } else if state.is_anyone_thinking() {
            OrbAppearance::Thinking
        } else {
            OrbAppearance::Dormant
        };

        Self {
            primary_label,
            primary_action,
            status_badge,
            orb,
            muted: state.is_muted,
            error: state.last_error.as_ref().map(|e| e.message.clone()),
            can_dismiss: !state.is_connected() && !state.is_loading(),
        }
    }
}

/// A surface attached to the store. Detaches on drop.
pub struct Surface {
    kind: SurfaceKind,
    store: Arc<SessionStore>,
    handle: SubscriptionHandle,
    model: Arc<Mutex<SurfaceModel>>,
}

impl Surface {
    pub fn attach(kind: SurfaceKind, store: Arc<SessionStore>) -> Self {
        let model = Arc::new(Mutex::new(SurfaceModel::from_state(&store.snapshot())));
        let sink = model.clone();
        let handle = store.subscribe(move |state| {
            let next = SurfaceModel::from_state(state);
            let mut current = sink.lock().unwrap_or_else(PoisonError::into_inner);
            if *current != next {
                debug!(
                    surface = kind.as_str(),
                    label = next.primary_label,
                    orb = ?next.orb,
                    "surface re-rendered"
                );
                *current = next;
            }
        });
        Self {
            kind,
            store,
            handle,
            model,
        }
    }

    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn model(&self) -> SurfaceModel {
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs whatever the primary button currently means.
    pub async fn press_primary(&self, controller: &VoiceSessionController, agent_id: &str) {
        match self.model().primary_action {
            PrimaryAction::Start => controller.start(agent_id).await,
            PrimaryAction::Stop => controller.end().await,
            PrimaryAction::Wait => {}
        }
    }

    /// Tap outside the modal. Returns `true` if the surface may close.
    pub fn request_dismiss(&self) -> bool {
        SurfaceModel::from_state(&self.store.snapshot()).can_dismiss
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.store.unsubscribe(self.handle);
    }
}
