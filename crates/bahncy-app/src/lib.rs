//! Composition root for the BahnCy voice shell.
//!
//! Builds the single [`SessionStore`] for the process, hands it to the
//! controller and to each presentation surface, and exposes the voice
//! shortcut and the command shell that drive them.

pub mod config;
pub mod shell;
pub mod shortcut;
pub mod surface;

use std::sync::Arc;

use bahncy_voice::{SessionStore, SimulatedClient, SimulatedRemote, VoiceSessionController};

use crate::config::Config;

/// Everything the process shares, constructed once at startup.
pub struct App {
    pub store: Arc<SessionStore>,
    pub controller: VoiceSessionController,
    pub remote: SimulatedRemote,
    pub shortcut: shortcut::VoiceShortcut,
}

impl App {
    /// Wires a fresh store and controller against the simulated platform.
    pub fn new(config: &Config) -> Self {
        let client = SimulatedClient::new(config.simulator.connect_delay())
            .with_agent_turn(config.simulator.agent_turn());
        let remote = client.remote();
        let store = Arc::new(SessionStore::new());
        let controller =
            VoiceSessionController::new(store.clone(), Arc::new(client), config.controller());

        Self {
            store,
            controller,
            remote,
            shortcut: shortcut::VoiceShortcut::new(config.agent.id.clone()),
        }
    }

    pub fn into_shell(self) -> shell::Shell {
        shell::Shell::new(self.controller, self.remote, self.shortcut)
    }
}
