//! Voice session core for the BahnCy shell.
//!
//! Owns the lifecycle of a single live conversation with a remote
//! conversational agent and publishes its state to any number of UI
//! surfaces. Speech recognition, synthesis, audio and transport are all
//! delegated to the remote platform behind [`RemoteSessionClient`].
//!
//! The flow is one-directional:
//!
//! ```text
//! surface --command--> VoiceSessionController --open/close/mute--> remote
//! remote --status/activity/mute events--> controller --commit--> SessionStore
//! SessionStore --snapshot fan-out--> every subscribed surface
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bahncy_voice::{ControllerConfig, SessionStore, SimulatedClient, VoiceSessionController};
//!
//! let store = Arc::new(SessionStore::new());
//! let controller = VoiceSessionController::new(
//!     store.clone(),
//!     Arc::new(SimulatedClient::default()),
//!     ControllerConfig::default(),
//! );
//! store.subscribe(|state| println!("{}", state.connection_phase));
//! controller.start("agent-1").await;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod remote;
pub mod simulated;
pub mod store;

pub use config::{ControllerConfig, ConversationConfig};
pub use controller::VoiceSessionController;
pub use error::{RemoteCloseError, RemoteMuteError, RemoteOpenError};
pub use event::{ActivityEvent, RemoteEvent, StatusEvent};
pub use remote::{decoded_events, RemoteSession, RemoteSessionClient};
pub use simulated::{SimulatedClient, SimulatedRemote};
pub use store::{SessionStore, SubscriptionHandle};

pub use bahncy_types::{
    ConnectionPhase, ErrorKind, LastError, SessionState, StateInvariantViolation,
};
