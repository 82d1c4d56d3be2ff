//! Contract the controller requires from the remote voice-agent platform.
//!
//! Audio, transport and speech processing all live behind these traits. An
//! adapter for a concrete platform implements them; [`crate::SimulatedClient`]
//! is the in-process implementation used by the shell and the tests.

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};

use crate::config::ConversationConfig;
use crate::error::{RemoteCloseError, RemoteMuteError, RemoteOpenError};
use crate::event::{ActivityEvent, RemoteEvent, StatusEvent};

/// Opens conversations with a remote agent.
#[async_trait]
pub trait RemoteSessionClient: Send + Sync + 'static {
    async fn open(
        &self,
        agent_id: &str,
        config: &ConversationConfig,
    ) -> Result<Box<dyn RemoteSession>, RemoteOpenError>;
}

/// One open conversation on the remote platform.
///
/// Each event stream is lazy, unbounded and can be taken only once; a
/// second call returns an empty stream.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Best-effort close. Callers tolerate failure.
    async fn close(&self) -> Result<(), RemoteCloseError>;

    /// Requests a mute change. Confirmation arrives on the mute stream.
    async fn set_muted(&self, muted: bool) -> Result<(), RemoteMuteError>;

    fn status_events(&mut self) -> BoxStream<'static, String>;

    fn activity_events(&mut self) -> BoxStream<'static, String>;

    fn mute_events(&mut self) -> BoxStream<'static, bool>;
}

/// Takes all three streams from `session` and merges them into a single
/// decoded stream. Ordering within each source stream is preserved.
pub fn decoded_events(session: &mut dyn RemoteSession) -> BoxStream<'static, RemoteEvent> {
    let status = session
        .status_events()
        .map(|label| RemoteEvent::Status(StatusEvent::from_label(&label)));
    let activity = session
        .activity_events()
        .map(|label| RemoteEvent::Activity(ActivityEvent::from_label(&label)));
    let mute = session.mute_events().map(RemoteEvent::Mute);

    futures_util::stream::select_all([status.boxed(), activity.boxed(), mute.boxed()]).boxed()
}
