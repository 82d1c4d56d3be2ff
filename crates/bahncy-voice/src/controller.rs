//! Voice session controller: the only writer of the [`SessionStore`] and the
//! only holder of an open remote session.
//!
//! Commands and remote events are serialized through one async mutex, and
//! mute toggles additionally queue behind each other. Every
//! connection attempt gets a fresh generation number; anything that settles
//! under an older generation (a late `open`, a queued event from a torn-down
//! session) is discarded instead of being applied.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use bahncy_types::{ConnectionPhase, ErrorKind, LastError, SessionState};
use futures_util::stream::{BoxStream, StreamExt};
use futures_util::FutureExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::error::{RemoteCloseError, RemoteMuteError, RemoteOpenError};
use crate::event::{RemoteEvent, StatusEvent};
use crate::remote::{decoded_events, RemoteSession, RemoteSessionClient};
use crate::store::SessionStore;

/// Orchestrates start, end and mute against a [`RemoteSessionClient`].
///
/// Cloning is cheap; all clones drive the same session. Commands never
/// return errors: failures land in `SessionState::last_error`.
#[derive(Clone)]
pub struct VoiceSessionController {
    shared: Arc<Shared>,
}

struct Shared {
    store: Arc<SessionStore>,
    client: Arc<dyn RemoteSessionClient>,
    config: ControllerConfig,
    inner: Mutex<Inner>,
    // Held across a whole toggle, from send to confirmation.
    mute: Mutex<()>,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    pending: Option<oneshot::Sender<()>>,
    session: Option<ActiveSession>,
}

struct ActiveSession {
    remote: Arc<dyn RemoteSession>,
    pump: JoinHandle<()>,
}

fn silence(state: &mut SessionState) {
    state.agent_speaking = false;
    state.user_speaking = false;
    state.is_muted = false;
}

impl std::fmt::Debug for VoiceSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSessionController")
            .field("store", &self.shared.store)
            .field("config", &self.shared.config)
            .finish()
    }
}

impl VoiceSessionController {
    pub fn new(
        store: Arc<SessionStore>,
        client: Arc<dyn RemoteSessionClient>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                client,
                config,
                inner: Mutex::new(Inner::default()),
                mute: Mutex::new(()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.shared.store
    }

    pub fn snapshot(&self) -> SessionState {
        self.shared.store.snapshot()
    }

    /// Opens a conversation with `agent_id`.
    ///
    /// Ignored while a session is connecting or active. Returns once the
    /// attempt has settled: active, failed, or cancelled by [`end`](Self::end).
    /// The attempt runs on its own task, so dropping the returned future does
    /// not abandon it.
    pub async fn start(&self, agent_id: &str) {
        let shared = &self.shared;
        let (generation, task) = {
            let mut inner = shared.inner.lock().await;
            let phase = shared.store.snapshot().connection_phase;
            if phase.is_busy() {
                debug!(agent_id, %phase, "start ignored: session already in progress");
                return;
            }

            let committed = shared.store.commit(|s| {
                s.connection_phase = ConnectionPhase::Connecting;
                s.last_error = None;
            });
            if committed.is_err() {
                return;
            }
            inner.generation += 1;
            let generation = inner.generation;

            let (cancel_tx, cancel_rx) = oneshot::channel();
            inner.pending = Some(cancel_tx);
            let task = tokio::spawn(connect(
                Arc::clone(shared),
                generation,
                agent_id.to_string(),
                cancel_rx,
            ));
            (generation, task)
        };

        info!(agent_id, generation, "opening conversation");

        if let Err(e) = task.await {
            warn!(generation, error = %e, "connect task did not finish");
        }
    }

    /// Tears down the current session, or cancels a pending connect.
    ///
    /// Local state always ends at `Idle`, whatever the remote close returns.
    pub async fn end(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        let phase = shared.store.snapshot().connection_phase;
        if phase == ConnectionPhase::Idle && inner.pending.is_none() && inner.session.is_none() {
            debug!("end ignored: no session");
            return;
        }

        inner.generation += 1;
        let generation = inner.generation;
        info!(generation, from = %phase, "ending conversation");

        let _ = shared.store.commit(|s| {
            s.connection_phase = ConnectionPhase::Ending;
            silence(s);
        });

        if let Some(pending) = inner.pending.take() {
            let _ = pending.send(());
            debug!(generation, "cancelled in-flight connect");
        }
        if let Some(active) = inner.session.take() {
            active.pump.abort();
            if let Err(error) = shared.close_remote(active.remote.as_ref()).await {
                warn!(%error, "remote close failed; resetting local state anyway");
            }
        }

        let _ = shared.store.commit(|s| {
            s.connection_phase = ConnectionPhase::Idle;
            silence(s);
        });
    }

    /// Asks the remote side to flip the mute state.
    ///
    /// `is_muted` only changes when the remote confirms through its mute
    /// stream. Ignored unless the session is active. Toggles run one at a
    /// time, each against the state the previous one left behind.
    pub async fn toggle_mute(&self) {
        let shared = &self.shared;
        let _toggle = shared.mute.lock().await;
        let (remote, generation, target) = {
            let inner = shared.inner.lock().await;
            let state = shared.store.snapshot();
            let Some(active) = inner.session.as_ref().filter(|_| state.is_connected()) else {
                debug!(phase = %state.connection_phase, "toggle_mute ignored: not active");
                return;
            };
            (active.remote.clone(), inner.generation, !state.is_muted)
        };

        let mut updates = shared.store.updates();
        let sent = match timeout(shared.config.close_timeout(), remote.set_muted(target)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteMuteError::TimedOut),
        };
        if let Err(error) = sent {
            warn!(%error, muted = target, "mute command failed");
            let inner = shared.inner.lock().await;
            if inner.generation == generation {
                let _ = shared
                    .store
                    .commit(|s| s.last_error = Some(LastError::new(ErrorKind::Mute, error.to_string())));
            }
            return;
        }

        let confirmation = async {
            loop {
                match updates.recv().await {
                    Ok(state) if !state.is_connected() => return false,
                    Ok(state) if state.is_muted == target => return true,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return false,
                }
            }
        };
        match timeout(shared.config.mute_confirm_timeout(), confirmation).await {
            Ok(true) => debug!(muted = target, "mute confirmed"),
            Ok(false) => debug!(muted = target, "session ended before mute confirmation"),
            Err(_) => warn!(muted = target, "no mute confirmation from remote"),
        }
    }

    /// Clears `last_error` without touching the connection phase.
    pub async fn dismiss_error(&self) {
        let _inner = self.shared.inner.lock().await;
        let _ = self.shared.store.commit(|s| s.last_error = None);
    }
}

impl Shared {
    async fn settle_open(
        self: &Arc<Self>,
        generation: u64,
        outcome: Result<Box<dyn RemoteSession>, RemoteOpenError>,
    ) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            if let Ok(session) = outcome {
                debug!(generation, "discarding late session from a cancelled start");
                self.spawn_close(Arc::from(session));
            }
            return;
        }
        inner.pending = None;

        match outcome {
            Ok(mut session) => {
                let events = decoded_events(session.as_mut());
                let remote: Arc<dyn RemoteSession> = Arc::from(session);
                let pump = tokio::spawn(pump_events(Arc::downgrade(self), generation, events));

                if self
                    .store
                    .commit(|s| s.connection_phase = ConnectionPhase::Active)
                    .is_err()
                {
                    pump.abort();
                    self.spawn_close(remote);
                    return;
                }
                inner.session = Some(ActiveSession { remote, pump });
                info!(generation, "conversation active");
            }
            Err(error) => {
                warn!(%error, generation, "failed to open conversation");
                self.fail(&error.reason(), ErrorKind::Open);
            }
        }
    }

    /// Applies one decoded event. Returns `false` once the session is gone
    /// and the pump should stop.
    async fn apply_event(&self, generation: u64, event: RemoteEvent) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.session.is_none() {
            debug!(generation, ?event, "discarding event from a stale session");
            return false;
        }
        let phase = self.store.snapshot().connection_phase;

        match event {
            RemoteEvent::Mute(muted) => {
                if phase == ConnectionPhase::Active {
                    let _ = self.store.commit(|s| s.is_muted = muted);
                } else {
                    debug!(muted, %phase, "ignoring mute event outside active phase");
                }
            }
            RemoteEvent::Activity(activity) => {
                if phase == ConnectionPhase::Active {
                    let (agent, user) = activity.speakers();
                    let _ = self.store.commit(|s| {
                        s.agent_speaking = agent;
                        s.user_speaking = user;
                    });
                } else {
                    debug!(label = activity.as_str(), %phase, "ignoring activity outside active phase");
                }
            }
            RemoteEvent::Status(status) => match status {
                StatusEvent::Connected if phase == ConnectionPhase::Connecting => {
                    let _ = self
                        .store
                        .commit(|s| s.connection_phase = ConnectionPhase::Active);
                    info!(generation, "conversation reconnected");
                }
                StatusEvent::Connecting if phase == ConnectionPhase::Active => {
                    let _ = self.store.commit(|s| {
                        s.connection_phase = ConnectionPhase::Connecting;
                        silence(s);
                    });
                    info!(generation, "remote is reconnecting");
                }
                StatusEvent::Connected | StatusEvent::Connecting => {}
                StatusEvent::Disconnected => {
                    info!(generation, "remote ended the conversation");
                    inner.generation += 1;
                    if let Some(active) = inner.session.take() {
                        active.pump.abort();
                    }
                    let _ = self.store.commit(|s| {
                        s.connection_phase = ConnectionPhase::Ending;
                        silence(s);
                    });
                    let _ = self.store.commit(|s| s.connection_phase = ConnectionPhase::Idle);
                    return false;
                }
                StatusEvent::Failed(reason) => {
                    warn!(generation, %reason, "remote reported a session failure");
                    inner.generation += 1;
                    if let Some(active) = inner.session.take() {
                        active.pump.abort();
                        self.spawn_close(active.remote);
                    }
                    self.fail(&reason, ErrorKind::Remote);
                    return false;
                }
                StatusEvent::Unknown(label) => {
                    debug!(%label, "ignoring unrecognized status label");
                }
            },
        }
        true
    }

    /// Surfaces `reason` as an error phase, then settles at `Idle` so a
    /// retry is immediately possible.
    fn fail(&self, reason: &str, kind: ErrorKind) {
        let _ = self.store.commit(|s| {
            s.connection_phase = ConnectionPhase::Error(reason.to_string());
            s.last_error = Some(LastError::new(kind, reason));
            silence(s);
        });
        let _ = self
            .store
            .commit(|s| s.connection_phase = ConnectionPhase::Idle);
    }

    async fn close_remote(&self, remote: &dyn RemoteSession) -> Result<(), RemoteCloseError> {
        match timeout(self.config.close_timeout(), remote.close()).await {
            Ok(result) => result,
            Err(_) => Err(RemoteCloseError::TimedOut),
        }
    }

    fn spawn_close(&self, remote: Arc<dyn RemoteSession>) {
        let limit = self.config.close_timeout();
        tokio::spawn(async move {
            match timeout(limit, remote.close()).await {
                Ok(Ok(())) => debug!("closed orphaned remote session"),
                Ok(Err(error)) => warn!(%error, "failed to close orphaned remote session"),
                Err(_) => warn!(error = %RemoteCloseError::TimedOut, "failed to close orphaned remote session"),
            }
        });
    }
}

/// Runs one connect attempt to completion and applies its outcome. Owned by
/// its own task so the caller of `start` may go away at any point.
async fn connect(
    shared: Arc<Shared>,
    generation: u64,
    agent_id: String,
    cancel: oneshot::Receiver<()>,
) {
    let client = shared.client.clone();
    let conversation = shared.config.conversation.clone();
    let open = AssertUnwindSafe(timeout(
        shared.config.connect_timeout(),
        client.open(&agent_id, &conversation),
    ))
    .catch_unwind();

    let outcome = tokio::select! {
        // A session that is already open wins over a cancellation that
        // arrived in the same tick; settle_open closes it.
        biased;
        result = open => match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RemoteOpenError::TimedOut),
            Err(_) => Err(RemoteOpenError::Transport("remote client panicked".to_string())),
        },
        _ = cancel => {
            debug!(generation, "connect attempt cancelled");
            return;
        }
    };
    shared.settle_open(generation, outcome).await;
}

async fn pump_events(
    shared: Weak<Shared>,
    generation: u64,
    mut events: BoxStream<'static, RemoteEvent>,
) {
    while let Some(event) = events.next().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if !shared.apply_event(generation, event).await {
            return;
        }
    }
    debug!(generation, "remote event streams closed");
}
