//! In-process stand-in for the remote voice-agent platform.
//!
//! No audio is captured or played. Sessions open after a configurable delay
//! and emit whatever status, activity and mute labels are pushed through
//! the [`SimulatedRemote`] handle. Mute commands are confirmed on the mute
//! stream the way the real platform does.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

use crate::config::ConversationConfig;
use crate::error::{RemoteCloseError, RemoteMuteError, RemoteOpenError};
use crate::remote::{RemoteSession, RemoteSessionClient};

const DEFAULT_CONNECT_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_AGENT_TURN: Duration = Duration::from_millis(1500);

#[derive(Debug, Default)]
struct Script {
    open_failure: Option<RemoteOpenError>,
    close_failure: Option<RemoteCloseError>,
    mute_failure: Option<RemoteMuteError>,
    current: Option<Emitters>,
}

#[derive(Debug, Clone)]
struct Emitters {
    status: mpsc::UnboundedSender<String>,
    activity: mpsc::UnboundedSender<String>,
    mute: mpsc::UnboundedSender<bool>,
}

#[derive(Debug, Default)]
struct Shared {
    script: Mutex<Script>,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
    mute_calls: AtomicUsize,
}

impl Shared {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A [`RemoteSessionClient`] backed by in-memory channels.
#[derive(Debug, Clone)]
pub struct SimulatedClient {
    connect_delay: Duration,
    agent_turn: Duration,
    shared: Arc<Shared>,
}

impl Default for SimulatedClient {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_DELAY)
    }
}

impl SimulatedClient {
    pub fn new(connect_delay: Duration) -> Self {
        Self {
            connect_delay,
            agent_turn: DEFAULT_AGENT_TURN,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn with_agent_turn(mut self, agent_turn: Duration) -> Self {
        self.agent_turn = agent_turn;
        self
    }

    /// Returns a handle for driving and inspecting sessions opened by this client.
    pub fn remote(&self) -> SimulatedRemote {
        SimulatedRemote {
            agent_turn: self.agent_turn,
            shared: self.shared.clone(),
        }
    }
}

#[async_trait]
impl RemoteSessionClient for SimulatedClient {
    async fn open(
        &self,
        agent_id: &str,
        config: &ConversationConfig,
    ) -> Result<Box<dyn RemoteSession>, RemoteOpenError> {
        self.shared.open_calls.fetch_add(1, Ordering::SeqCst);
        info!(
            agent_id,
            text_only = config.text_only,
            delay_ms = self.connect_delay.as_millis() as u64,
            "simulated platform opening conversation"
        );

        tokio::time::sleep(self.connect_delay).await;

        if let Some(error) = self.shared.script().open_failure.take() {
            return Err(error);
        }

        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (activity_tx, activity_rx) = mpsc::unbounded_channel();
        let (mute_tx, mute_rx) = mpsc::unbounded_channel();
        let emitters = Emitters {
            status: status_tx,
            activity: activity_tx,
            mute: mute_tx.clone(),
        };
        let _ = emitters.status.send("connected".to_string());
        self.shared.script().current = Some(emitters);

        Ok(Box::new(SimulatedSession {
            shared: self.shared.clone(),
            mute_tx,
            closed: AtomicBool::new(false),
            status_rx: Mutex::new(Some(status_rx)),
            activity_rx: Mutex::new(Some(activity_rx)),
            mute_rx: Mutex::new(Some(mute_rx)),
        }))
    }
}

/// Test and demo handle for a [`SimulatedClient`].
#[derive(Debug, Clone)]
pub struct SimulatedRemote {
    agent_turn: Duration,
    shared: Arc<Shared>,
}

impl SimulatedRemote {
    /// Makes the next `open` fail with `error` after the connect delay.
    pub fn fail_next_open(&self, error: RemoteOpenError) {
        self.shared.script().open_failure = Some(error);
    }

    pub fn fail_next_close(&self, error: RemoteCloseError) {
        self.shared.script().close_failure = Some(error);
    }

    pub fn fail_next_mute(&self, error: RemoteMuteError) {
        self.shared.script().mute_failure = Some(error);
    }

    /// Pushes a raw status label into the latest session. Returns `false` when
    /// no session is open.
    pub fn emit_status(&self, label: &str) -> bool {
        self.emit(|e| e.status.send(label.to_string()).is_ok())
    }

    pub fn emit_activity(&self, label: &str) -> bool {
        self.emit(|e| e.activity.send(label.to_string()).is_ok())
    }

    pub fn emit_mute(&self, muted: bool) -> bool {
        self.emit(|e| e.mute.send(muted).is_ok())
    }

    /// Plays one scripted agent turn: speaking, then back to listening.
    pub async fn play_agent_turn(&self) {
        if !self.emit_activity("speaking") {
            return;
        }
        tokio::time::sleep(self.agent_turn).await;
        self.emit_activity("listening");
    }

    pub fn open_calls(&self) -> usize {
        self.shared.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }

    pub fn mute_calls(&self) -> usize {
        self.shared.mute_calls.load(Ordering::SeqCst)
    }

    fn emit(&self, send: impl FnOnce(&Emitters) -> bool) -> bool {
        match self.shared.script().current.as_ref() {
            Some(emitters) => send(emitters),
            None => false,
        }
    }
}

struct SimulatedSession {
    shared: Arc<Shared>,
    mute_tx: mpsc::UnboundedSender<bool>,
    closed: AtomicBool,
    status_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    activity_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    mute_rx: Mutex<Option<mpsc::UnboundedReceiver<bool>>>,
}

fn take_stream<T: Send + 'static>(
    slot: &mut Mutex<Option<mpsc::UnboundedReceiver<T>>>,
) -> BoxStream<'static, T> {
    match slot.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
        Some(rx) => UnboundedReceiverStream::new(rx).boxed(),
        None => stream::empty().boxed(),
    }
}

#[async_trait]
impl RemoteSession for SimulatedSession {
    async fn close(&self) -> Result<(), RemoteCloseError> {
        self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);

        let mut script = self.shared.script();
        if script
            .current
            .as_ref()
            .is_some_and(|e| e.mute.same_channel(&self.mute_tx))
        {
            script.current = None;
        }
        match script.close_failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn set_muted(&self, muted: bool) -> Result<(), RemoteMuteError> {
        self.shared.mute_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(RemoteMuteError::NotConnected);
        }
        if let Some(error) = self.shared.script().mute_failure.take() {
            return Err(error);
        }
        self.mute_tx
            .send(muted)
            .map_err(|_| RemoteMuteError::NotConnected)
    }

    fn status_events(&mut self) -> BoxStream<'static, String> {
        take_stream(&mut self.status_rx)
    }

    fn activity_events(&mut self) -> BoxStream<'static, String> {
        take_stream(&mut self.activity_rx)
    }

    fn mute_events(&mut self) -> BoxStream<'static, bool> {
        take_stream(&mut self.mute_rx)
    }
}
