//! Lifecycle tests for the voice session controller.
//!
//! Every test runs on a paused clock so connect delays and timeouts resolve
//! deterministically, and records every published snapshot so the state
//! invariants can be checked across the whole run.

use async_trait::async_trait;
use bahncy_voice::{
    ConnectionPhase, ControllerConfig, ConversationConfig, ErrorKind, RemoteCloseError,
    RemoteMuteError, RemoteOpenError, RemoteSession, RemoteSessionClient, SessionState,
    SessionStore, SimulatedClient, SimulatedRemote, VoiceSessionController,
};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

const AGENT: &str = "agent-1";

struct Harness {
    controller: VoiceSessionController,
    remote: SimulatedRemote,
    seen: Arc<Mutex<Vec<SessionState>>>,
}

impl Harness {
    fn new() -> Self {
        let client = SimulatedClient::new(Duration::from_millis(500))
            .with_agent_turn(Duration::from_millis(300));
        let remote = client.remote();
        let controller = controller_with(Arc::new(client), ControllerConfig::default());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        controller
            .store()
            .subscribe(move |state| sink.lock().unwrap().push(state.clone()));

        Self {
            controller,
            remote,
            seen,
        }
    }

    fn state(&self) -> SessionState {
        self.controller.snapshot()
    }

    fn phases(&self) -> Vec<ConnectionPhase> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.connection_phase.clone())
            .collect()
    }

    fn published(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Every published snapshot must satisfy the store invariants, and the
    /// phase sequence must never jump from Idle straight to Active.
    fn assert_invariants(&self) {
        let seen = self.seen.lock().unwrap();
        for state in seen.iter() {
            assert!(state.validate().is_ok(), "invalid snapshot {state:?}");
            assert!(!(state.agent_speaking && state.user_speaking));
            assert!(!state.is_muted || !state.user_speaking);
        }
        for pair in seen.windows(2) {
            assert!(
                !(pair[0].connection_phase == ConnectionPhase::Idle
                    && pair[1].connection_phase == ConnectionPhase::Active),
                "phase skipped connecting"
            );
        }
    }

    async fn start_active(&self) {
        self.controller.start(AGENT).await;
        settle().await;
        assert_eq!(self.state().connection_phase, ConnectionPhase::Active);
    }
}

fn controller_with(
    client: Arc<dyn RemoteSessionClient>,
    config: ControllerConfig,
) -> VoiceSessionController {
    VoiceSessionController::new(Arc::new(SessionStore::new()), client, config)
}

/// Lets the event pump drain whatever the simulated remote emitted.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_start_passes_through_connecting() {
    let h = Harness::new();
    h.start_active().await;

    assert_eq!(
        h.phases(),
        vec![
            ConnectionPhase::Idle,
            ConnectionPhase::Connecting,
            ConnectionPhase::Active
        ]
    );
    assert_eq!(h.remote.open_calls(), 1);
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_agent_speaking_then_listening() {
    let h = Harness::new();
    h.start_active().await;

    assert!(h.remote.emit_activity("agent_speaking"));
    settle().await;
    let state = h.state();
    assert!(state.agent_speaking);
    assert!(!state.user_speaking);

    assert!(h.remote.emit_activity("listening"));
    settle().await;
    let state = h.state();
    assert!(!state.agent_speaking);
    assert!(!state.user_speaking);
    assert!(state.is_anyone_thinking());
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_scripted_agent_turn() {
    let h = Harness::new();
    h.start_active().await;

    let remote = h.remote.clone();
    let turn = tokio::spawn(async move { remote.play_agent_turn().await });
    settle().await;
    assert!(h.state().agent_speaking);

    turn.await.unwrap();
    settle().await;
    assert!(!h.state().agent_speaking);
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_open_failure_surfaces_error_and_allows_retry() {
    let h = Harness::new();
    h.remote
        .fail_next_open(RemoteOpenError::Rejected("network".to_string()));

    h.controller.start(AGENT).await;

    let state = h.state();
    assert_eq!(state.connection_phase, ConnectionPhase::Idle);
    let error = state.last_error.expect("open failure should be surfaced");
    assert_eq!(error.message, "network");
    assert_eq!(error.kind, ErrorKind::Open);
    assert!(h
        .phases()
        .contains(&ConnectionPhase::Error("network".to_string())));

    h.controller.start(AGENT).await;
    assert_eq!(h.remote.open_calls(), 2);
    let state = h.state();
    assert_eq!(state.connection_phase, ConnectionPhase::Active);
    assert!(state.last_error.is_none());
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_starts_open_once() {
    let h = Harness::new();

    tokio::join!(h.controller.start(AGENT), h.controller.start(AGENT));

    assert_eq!(h.remote.open_calls(), 1);
    assert_eq!(h.state().connection_phase, ConnectionPhase::Active);
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_end_when_idle_is_a_no_op() {
    let h = Harness::new();

    h.controller.end().await;

    assert_eq!(h.published(), 1);
    assert_eq!(h.remote.close_calls(), 0);
    assert_eq!(h.state(), SessionState::default());
}

#[tokio::test(start_paused = true)]
async fn test_toggle_mute_when_idle_is_a_no_op() {
    let h = Harness::new();

    h.controller.toggle_mute().await;

    assert_eq!(h.published(), 1);
    assert_eq!(h.remote.mute_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_end_resets_everything() {
    let h = Harness::new();
    h.start_active().await;
    h.controller.toggle_mute().await;
    h.remote.emit_activity("speaking");
    settle().await;
    assert!(h.state().is_muted);
    assert!(h.state().agent_speaking);

    h.controller.end().await;

    let state = h.state();
    assert_eq!(state.connection_phase, ConnectionPhase::Idle);
    assert!(!state.is_muted);
    assert!(!state.agent_speaking);
    assert!(!state.user_speaking);
    assert_eq!(h.remote.close_calls(), 1);
    let phases = h.phases();
    assert_eq!(
        &phases[phases.len() - 2..],
        &[ConnectionPhase::Ending, ConnectionPhase::Idle]
    );
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_end_during_pending_start_cancels_connect() {
    let h = Harness::new();

    let controller = h.controller.clone();
    let pending = tokio::spawn(async move { controller.start(AGENT).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.state().connection_phase, ConnectionPhase::Connecting);

    h.controller.end().await;
    assert_eq!(h.state().connection_phase, ConnectionPhase::Idle);

    pending.await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(h.state().connection_phase, ConnectionPhase::Idle);
    assert_eq!(h.remote.open_calls(), 1);
    assert!(!h.remote.emit_status("connected"));
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_dropped_start_still_settles() {
    let h = Harness::new();

    let gave_up = tokio::time::timeout(Duration::from_millis(100), h.controller.start(AGENT)).await;
    assert!(gave_up.is_err());
    assert_eq!(h.state().connection_phase, ConnectionPhase::Connecting);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.state().connection_phase, ConnectionPhase::Active);
    assert_eq!(h.remote.open_calls(), 1);

    h.controller.end().await;
    assert_eq!(h.state().connection_phase, ConnectionPhase::Idle);
    assert_eq!(h.remote.close_calls(), 1);

    h.start_active().await;
    assert_eq!(h.remote.open_calls(), 2);
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_toggle_mute_waits_for_confirmation() {
    let h = Harness::new();
    h.start_active().await;

    h.controller.toggle_mute().await;
    assert!(h.state().is_muted);
    assert_eq!(h.remote.mute_calls(), 1);

    h.controller.toggle_mute().await;
    assert!(!h.state().is_muted);
    assert_eq!(h.remote.mute_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_toggles_flip_twice() {
    let h = Harness::new();
    h.start_active().await;

    tokio::join!(h.controller.toggle_mute(), h.controller.toggle_mute());

    assert_eq!(h.remote.mute_calls(), 2);
    assert!(!h.state().is_muted);
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_mute_failure_leaves_mute_state_unchanged() {
    let h = Harness::new();
    h.start_active().await;
    h.remote
        .fail_next_mute(RemoteMuteError::Rejected("denied".to_string()));

    h.controller.toggle_mute().await;

    let state = h.state();
    assert!(!state.is_muted);
    assert_eq!(state.connection_phase, ConnectionPhase::Active);
    assert_eq!(state.last_error.map(|e| e.kind), Some(ErrorKind::Mute));
}

#[tokio::test(start_paused = true)]
async fn test_muted_user_is_never_speaking() {
    let h = Harness::new();
    h.start_active().await;

    h.remote.emit_activity("user_speaking");
    settle().await;
    assert!(h.state().user_speaking);

    h.remote.emit_mute(true);
    settle().await;
    let state = h.state();
    assert!(state.is_muted);
    assert!(!state.user_speaking);

    h.remote.emit_activity("user_speaking");
    settle().await;
    assert!(!h.state().user_speaking);
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_late_mute_confirmation_does_not_resurrect() {
    let h = Harness::new();
    h.start_active().await;

    // Queued but not yet applied when the session is torn down.
    assert!(h.remote.emit_mute(true));
    h.controller.end().await;
    settle().await;
    assert!(!h.state().is_muted);

    assert!(!h.remote.emit_mute(true));
    settle().await;
    let state = h.state();
    assert!(!state.is_muted);
    assert_eq!(state.connection_phase, ConnectionPhase::Idle);
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_remote_disconnect_returns_to_idle() {
    let h = Harness::new();
    h.start_active().await;
    h.remote.emit_activity("speaking");
    settle().await;

    h.remote.emit_status("disconnected");
    settle().await;

    let state = h.state();
    assert_eq!(state.connection_phase, ConnectionPhase::Idle);
    assert!(!state.agent_speaking);
    assert!(state.last_error.is_none());
    h.assert_invariants();

    h.controller.start(AGENT).await;
    assert_eq!(h.state().connection_phase, ConnectionPhase::Active);
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_surfaces_error() {
    let h = Harness::new();
    h.start_active().await;

    h.remote.emit_status("error");
    settle().await;

    let state = h.state();
    assert_eq!(state.connection_phase, ConnectionPhase::Idle);
    assert_eq!(state.last_error.map(|e| e.kind), Some(ErrorKind::Remote));
    assert!(h
        .phases()
        .contains(&ConnectionPhase::Error("error".to_string())));
    assert_eq!(h.remote.close_calls(), 1);
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_remote_reconnect_cycles_through_connecting() {
    let h = Harness::new();
    h.start_active().await;
    h.remote.emit_activity("speaking");

    h.remote.emit_status("reconnecting");
    settle().await;
    let state = h.state();
    assert_eq!(state.connection_phase, ConnectionPhase::Connecting);
    assert!(!state.agent_speaking);

    h.remote.emit_status("connected");
    settle().await;
    assert_eq!(h.state().connection_phase, ConnectionPhase::Active);
    h.assert_invariants();
}

#[tokio::test(start_paused = true)]
async fn test_unknown_labels_are_ignored() {
    let h = Harness::new();
    h.start_active().await;
    let before = h.published();

    h.remote.emit_status("handshaking");
    settle().await;

    assert_eq!(h.published(), before);
    assert_eq!(h.state().connection_phase, ConnectionPhase::Active);
}

#[tokio::test(start_paused = true)]
async fn test_close_failure_still_resets() {
    let h = Harness::new();
    h.start_active().await;
    h.remote
        .fail_next_close(RemoteCloseError::Transport("socket reset".to_string()));

    h.controller.end().await;

    let state = h.state();
    assert_eq!(state.connection_phase, ConnectionPhase::Idle);
    assert!(state.last_error.is_none());
    assert_eq!(h.remote.close_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_error_keeps_phase() {
    let h = Harness::new();
    h.remote
        .fail_next_open(RemoteOpenError::Transport("offline".to_string()));
    h.controller.start(AGENT).await;
    assert!(h.state().last_error.is_some());

    h.controller.dismiss_error().await;

    let state = h.state();
    assert!(state.last_error.is_none());
    assert_eq!(state.connection_phase, ConnectionPhase::Idle);
}

/// A platform whose calls never settle.
struct StalledClient;

struct StalledSession;

#[async_trait]
impl RemoteSessionClient for StalledClient {
    async fn open(
        &self,
        _agent_id: &str,
        _config: &ConversationConfig,
    ) -> Result<Box<dyn RemoteSession>, RemoteOpenError> {
        std::future::pending().await
    }
}

/// Opens immediately, then hangs on close.
struct HangingCloseClient;

#[async_trait]
impl RemoteSessionClient for HangingCloseClient {
    async fn open(
        &self,
        _agent_id: &str,
        _config: &ConversationConfig,
    ) -> Result<Box<dyn RemoteSession>, RemoteOpenError> {
        Ok(Box::new(StalledSession))
    }
}

#[async_trait]
impl RemoteSession for StalledSession {
    async fn close(&self) -> Result<(), RemoteCloseError> {
        std::future::pending().await
    }

    async fn set_muted(&self, _muted: bool) -> Result<(), RemoteMuteError> {
        std::future::pending().await
    }

    fn status_events(&mut self) -> BoxStream<'static, String> {
        stream::pending().boxed()
    }

    fn activity_events(&mut self) -> BoxStream<'static, String> {
        stream::pending().boxed()
    }

    fn mute_events(&mut self) -> BoxStream<'static, bool> {
        stream::pending().boxed()
    }
}

/// Opens only once the gate is released, with a session that counts closes.
struct GatedClient {
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    closes: Arc<AtomicUsize>,
}

struct CountingSession {
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteSessionClient for GatedClient {
    async fn open(
        &self,
        _agent_id: &str,
        _config: &ConversationConfig,
    ) -> Result<Box<dyn RemoteSession>, RemoteOpenError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(Box::new(CountingSession {
            closes: self.closes.clone(),
        }))
    }
}

#[async_trait]
impl RemoteSession for CountingSession {
    async fn close(&self) -> Result<(), RemoteCloseError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_muted(&self, _muted: bool) -> Result<(), RemoteMuteError> {
        Ok(())
    }

    fn status_events(&mut self) -> BoxStream<'static, String> {
        stream::pending().boxed()
    }

    fn activity_events(&mut self) -> BoxStream<'static, String> {
        stream::pending().boxed()
    }

    fn mute_events(&mut self) -> BoxStream<'static, bool> {
        stream::pending().boxed()
    }
}

#[tokio::test(start_paused = true)]
async fn test_open_resolving_after_end_is_discarded() {
    let (release, gate) = oneshot::channel();
    let closes = Arc::new(AtomicUsize::new(0));
    let client = GatedClient {
        gate: Mutex::new(Some(gate)),
        closes: closes.clone(),
    };
    let controller = controller_with(Arc::new(client), ControllerConfig::default());

    let starter = controller.clone();
    let pending = tokio::spawn(async move { starter.start(AGENT).await });
    settle().await;
    assert_eq!(
        controller.snapshot().connection_phase,
        ConnectionPhase::Connecting
    );

    // The open has resolved but not been applied when end runs.
    release.send(()).unwrap();
    controller.end().await;
    assert_eq!(controller.snapshot().connection_phase, ConnectionPhase::Idle);

    pending.await.unwrap();
    settle().await;

    assert_eq!(controller.snapshot().connection_phase, ConnectionPhase::Idle);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_is_an_open_failure() {
    let controller = controller_with(Arc::new(StalledClient), ControllerConfig::default());

    controller.start(AGENT).await;

    let state = controller.snapshot();
    assert_eq!(state.connection_phase, ConnectionPhase::Idle);
    assert_eq!(
        state.last_error.map(|e| e.message),
        Some("timed out".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_hanging_close_is_bounded() {
    let config = ControllerConfig {
        close_timeout_ms: 200,
        ..ControllerConfig::default()
    };
    let controller = controller_with(Arc::new(HangingCloseClient), config);
    controller.start(AGENT).await;
    assert_eq!(
        controller.snapshot().connection_phase,
        ConnectionPhase::Active
    );

    controller.end().await;

    assert_eq!(controller.snapshot().connection_phase, ConnectionPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_mute_reports_timeout() {
    let config = ControllerConfig {
        close_timeout_ms: 200,
        ..ControllerConfig::default()
    };
    let controller = controller_with(Arc::new(HangingCloseClient), config);
    controller.start(AGENT).await;

    controller.toggle_mute().await;

    let state = controller.snapshot();
    assert!(!state.is_muted);
    assert_eq!(state.last_error.map(|e| e.kind), Some(ErrorKind::Mute));
}

#[tokio::test(start_paused = true)]
async fn test_surfaces_share_one_store() {
    let h = Harness::new();
    let store = h.controller.store().clone();

    let modal_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = modal_seen.clone();
    let modal = store.subscribe(move |state| sink.lock().unwrap().push(state.clone()));

    h.start_active().await;
    h.remote.emit_activity("speaking");
    settle().await;

    assert!(store.unsubscribe(modal));
    h.controller.end().await;

    let modal_seen = modal_seen.lock().unwrap();
    let full_seen = h.seen.lock().unwrap();
    assert_eq!(modal_seen.as_slice(), &full_seen[..modal_seen.len()]);
    assert!(full_seen.len() > modal_seen.len());
}
