//! The process-wide session state store.
//!
//! One [`SessionStore`] is constructed by the composition root at startup and
//! shared by reference with the controller and every UI surface for the
//! rest of the process. Only the controller commits; everyone else reads
//! snapshots or subscribes.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bahncy_types::{SessionState, StateInvariantViolation};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default capacity for the snapshot broadcast channel.
const DEFAULT_UPDATES_BROADCAST_CAPACITY: usize = 64;

type Observer = Arc<dyn Fn(&SessionState) + Send + Sync>;

thread_local! {
    // Address of the store whose observers this thread is running, which
    // means that store's delivery lock is already held. Zero when none.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as delivering for one store until dropped.
struct DeliveryScope {
    previous: usize,
}

impl DeliveryScope {
    fn enter(store: &SessionStore) -> Self {
        Self {
            previous: DELIVERING.with(|d| d.replace(store.address())),
        }
    }
}

impl Drop for DeliveryScope {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(self.previous));
    }
}

/// Registration returned by [`SessionStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

pub struct SessionStore {
    state: Mutex<SessionState>,
    observers: Mutex<Vec<(SubscriptionHandle, Observer)>>,
    // Held for the whole apply-and-notify sequence so every observer sees
    // commits in the same order.
    delivery: Mutex<()>,
    next_handle: AtomicU64,
    updates_tx: broadcast::Sender<SessionState>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.snapshot())
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Observers run outside the state lock, so a poisoned lock still guards
    // a consistent value.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionStore {
    pub fn new() -> Self {
        let (updates_tx, _) = broadcast::channel(DEFAULT_UPDATES_BROADCAST_CAPACITY);
        Self {
            state: Mutex::new(SessionState::default()),
            observers: Mutex::new(Vec::new()),
            delivery: Mutex::new(()),
            next_handle: AtomicU64::new(1),
            updates_tx,
        }
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> SessionState {
        lock(&self.state).clone()
    }

    /// Registers `observer`, calls it once with the current snapshot, then
    /// again after every committed change until [`unsubscribe`](Self::unsubscribe).
    ///
    /// Observers are called synchronously on the committing task. An observer
    /// may subscribe another one; the newcomer gets the snapshot being
    /// delivered as its initial value and joins from the next commit on.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionHandle
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let observer: Observer = Arc::new(observer);

        let reentrant = DELIVERING.with(Cell::get) == self.address();
        let _delivery = (!reentrant).then(|| lock(&self.delivery));
        lock(&self.observers).push((handle, observer.clone()));
        let initial = self.snapshot();
        let _scope = DeliveryScope::enter(self);
        observer(&initial);

        debug!(handle = handle.0, "observer subscribed");
        handle
    }

    /// Removes an observer. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|(h, _)| *h != handle);
        let removed = observers.len() != before;
        if removed {
            debug!(handle = handle.0, "observer unsubscribed");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    /// Returns a receiver carrying every published snapshot in commit order.
    pub fn updates(&self) -> broadcast::Receiver<SessionState> {
        self.updates_tx.subscribe()
    }

    /// Applies `mutation` to a copy of the current state, validates the
    /// result and publishes it.
    ///
    /// A mutation that leaves the state unchanged publishes nothing. A
    /// mutation that breaks an invariant is dropped and the store keeps its
    /// last valid value.
    pub(crate) fn commit<F>(&self, mutation: F) -> Result<SessionState, StateInvariantViolation>
    where
        F: FnOnce(&mut SessionState),
    {
        let _delivery = lock(&self.delivery);

        let published = {
            let mut current = lock(&self.state);
            let mut next = current.clone();
            mutation(&mut next);
            next.normalize();

            if let Err(violation) = next.validate_after(&current) {
                warn!(%violation, phase = %current.connection_phase, "dropping invalid state mutation");
                return Err(violation);
            }
            if next == *current {
                return Ok(next);
            }
            *current = next.clone();
            next
        };

        let observers: Vec<Observer> = lock(&self.observers)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        let _scope = DeliveryScope::enter(self);
        for observer in observers {
            observer(&published);
        }
        // No receivers is fine.
        let _ = self.updates_tx.send(published.clone());

        Ok(published)
    }
}
