// Typed event channel
//
// Synchronous multi-listener dispatch keyed by event kind. Listeners run on
// the emitting task, in registration order. A panicking listener does not
// stop delivery to the others: the failure is redirected to the component's
// error event when somebody listens for it, otherwise it is re-raised on a
// separate task so it still shows up.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, warn};

/// An event that can travel through an [`EventChannel`].
pub trait ChannelEvent: Send + Sync + 'static {
    /// Event name used as the dispatch key.
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;

    /// Event used to report a failed listener, if this event family has one.
    fn listener_failure(message: String) -> Option<Self>
    where
        Self: Sized;
}

/// Handle returned by [`EventChannel::on`], used to unregister a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listener<E> {
    id: ListenerId,
    once: bool,
    callback: Callback<E>,
}

pub struct EventChannel<E: ChannelEvent> {
    listeners: Mutex<HashMap<E::Kind, Vec<Listener<E>>>>,
    next_id: AtomicU64,
}

impl<E: ChannelEvent> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ChannelEvent> EventChannel<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener for every event of `kind`.
    pub fn on<F>(&self, kind: E::Kind, callback: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(kind, false, Arc::new(callback))
    }

    /// Register a listener that is removed after its first delivery.
    pub fn once<F>(&self, kind: E::Kind, callback: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(kind, true, Arc::new(callback))
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        for entries in listeners.values_mut() {
            if let Some(pos) = entries.iter().position(|l| l.id == id) {
                entries.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Deliver `event` to every listener registered for its kind.
    pub fn emit(&self, event: &E) {
        let kind = event.kind();
        let callbacks = self.take_callbacks(kind);
        if callbacks.is_empty() {
            return;
        }

        for callback in callbacks {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(event)));
            if let Err(payload) = outcome {
                self.handle_listener_panic(kind, payload);
            }
        }
    }

    fn register(&self, kind: E::Kind, once: bool, callback: Callback<E>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().entry(kind).or_default().push(Listener { id, once, callback });
        id
    }

    // Snapshot the callbacks so listeners may register or unregister while
    // the event is being delivered.
    fn take_callbacks(&self, kind: E::Kind) -> Vec<Callback<E>> {
        let mut listeners = self.lock();
        let Some(entries) = listeners.get_mut(&kind) else {
            return Vec::new();
        };
        let callbacks = entries.iter().map(|l| Arc::clone(&l.callback)).collect();
        entries.retain(|l| !l.once);
        callbacks
    }

    fn handle_listener_panic(&self, kind: E::Kind, payload: Box<dyn std::any::Any + Send>) {
        let message = panic_message(payload.as_ref());
        warn!("Event listener for {:?} panicked: {}", kind, message);

        let failure = E::listener_failure(format!("listener for {:?} failed: {}", kind, message));
        if let Some(failure) = failure {
            let failure_kind = failure.kind();
            // A failing error listener is only logged, never redirected again.
            if failure_kind != kind && self.listener_count(failure_kind) > 0 {
                self.emit(&failure);
                return;
            }
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { panic::resume_unwind(payload) });
            }
            Err(_) => error!("Unhandled event listener failure: {}", message),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<E::Kind, Vec<Listener<E>>>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
