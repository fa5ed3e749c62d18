//! Presence broadcaster: one process-wide "is the durable store
//! reachable" boolean, fanned out to any number of listeners. Late
//! joiners are replayed the current value at registration, so there are
//! no silent subscribers. The fact starts as the conservative `false`
//! until the first probe completes.

use crate::store::DurableStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Connectivity loss has no push signal, so a fixed-interval probe is the
/// only scheduled activity in the core.
const PROBE_INTERVAL: Duration = Duration::from_secs(30);

pub type PresenceListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Opaque handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

struct Inner {
    online: AtomicBool,
    /// Registration order is notification order.
    listeners: Mutex<Vec<(u64, PresenceListener)>>,
    next_id: AtomicU64,
    initialized: AtomicBool,
}

#[derive(Clone)]
pub struct PresenceBroadcaster {
    inner: Arc<Inner>,
}

impl PresenceBroadcaster {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                online: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Registers `listener` and synchronously replays the current value to
    /// it. Returns the handle used to unsubscribe.
    pub fn subscribe(&self, listener: PresenceListener) -> ListenerId {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.lock().push((id, listener.clone()));
        listener(self.is_online());
        ListenerId(id)
    }

    /// Removes a listener. Unknown or already-removed handles are a no-op.
    pub fn unsubscribe(&self, handle: ListenerId) {
        self.inner
            .listeners
            .lock()
            .retain(|(id, _)| *id != handle.0);
    }

    /// Updates the shared fact. Listeners are only notified on an actual
    /// transition, in registration order, outside the listener lock.
    pub fn set_online(&self, online: bool) {
        let previous = self.inner.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return;
        }
        info!(online, "durable store presence changed");
        let snapshot: Vec<PresenceListener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for listener in snapshot {
            listener(online);
        }
    }

    /// Starts the periodic reachability probe against the store. Idempotent:
    /// only the first call spawns the observation; the return value reports
    /// whether this call did.
    pub fn initialize(&self, store: Arc<dyn DurableStore>) -> bool {
        self.initialize_every(store, PROBE_INTERVAL)
    }

    fn initialize_every(&self, store: Arc<dyn DurableStore>, every: Duration) -> bool {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            debug!("presence probe already running");
            return false;
        }
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let reachable = store.probe().await;
                broadcaster.set_online(reachable);
            }
        });
        true
    }
}

impl Default for PresenceBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
