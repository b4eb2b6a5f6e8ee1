//! The broadcaster half of the Live Event Bus (C7): a list of per-viewer
//! bounded queues protected by a lock, plus the grace-period timer that
//! fires when the last viewer disconnects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use broker_model::UnifiedEvent;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Queue depth for one viewer. A full queue drops the newest event rather
/// than blocking the broadcaster.
const VIEWER_QUEUE_CAPACITY: usize = 256;

struct Viewer {
    id: u64,
    sender: mpsc::Sender<UnifiedEvent>,
}

/// Shared state behind the broadcaster: the viewer list and the grace-period
/// bookkeeping. Cheap to clone (it's an `Arc` wrapper) so both the dispatcher
/// pipeline and the axum handlers can hold their own copy.
pub struct EventBus {
    viewers: Mutex<Vec<Viewer>>,
    next_viewer_id: AtomicU64,
    grace_period: Duration,
    grace_generation: AtomicU64,
    on_all_disconnected: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

impl EventBus {
    pub fn new(grace_period: Duration) -> Arc<Self> {
        Arc::new(EventBus {
            viewers: Mutex::new(Vec::new()),
            next_viewer_id: AtomicU64::new(0),
            grace_period,
            grace_generation: AtomicU64::new(0),
            on_all_disconnected: Mutex::new(Vec::new()),
        })
    }

    /// Registers a new viewer and returns its receiving half. Cancels any
    /// pending grace-period timer, since the viewer count just left zero.
    pub fn register_viewer(self: &Arc<Self>) -> (u64, mpsc::Receiver<UnifiedEvent>) {
        let (tx, rx) = mpsc::channel(VIEWER_QUEUE_CAPACITY);
        let id = self.next_viewer_id.fetch_add(1, Ordering::SeqCst);
        self.viewers.lock().expect("event bus mutex poisoned").push(Viewer { id, sender: tx });
        // Bumping the generation invalidates any in-flight grace timer from a
        // prior disconnect, without needing a separate cancellation handle.
        self.grace_generation.fetch_add(1, Ordering::SeqCst);
        (id, rx)
    }

    /// Removes a viewer. If this was the last one, arms the grace-period
    /// timer: if nothing reconnects before it elapses, `on_all_disconnected`
    /// callbacks fire.
    pub fn deregister_viewer(self: &Arc<Self>, id: u64) {
        let now_empty = {
            let mut viewers = self.viewers.lock().expect("event bus mutex poisoned");
            viewers.retain(|v| v.id != id);
            viewers.is_empty()
        };

        if now_empty {
            let generation = self.grace_generation.fetch_add(1, Ordering::SeqCst) + 1;
            let bus = Arc::clone(self);
            let grace_period = self.grace_period;
            tokio::spawn(async move {
                tokio::time::sleep(grace_period).await;
                if bus.grace_generation.load(Ordering::SeqCst) == generation && !bus.has_viewers() {
                    info!("no dashboard viewers reconnected within the grace period");
                    bus.notify_all_disconnected();
                }
            });
        }
    }

    pub fn has_viewers(&self) -> bool {
        !self.viewers.lock().expect("event bus mutex poisoned").is_empty()
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().expect("event bus mutex poisoned").len()
    }

    /// Fans `event` out to every registered viewer. A full queue drops the
    /// event for that one viewer and logs it — the producer never blocks on
    /// a slow consumer.
    pub fn broadcast(&self, event: UnifiedEvent) {
        let viewers = self.viewers.lock().expect("event bus mutex poisoned");
        for viewer in viewers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = viewer.sender.try_send(event.clone()) {
                warn!(viewer_id = viewer.id, "viewer queue full, dropping event");
            }
        }
    }

    /// Registers a callback invoked when the grace-period timer elapses with
    /// no viewer having reconnected. Advisory only — it never terminates the
    /// process itself.
    pub fn on_all_disconnected(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.on_all_disconnected.lock().expect("callback mutex poisoned").push(Box::new(callback));
    }

    fn notify_all_disconnected(&self) {
        let callbacks = self.on_all_disconnected.lock().expect("callback mutex poisoned");
        for callback in callbacks.iter() {
            callback();
        }
    }
}
