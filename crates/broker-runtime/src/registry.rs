//! The Request Registry (C4): a thread-safe table of in-flight requests,
//! batch cancellation, and empty-transition notification for the Signal
//! Manager's double-tap shutdown path.

use std::collections::HashMap;
use std::sync::Mutex;

use broker_model::{AgentKind, RequestInfo};
use tokio_util::sync::CancellationToken;

type Entry = RequestInfo<CancellationToken>;

/// Registered requests, guarded by an internal lock. Cheap to clone around
/// (it's just an `Arc`-free struct wrapping a `Mutex`) — callers share one
/// instance for the process lifetime instead.
#[derive(Default)]
pub struct RequestRegistry {
    inner: Mutex<HashMap<String, Entry>>,
    on_empty: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        RequestRegistry::default()
    }

    /// Registers a new in-flight request. Rejects duplicate ids.
    pub fn register(
        &self,
        request_id: impl Into<String>,
        agent_kind: AgentKind,
        cancel_handle: CancellationToken,
        task_note: Option<String>,
    ) -> Result<(), String> {
        let request_id = request_id.into();
        let mut inner = self.inner.lock().expect("request registry mutex poisoned");
        if inner.contains_key(&request_id) {
            return Err(format!("duplicate request id: {request_id}"));
        }
        inner.insert(request_id.clone(), RequestInfo::new(request_id, agent_kind, cancel_handle, task_note));
        Ok(())
    }

    /// Removes a request. Idempotent: removing an absent id is a no-op
    /// that returns `false`. Fires the `on_empty` callbacks once, after
    /// the removal, if the table is now empty.
    pub fn unregister(&self, request_id: &str) -> bool {
        let now_empty = {
            let mut inner = self.inner.lock().expect("request registry mutex poisoned");
            let removed = inner.remove(request_id).is_some();
            if !removed {
                return false;
            }
            inner.is_empty()
        };
        if now_empty {
            self.notify_empty();
        }
        true
    }

    /// Cancels one request if it is still registered. Returns whether any
    /// effect occurred.
    pub fn cancel(&self, request_id: &str) -> bool {
        let inner = self.inner.lock().expect("request registry mutex poisoned");
        match inner.get(request_id) {
            Some(entry) => {
                entry.cancel_handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every still-registered request and returns how many were
    /// affected. Does not wait for any of them to actually stop — that is
    /// the caller's responsibility.
    pub fn cancel_all(&self) -> usize {
        let inner = self.inner.lock().expect("request registry mutex poisoned");
        let mut count = 0;
        for entry in inner.values() {
            entry.cancel_handle.cancel();
            count += 1;
        }
        count
    }

    pub fn has_active(&self) -> bool {
        !self.inner.lock().expect("request registry mutex poisoned").is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().expect("request registry mutex poisoned").len()
    }

    pub fn list_active(&self) -> Vec<Entry> {
        self.inner.lock().expect("request registry mutex poisoned").values().cloned().collect()
    }

    /// Registers a callback invoked (synchronously, on the unregistering
    /// caller's task) whenever the table transitions from non-empty to
    /// empty.
    pub fn on_empty(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.on_empty.lock().expect("on_empty callback mutex poisoned").push(Box::new(callback));
    }

    fn notify_empty(&self) {
        let callbacks = self.on_empty.lock().expect("on_empty callback mutex poisoned");
        for callback in callbacks.iter() {
            callback();
        }
    }
}
