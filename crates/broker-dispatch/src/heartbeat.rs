//! Best-effort progress heartbeat (SPEC_FULL.md §4.6 step 5 / §4.8's
//! fan-out progress note): a periodic background tick while a run is in
//! flight, stopped automatically when the call finishes.
//!
//! The original system reported progress over a request/response RPC
//! transport prone to client-side idle timeouts. This broker's MCP
//! transport is a single blocking stdio call with no such timeout, and no
//! repo in this workspace's reference set grounds a wire-level MCP
//! progress-notification call to build against, so the heartbeat here is
//! an internal liveness log rather than a protocol-level keep-alive —
//! `DESIGN.md` records this as the resolution.

use std::time::Duration;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A periodic heartbeat task. Aborts itself when dropped, so callers just
/// need to keep it alive for the duration of the run it's reporting on.
pub struct Heartbeat {
    handle: tokio::task::JoinHandle<()>,
}

impl Heartbeat {
    /// Spawns a task that logs `report()` every `interval` until dropped.
    /// The first tick is skipped so a quick run never logs at all.
    pub fn spawn(interval: Duration, report: impl Fn() + Send + 'static) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                report();
            }
        });
        Heartbeat { handle }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
