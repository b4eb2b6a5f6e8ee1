//! The Signal Manager (C5): translates `SIGINT`/`SIGTERM` into per-request
//! cancellation or graceful shutdown, never exiting the process directly —
//! the main loop decides when cleanup has finished and it's safe to leave.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use broker_config::SigintMode;
use broker_runtime::RequestRegistry;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Owns the shutdown latch and double-tap bookkeeping. Shared via `Arc`
/// between the installed signal-listener tasks and whoever calls
/// `wait_for_shutdown`.
pub struct SignalManager {
    registry: Arc<RequestRegistry>,
    mode: SigintMode,
    double_tap_window: Duration,
    last_sigint: Mutex<Option<Instant>>,
    shutdown_requested: AtomicBool,
    force_exit: AtomicBool,
    shutdown: Notify,
}

impl SignalManager {
    pub fn new(registry: Arc<RequestRegistry>, mode: SigintMode, double_tap_window_secs: f64) -> Arc<Self> {
        Arc::new(SignalManager {
            registry,
            mode,
            double_tap_window: Duration::from_secs_f64(double_tap_window_secs),
            last_sigint: Mutex::new(None),
            shutdown_requested: AtomicBool::new(false),
            force_exit: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Whether a double-tap forced an immediate shutdown. The main loop
    /// checks this *after* cleanup to pick its exit code — it never calls
    /// `exit()` from inside the signal handler itself.
    pub fn is_force_exit(&self) -> bool {
        self.force_exit.load(Ordering::SeqCst)
    }

    /// Resolves once a shutdown has been requested by any path.
    pub async fn wait_for_shutdown(&self) {
        while !self.is_shutdown_requested() {
            self.shutdown.notified().await;
        }
    }

    /// Installs `SIGINT`/`SIGTERM` listeners (POSIX) or just `ctrl_c`
    /// (everywhere else) as background tasks. Returns their join handles
    /// so the caller can abort them on normal shutdown.
    pub fn install(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(error = %e, "failed to install SIGINT handler");
                        return;
                    }
                };
                loop {
                    sigint.recv().await;
                    manager.handle_sigint();
                }
            }));

            let manager = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(error = %e, "failed to install SIGTERM handler");
                        return;
                    }
                };
                loop {
                    sigterm.recv().await;
                    manager.handle_sigterm();
                }
            }));
        }

        #[cfg(not(unix))]
        {
            let manager = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                loop {
                    if tokio::signal::ctrl_c().await.is_err() {
                        return;
                    }
                    manager.handle_sigint();
                }
            }));
        }

        handles
    }

    /// `SIGINT`: cancel-if-active / exit-always / cancel-then-arm-double-tap
    /// depending on `mode`, with a force-exit on the second tap within the
    /// window.
    pub fn handle_sigint(&self) {
        let now = Instant::now();
        let mut last = self.last_sigint.lock().expect("signal manager mutex poisoned");
        let since_last = last.map(|t| now.duration_since(t));
        *last = Some(now);
        drop(last);

        if let Some(since_last) = since_last {
            if since_last < self.double_tap_window && self.is_shutdown_requested() {
                warn!("double SIGINT detected, forcing shutdown");
                self.force_shutdown();
                return;
            }
        }

        match self.mode {
            SigintMode::Exit => {
                info!("SIGINT received (mode=exit), requesting shutdown");
                self.request_shutdown();
            }
            SigintMode::Cancel => {
                if self.registry.has_active() {
                    let count = self.registry.cancel_all();
                    info!(count, "SIGINT received (mode=cancel), cancelled active requests");
                } else {
                    info!("SIGINT received (mode=cancel), no active requests, requesting shutdown");
                    self.request_shutdown();
                }
            }
            SigintMode::CancelThenExit => {
                if self.registry.has_active() {
                    let count = self.registry.cancel_all();
                    info!(
                        count,
                        window_secs = self.double_tap_window.as_secs_f64(),
                        "SIGINT received (mode=cancel_then_exit), cancelled active requests; press again to exit"
                    );
                    self.shutdown_requested.store(true, Ordering::SeqCst);
                } else {
                    info!("SIGINT received (mode=cancel_then_exit), no active requests, requesting shutdown");
                    self.request_shutdown();
                }
            }
        }
    }

    /// `SIGTERM`: always a graceful shutdown.
    pub fn handle_sigterm(&self) {
        info!("SIGTERM received, initiating graceful shutdown");
        if self.registry.has_active() {
            let count = self.registry.cancel_all();
            info!(count, "cancelled active requests for shutdown");
        }
        self.request_shutdown();
    }

    /// Programmatic equivalent of a graceful `SIGTERM`, for callers that
    /// want to trigger shutdown from inside the process (e.g. the live
    /// event bus's grace-period self-shutdown).
    pub fn request_graceful_shutdown(&self) {
        info!("programmatic shutdown requested");
        if self.registry.has_active() {
            self.registry.cancel_all();
        }
        self.request_shutdown();
    }

    fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    fn force_shutdown(&self) {
        self.force_exit.store(true, Ordering::SeqCst);
        self.shutdown_requested.store(true, Ordering::SeqCst);
        if self.registry.has_active() {
            let count = self.registry.cancel_all();
            info!(count, "force shutdown cancelled active requests");
        }
        self.shutdown.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_model::AgentKind;
    use tokio_util::sync::CancellationToken;

    fn manager(mode: SigintMode) -> Arc<SignalManager> {
        SignalManager::new(Arc::new(RequestRegistry::new()), mode, 1.0)
    }

    #[test]
    fn exit_mode_always_requests_shutdown() {
        let mgr = manager(SigintMode::Exit);
        mgr.handle_sigint();
        assert!(mgr.is_shutdown_requested());
    }

    #[test]
    fn cancel_mode_cancels_active_requests_without_shutdown() {
        let mgr = manager(SigintMode::Cancel);
        let token = CancellationToken::new();
        mgr.registry.register("r1", AgentKind::Claude, token.clone(), None).unwrap();

        mgr.handle_sigint();
        assert!(token.is_cancelled());
        assert!(!mgr.is_shutdown_requested());
    }

    #[test]
    fn cancel_mode_requests_shutdown_when_nothing_active() {
        let mgr = manager(SigintMode::Cancel);
        mgr.handle_sigint();
        assert!(mgr.is_shutdown_requested());
    }

    #[test]
    fn sigterm_always_cancels_and_shuts_down() {
        let mgr = manager(SigintMode::Cancel);
        let token = CancellationToken::new();
        mgr.registry.register("r1", AgentKind::Codex, token.clone(), None).unwrap();

        mgr.handle_sigterm();
        assert!(token.is_cancelled());
        assert!(mgr.is_shutdown_requested());
    }

    #[test]
    fn double_tap_within_window_forces_exit() {
        let mgr = manager(SigintMode::CancelThenExit);
        let token = CancellationToken::new();
        mgr.registry.register("r1", AgentKind::Gemini, token, None).unwrap();

        mgr.handle_sigint();
        assert!(!mgr.is_force_exit());

        mgr.handle_sigint();
        assert!(mgr.is_force_exit());
        assert!(mgr.is_shutdown_requested());
    }

    #[test]
    fn double_tap_outside_window_does_not_force_exit() {
        let mgr = SignalManager::new(Arc::new(RequestRegistry::new()), SigintMode::CancelThenExit, 0.01);
        mgr.handle_sigint();
        std::thread::sleep(Duration::from_millis(50));
        mgr.handle_sigint();
        assert!(!mgr.is_force_exit());
    }
}
