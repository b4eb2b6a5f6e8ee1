//! The Live Event Bus (C7): an in-process broadcaster of `UnifiedEvent`s
//! plus the HTTP+SSE dashboard server that lets a browser watch requests as
//! they run. Broadcasting is always active; the HTTP server is optional and
//! only binds when the dashboard is enabled.

mod broadcaster;
mod files;
mod http;

pub use broadcaster::EventBus;
pub use files::FileRegistry;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

/// Bound dashboard server, returned by [`serve`]. Dropping or aborting the
/// held task stops accepting new connections; existing SSE streams keep
/// flowing until their underlying connections close.
pub struct DashboardHandle {
    pub local_addr: SocketAddr,
    task: tokio::task::JoinHandle<()>,
}

impl DashboardHandle {
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Binds the dashboard's HTTP listener and spawns its accept loop. Returns
/// immediately once bound; the actual serving happens on a background task.
pub async fn serve(
    host: &str,
    port: u16,
    bus: Arc<EventBus>,
    files: Arc<FileRegistry>,
    max_clients: usize,
) -> std::io::Result<DashboardHandle> {
    let state = http::AppState { bus, files, max_clients };
    let router = http::router(state);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "dashboard listening");

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::warn!(error = %e, "dashboard server exited");
        }
    });

    Ok(DashboardHandle { local_addr, task })
}
