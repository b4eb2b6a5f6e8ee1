//! The MCP Front Door (C10): exposes the [`Dispatcher`](broker_dispatch::Dispatcher)'s
//! tools to any MCP client over stdio, using line-delimited JSON-RPC via
//! `rmcp`.

pub mod bridge;
pub mod server;

pub use server::TaskBrokerMcpServer;

use std::sync::Arc;

use anyhow::Result;
use broker_bus::EventBus;
use broker_dispatch::Dispatcher;
use rmcp::ServiceExt;

/// Starts an MCP stdio server, serving the tools in `dispatcher` on
/// `stdin`/`stdout`. Blocks until the client disconnects (stdin EOF) or
/// the process is terminated. When `bus` is set, every call's events are
/// forwarded to it for the live dashboard.
pub async fn serve_stdio(dispatcher: Arc<Dispatcher>, bus: Option<Arc<EventBus>>) -> Result<()> {
    let server = match bus {
        Some(bus) => TaskBrokerMcpServer::with_bus(dispatcher, bus),
        None => TaskBrokerMcpServer::new(dispatcher),
    };
    let running = server
        .serve((tokio::io::stdin(), tokio::io::stdout()))
        .await
        .map_err(|e| anyhow::anyhow!("MCP server init error: {e}"))?;
    running.waiting().await.map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;
    Ok(())
}
