//! The MCP front door (C10): an `rmcp` [`ServerHandler`] that lists the
//! dispatcher's tools and routes `call_tool` requests to it. Holds no
//! state of its own beyond the shared [`Dispatcher`].

use std::future::Future;
use std::sync::Arc;

use broker_bus::EventBus;
use broker_dispatch::Dispatcher;
use rmcp::{
    handler::server::ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, ListToolsResult, PaginatedRequestParams,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    ErrorData as McpError,
};
use serde_json::Value;

use crate::bridge::{reply_to_call_result, schema_to_mcp_tool};

/// MCP server exposing the dispatcher's tools over whatever transport the
/// caller connects with (stdio in practice). When a [`EventBus`] is
/// attached, every call's normalised events are forwarded to it so the
/// dashboard can watch the run live.
#[derive(Clone)]
pub struct TaskBrokerMcpServer {
    dispatcher: Arc<Dispatcher>,
    bus: Option<Arc<EventBus>>,
}

impl TaskBrokerMcpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        TaskBrokerMcpServer { dispatcher, bus: None }
    }

    pub fn with_bus(dispatcher: Arc<Dispatcher>, bus: Arc<EventBus>) -> Self {
        TaskBrokerMcpServer { dispatcher, bus: Some(bus) }
    }
}

impl ServerHandler for TaskBrokerMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            let tools = self.dispatcher.list_tools().into_iter().map(schema_to_mcp_tool).collect();
            Ok(ListToolsResult { tools, next_cursor: None, meta: None })
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = match request.arguments {
            Some(map) => Value::Object(map),
            None => Value::Object(serde_json::Map::new()),
        };

        let (events_tx, forward_task) = match &self.bus {
            Some(bus) => {
                let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
                let bus = Arc::clone(bus);
                let task = tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        bus.broadcast(event);
                    }
                });
                (Some(tx), Some(task))
            }
            None => (None, None),
        };

        let reply = self.dispatcher.call_tool(request.name.as_ref(), args, events_tx).await;
        if let Some(task) = forward_task {
            let _ = task.await;
        }
        Ok(reply_to_call_result(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_config::Config;
    use broker_runtime::RequestRegistry;

    fn make_server() -> TaskBrokerMcpServer {
        let dispatcher = Dispatcher::new(Config::default(), Arc::new(RequestRegistry::new()));
        TaskBrokerMcpServer::new(Arc::new(dispatcher))
    }

    #[test]
    fn get_info_enables_tools_capability() {
        let server = make_server();
        let info = server.get_info();
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn server_is_cloneable() {
        let server = make_server();
        let _clone = server.clone();
    }
}
