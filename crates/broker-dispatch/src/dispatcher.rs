//! The Dispatcher (C6): the top-level tool-call entry point. Selects a
//! handler by exact tool name, hands off to the single-call or fan-out
//! path, and answers `get_gui_url`.

use std::sync::Arc;

use broker_config::Config;
use broker_model::{AgentKind, UnifiedEvent};
use broker_runtime::RequestRegistry;
use tokio::sync::mpsc::UnboundedSender;

use crate::fanout::dispatch_fanout;
use crate::params::{parse_fanout_call, parse_single_call};
use crate::reply::ToolReply;
use crate::schema::{all_schemas, ToolSchema};

/// Everything the dispatcher needs to serve a call: the request registry
/// shared with the signal manager, and the dashboard URL (if bound).
pub struct Dispatcher {
    pub config: Config,
    pub registry: Arc<RequestRegistry>,
    pub gui_url: std::sync::Mutex<Option<String>>,
}

impl Dispatcher {
    pub fn new(config: Config, registry: Arc<RequestRegistry>) -> Self {
        Dispatcher { config, registry, gui_url: std::sync::Mutex::new(None) }
    }

    pub fn set_gui_url(&self, url: Option<String>) {
        *self.gui_url.lock().expect("gui_url mutex poisoned") = url;
    }

    /// Every tool this dispatcher currently serves, honoring the
    /// configuration's allow/deny lists.
    pub fn list_tools(&self) -> Vec<ToolSchema> {
        all_schemas(|name| self.config.is_tool_enabled(name))
    }

    /// Dispatches one `call_tool` request by exact tool name.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        events_tx: Option<UnboundedSender<UnifiedEvent>>,
    ) -> ToolReply {
        if tool_name == "get_gui_url" {
            return self.get_gui_url();
        }

        let (base_name, is_parallel) = match tool_name.strip_suffix("_parallel") {
            Some(base) => (base, true),
            None => (tool_name, false),
        };

        let kind = match base_name.parse::<AgentKind>() {
            Ok(k) => k,
            Err(_) => return ToolReply { text: format!("Unknown tool: {tool_name}"), is_error: true },
        };

        if !self.config.is_tool_enabled(kind.tool_name()) {
            return ToolReply { text: format!("Tool disabled by configuration: {tool_name}"), is_error: true };
        }

        if is_parallel {
            match parse_fanout_call(kind, arguments) {
                Ok(request) => dispatch_fanout(kind, request, Arc::clone(&self.registry), None).await,
                Err(msg) => ToolReply { text: msg, is_error: true },
            }
        } else {
            match parse_single_call(kind, arguments) {
                Ok(request) => crate::single::dispatch_single(kind, request, Arc::clone(&self.registry), events_tx).await,
                Err(msg) => ToolReply { text: msg, is_error: true },
            }
        }
    }

    fn get_gui_url(&self) -> ToolReply {
        match self.gui_url.lock().expect("gui_url mutex poisoned").clone() {
            Some(url) => ToolReply { text: url, is_error: false },
            None => ToolReply { text: "Dashboard is disabled or failed to bind.".to_string(), is_error: true },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Config::default(), Arc::new(RequestRegistry::new()))
    }

    #[test]
    fn list_tools_includes_every_kind_and_gui_url() {
        let d = dispatcher();
        let names: Vec<String> = d.list_tools().into_iter().map(|s| s.name).collect();
        assert!(names.contains(&"claude".to_string()));
        assert!(names.contains(&"claude_parallel".to_string()));
        assert!(names.contains(&"get_gui_url".to_string()));
        assert_eq!(names.len(), 4 * 2 + 1);
    }

    #[tokio::test]
    async fn call_tool_rejects_unknown_tool_name() {
        let d = dispatcher();
        let reply = d.call_tool("not_a_tool", json!({}), None).await;
        assert!(reply.is_error);
    }

    #[tokio::test]
    async fn get_gui_url_reports_disabled_when_unset() {
        let d = dispatcher();
        let reply = d.call_tool("get_gui_url", json!({}), None).await;
        assert!(reply.is_error);
        assert!(reply.text.contains("disabled"));
    }

    #[tokio::test]
    async fn get_gui_url_returns_set_url() {
        let d = dispatcher();
        d.set_gui_url(Some("http://127.0.0.1:4000".to_string()));
        let reply = d.call_tool("get_gui_url", json!({}), None).await;
        assert!(!reply.is_error);
        assert_eq!(reply.text, "http://127.0.0.1:4000");
    }

    #[tokio::test]
    async fn disabled_tool_is_rejected() {
        let mut config = Config::default();
        config.disable = vec!["claude".to_string()];
        let d = Dispatcher::new(config, Arc::new(RequestRegistry::new()));
        let reply = d.call_tool("claude", json!({}), None).await;
        assert!(reply.is_error);
        assert!(reply.text.contains("disabled"));
    }
}
