//! Type conversions between the dispatcher's tool types and rmcp's MCP
//! model types. Pure and stateless so neither side needs to know about
//! the other.

use std::sync::Arc;

use broker_dispatch::{ToolReply, ToolSchema};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool as McpTool};

/// Convert a [`ToolSchema`] into an rmcp [`Tool`] descriptor.
///
/// The JSON Schema in [`ToolSchema::parameters`] is already valid JSON
/// Schema, so it passes through as the `input_schema` unchanged.
pub fn schema_to_mcp_tool(schema: ToolSchema) -> McpTool {
    let input_schema: JsonObject = value_to_object(schema.parameters);
    McpTool::new(
        std::borrow::Cow::Owned(schema.name),
        std::borrow::Cow::Owned(schema.description),
        Arc::new(input_schema),
    )
}

fn value_to_object(v: serde_json::Value) -> JsonObject {
    use serde_json::{Map, Value};
    match v {
        Value::Object(m) => m,
        other => {
            let mut m = Map::new();
            m.insert("type".to_string(), Value::String("object".to_string()));
            m.insert("value".to_string(), other);
            m
        }
    }
}

/// Convert a dispatcher [`ToolReply`] into an rmcp [`CallToolResult`].
///
/// Every reply is a single text part; the MCP `is_error` flag mirrors
/// [`ToolReply::is_error`].
pub fn reply_to_call_result(reply: ToolReply) -> CallToolResult {
    let content = vec![Content::text(reply.text)];
    if reply.is_error {
        CallToolResult { content, is_error: Some(true), structured_content: None, meta: None }
    } else {
        CallToolResult::success(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn make_schema(name: &str, desc: &str, params: Value) -> ToolSchema {
        ToolSchema { name: name.to_string(), description: desc.to_string(), parameters: params }
    }

    #[test]
    fn schema_to_mcp_tool_preserves_name_and_description() {
        let schema = make_schema("claude", "Runs Claude Code", json!({"type": "object"}));
        let tool = schema_to_mcp_tool(schema);
        assert_eq!(tool.name.as_ref(), "claude");
        assert_eq!(tool.description.as_deref(), Some("Runs Claude Code"));
    }

    #[test]
    fn schema_to_mcp_tool_object_schema_passes_through() {
        let schema = make_schema(
            "claude",
            "Runs Claude Code",
            json!({"type": "object", "properties": {"prompt": {"type": "string"}}}),
        );
        let tool = schema_to_mcp_tool(schema);
        assert!(tool.input_schema.contains_key("type"));
        assert!(tool.input_schema.contains_key("properties"));
    }

    #[test]
    fn schema_to_mcp_tool_non_object_schema_gets_wrapped() {
        let schema = make_schema("echo", "Echoes", json!("not an object"));
        let tool = schema_to_mcp_tool(schema);
        assert_eq!(tool.input_schema.get("type"), Some(&Value::String("object".to_string())));
    }

    #[test]
    fn reply_to_call_result_success() {
        let reply = ToolReply { text: "done".to_string(), is_error: false };
        let result = reply_to_call_result(reply);
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.content.len(), 1);
    }

    #[test]
    fn reply_to_call_result_error_flag_set() {
        let reply = ToolReply { text: "boom".to_string(), is_error: true };
        let result = reply_to_call_result(reply);
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.content.len(), 1);
    }
}
