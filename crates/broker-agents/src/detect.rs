//! Best-effort agent-kind detection from raw event shape, for diagnostics
//! and tests. Normal dispatch always knows the [`AgentKind`] from the tool
//! name that was called and never needs this.

use broker_model::AgentKind;
use serde_json::Value;

/// Inspects distinctive shape signals in one decoded JSON line and guesses
/// which agent produced it. Returns `None` when nothing matches.
pub fn detect_agent_kind(raw: &Value) -> Option<AgentKind> {
    let obj = raw.as_object()?;

    // opencode's signature: a top-level camel-tail `sessionID` field.
    if obj.contains_key("sessionID") {
        return Some(AgentKind::Opencode);
    }

    // codex: a `conversation_id` nested under `msg`, or dotted event types.
    if obj
        .get("msg")
        .and_then(Value::as_object)
        .map(|msg| msg.contains_key("conversation_id"))
        .unwrap_or(false)
    {
        return Some(AgentKind::Codex);
    }
    if let Some(t) = obj.get("type").and_then(Value::as_str) {
        if t.starts_with("thread.") || t.starts_with("turn.") || t.starts_with("item.") {
            return Some(AgentKind::Codex);
        }
    }

    // claude: top-level type/subtype pair unique to its stream-json format.
    if let Some(t) = obj.get("type").and_then(Value::as_str) {
        if (t == "system" && obj.get("subtype").and_then(Value::as_str) == Some("init"))
            || t == "result"
        {
            if obj.contains_key("session_id") {
                return Some(AgentKind::Claude);
            }
        }
    }

    // gemini: plain `init`/`message`/`tool_use` types with a snake_case
    // `session_id`, distinguished from claude by the absence of `subtype`.
    if let Some(t) = obj.get("type").and_then(Value::as_str) {
        if matches!(t, "init" | "message" | "tool_use" | "tool_result")
            && !obj.contains_key("subtype")
        {
            return Some(AgentKind::Gemini);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_opencode_by_session_id_field() {
        let raw = json!({"type": "text", "sessionID": "abc123"});
        assert_eq!(detect_agent_kind(&raw), Some(AgentKind::Opencode));
    }

    #[test]
    fn detects_codex_by_nested_conversation_id() {
        let raw = json!({"type": "session_configured", "msg": {"conversation_id": "xyz"}});
        assert_eq!(detect_agent_kind(&raw), Some(AgentKind::Codex));
    }

    #[test]
    fn detects_codex_by_dotted_event_type() {
        let raw = json!({"type": "item.completed", "item": {}});
        assert_eq!(detect_agent_kind(&raw), Some(AgentKind::Codex));
    }

    #[test]
    fn detects_claude_by_system_init() {
        let raw = json!({"type": "system", "subtype": "init", "session_id": "s1"});
        assert_eq!(detect_agent_kind(&raw), Some(AgentKind::Claude));
    }

    #[test]
    fn detects_gemini_by_plain_init() {
        let raw = json!({"type": "init", "session_id": "g1"});
        assert_eq!(detect_agent_kind(&raw), Some(AgentKind::Gemini));
    }

    #[test]
    fn unrecognised_shape_returns_none() {
        let raw = json!({"foo": "bar"});
        assert_eq!(detect_agent_kind(&raw), None);
    }
}
