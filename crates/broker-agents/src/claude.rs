use broker_model::{AgentKind, ContentType, EventKind, LifecycleType, OperationType, Permission, Role, Status, UnifiedEvent};
use serde_json::Value;
use std::collections::HashMap;

use crate::argv::ArgvBuilder;
use crate::classify::classify_operation;
use crate::params::RunParams;
use crate::parser::AgentParser;

/// Builds argv for the `claude` CLI.
///
/// Permission maps onto claude's own flag set: anything above read-only
/// gets `--dangerously-skip-permissions`; read-only gets the scoped
/// permission-mode flag instead, keeping the child from touching anything
/// outside what claude's own `plan` mode allows.
pub struct ClaudeArgv;

impl ArgvBuilder for ClaudeArgv {
    fn kind(&self) -> AgentKind {
        AgentKind::Claude
    }

    fn build_args(&self, params: &RunParams) -> Result<Vec<String>, String> {
        if params.system_prompt.is_some() && params.append_system_prompt.is_some() {
            return Err(
                "cannot specify both system_prompt and append_system_prompt".to_string(),
            );
        }

        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];

        match params.permission {
            Permission::ReadOnly => {
                args.push("--permission-mode".to_string());
                args.push("plan".to_string());
            }
            Permission::WorkspaceWrite | Permission::Unlimited => {
                args.push("--dangerously-skip-permissions".to_string());
            }
        }

        if let Some(model) = &params.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(system_prompt) = &params.system_prompt {
            args.push("--system-prompt".to_string());
            args.push(system_prompt.clone());
        } else if let Some(append) = &params.append_system_prompt {
            args.push("--append-system-prompt".to_string());
            args.push(append.clone());
        }

        if let Some(agent_name) = &params.agent_name {
            args.push("--agents".to_string());
            args.push(agent_name.clone());
        }

        if let Some(session_id) = &params.session_id {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }

        Ok(args)
    }
}

/// Stateful parser for claude's `stream-json` dialect.
///
/// Top-level `type` is one of `system`/`assistant`/`user`/`result`.
/// `assistant`/`user` carry a `message.content[]` array that can fan out
/// into several unified events per line (thinking + text + tool_use in one
/// assistant turn is common). Claude repeats `session_id` on every event,
/// so the parser keeps refreshing it rather than only reading it once.
pub struct ClaudeParser {
    session_id: Option<String>,
    model: Option<String>,
    tool_names: HashMap<String, String>,
}

impl ClaudeParser {
    pub fn new() -> Self {
        ClaudeParser {
            session_id: None,
            model: None,
            tool_names: HashMap::new(),
        }
    }

    fn refresh_session_id(&mut self, raw: &Value) {
        if let Some(id) = raw.get("session_id").and_then(Value::as_str) {
            self.session_id = Some(id.to_string());
        }
    }

    fn parse_init(&mut self, raw: &Value) -> Vec<UnifiedEvent> {
        self.refresh_session_id(raw);
        self.model = raw.get("model").and_then(Value::as_str).map(String::from);

        let mut stats = serde_json::Map::new();
        stats.insert("cwd".into(), raw.get("cwd").cloned().unwrap_or(Value::Null));
        let tools_count = raw
            .get("tools")
            .and_then(Value::as_array)
            .map(|a| a.len())
            .unwrap_or(0);
        stats.insert("tools_count".into(), Value::from(tools_count));
        let connected: Vec<Value> = raw
            .get("mcp_servers")
            .and_then(Value::as_array)
            .map(|servers| {
                servers
                    .iter()
                    .filter(|s| s.get("status").and_then(Value::as_str) == Some("connected"))
                    .filter_map(|s| s.get("name").cloned())
                    .collect()
            })
            .unwrap_or_default();
        stats.insert("mcp_servers".into(), Value::Array(connected));

        vec![UnifiedEvent::new(
            AgentKind::Claude,
            self.session_id.clone(),
            raw.clone(),
            EventKind::Lifecycle {
                lifecycle_type: LifecycleType::SessionStart,
                status: Status::Success,
                model: self.model.clone(),
                stats,
            },
        )]
    }

    fn parse_assistant(&mut self, raw: &Value) -> Vec<UnifiedEvent> {
        self.refresh_session_id(raw);
        let mut events = Vec::new();
        let content_list = raw
            .pointer("/message/content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for content in &content_list {
            let content_type = content.get("type").and_then(Value::as_str).unwrap_or("");
            match content_type {
                "thinking" => {
                    let text = content.get("thinking").and_then(Value::as_str).unwrap_or("");
                    if !text.is_empty() {
                        events.push(UnifiedEvent::new(
                            AgentKind::Claude,
                            self.session_id.clone(),
                            raw.clone(),
                            EventKind::Message {
                                content_type: ContentType::Reasoning,
                                role: Role::Assistant,
                                text: text.to_string(),
                                is_delta: false,
                            },
                        ));
                    }
                }
                "text" => {
                    let text = content.get("text").and_then(Value::as_str).unwrap_or("");
                    if !text.is_empty() {
                        events.push(UnifiedEvent::new(
                            AgentKind::Claude,
                            self.session_id.clone(),
                            raw.clone(),
                            EventKind::Message {
                                content_type: ContentType::Text,
                                role: Role::Assistant,
                                text: text.to_string(),
                                is_delta: false,
                            },
                        ));
                    }
                }
                "tool_use" => {
                    let tool_name = content
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string();
                    let tool_id = content.get("id").and_then(Value::as_str).unwrap_or("").to_string();
                    let tool_input = content.get("input").cloned().unwrap_or(Value::Null);

                    if !tool_id.is_empty() {
                        self.tool_names.insert(tool_id.clone(), tool_name.clone());
                    }

                    let mut metadata = serde_json::Map::new();
                    metadata.insert("input".into(), tool_input.clone());

                    events.push(UnifiedEvent::new(
                        AgentKind::Claude,
                        self.session_id.clone(),
                        raw.clone(),
                        EventKind::Operation {
                            operation_type: classify_operation(&tool_name),
                            name: tool_name,
                            operation_id: tool_id,
                            input: tool_input,
                            output: None,
                            status: Status::Running,
                            metadata,
                        },
                    ));
                }
                _ => {}
            }
        }

        if events.is_empty() {
            events.push(UnifiedEvent::new(
                AgentKind::Claude,
                self.session_id.clone(),
                raw.clone(),
                EventKind::System {
                    severity: broker_model::Severity::Debug,
                    message: "unrecognised claude assistant content".to_string(),
                    is_fallback: true,
                },
            ));
        }
        events
    }

    fn parse_user(&mut self, raw: &Value) -> Vec<UnifiedEvent> {
        self.refresh_session_id(raw);
        let mut events = Vec::new();
        let content_list = raw
            .pointer("/message/content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for content in &content_list {
            let content_type = content.get("type").and_then(Value::as_str).unwrap_or("");
            match content_type {
                "tool_result" => {
                    let tool_id = content
                        .get("tool_use_id")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    let is_error = content.get("is_error").and_then(Value::as_bool).unwrap_or(false);
                    let output = content.get("content").cloned().unwrap_or(Value::Null);
                    let tool_name = self
                        .tool_names
                        .get(&tool_id)
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string());

                    events.push(UnifiedEvent::new(
                        AgentKind::Claude,
                        self.session_id.clone(),
                        raw.clone(),
                        EventKind::Operation {
                            operation_type: classify_operation(&tool_name),
                            name: tool_name,
                            operation_id: tool_id,
                            input: Value::Null,
                            output: Some(output),
                            status: if is_error { Status::Failed } else { Status::Success },
                            metadata: serde_json::Map::new(),
                        },
                    ));
                }
                "text" => {
                    let text = content.get("text").and_then(Value::as_str).unwrap_or("");
                    if !text.is_empty() {
                        events.push(UnifiedEvent::new(
                            AgentKind::Claude,
                            self.session_id.clone(),
                            raw.clone(),
                            EventKind::Message {
                                content_type: ContentType::Text,
                                role: Role::User,
                                text: text.to_string(),
                                is_delta: false,
                            },
                        ));
                    }
                }
                _ => {}
            }
        }

        if events.is_empty() {
            events.push(UnifiedEvent::new(
                AgentKind::Claude,
                self.session_id.clone(),
                raw.clone(),
                EventKind::System {
                    severity: broker_model::Severity::Debug,
                    message: "unrecognised claude user content".to_string(),
                    is_fallback: true,
                },
            ));
        }
        events
    }

    fn parse_result(&mut self, raw: &Value) -> Vec<UnifiedEvent> {
        self.refresh_session_id(raw);
        let subtype = raw.get("subtype").and_then(Value::as_str).unwrap_or("");
        let is_error = raw.get("is_error").and_then(Value::as_bool).unwrap_or(false);
        let usage = raw.get("usage").cloned().unwrap_or(Value::Null);

        let status = if is_error || subtype == "error" {
            Status::Failed
        } else {
            Status::Success
        };

        let mut stats = serde_json::Map::new();
        for key in ["duration_ms", "duration_api_ms", "num_turns", "total_cost_usd"] {
            stats.insert(key.into(), raw.get(key).cloned().unwrap_or(Value::Null));
        }
        for key in [
            "input_tokens",
            "output_tokens",
            "cache_creation_input_tokens",
            "cache_read_input_tokens",
        ] {
            stats.insert(key.into(), usage.get(key).cloned().unwrap_or(Value::Null));
        }

        vec![UnifiedEvent::new(
            AgentKind::Claude,
            self.session_id.clone(),
            raw.clone(),
            EventKind::Lifecycle {
                lifecycle_type: LifecycleType::SessionEnd,
                status,
                model: self.model.clone(),
                stats,
            },
        )]
    }
}

impl AgentParser for ClaudeParser {
    fn parse_line(&mut self, raw: &Value) -> Vec<UnifiedEvent> {
        let event_type = raw.get("type").and_then(Value::as_str).unwrap_or("");
        let subtype = raw.get("subtype").and_then(Value::as_str).unwrap_or("");

        match event_type {
            "system" if subtype == "init" => self.parse_init(raw),
            "assistant" => self.parse_assistant(raw),
            "user" => self.parse_user(raw),
            "result" => self.parse_result(raw),
            _ => {
                self.refresh_session_id(raw);
                vec![UnifiedEvent::new(
                    AgentKind::Claude,
                    self.session_id.clone(),
                    raw.clone(),
                    EventKind::System {
                        severity: broker_model::Severity::Debug,
                        message: format!("unrecognised claude event type: {event_type}"),
                        is_fallback: true,
                    },
                )]
            }
        }
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> RunParams {
        RunParams::new("hi", std::path::PathBuf::from("/tmp/work"))
    }

    #[test]
    fn read_only_uses_plan_permission_mode() {
        let argv = ClaudeArgv.build_args(&params()).unwrap();
        assert!(argv.windows(2).any(|w| w == ["--permission-mode", "plan"]));
        assert!(!argv.contains(&"--dangerously-skip-permissions".to_string()));
    }

    #[test]
    fn workspace_write_skips_permissions() {
        let mut p = params();
        p.permission = Permission::WorkspaceWrite;
        let argv = ClaudeArgv.build_args(&p).unwrap();
        assert!(argv.contains(&"--dangerously-skip-permissions".to_string()));
    }

    #[test]
    fn rejects_both_system_prompt_forms() {
        let mut p = params();
        p.system_prompt = Some("a".into());
        p.append_system_prompt = Some("b".into());
        assert!(ClaudeArgv.build_args(&p).is_err());
    }

    #[test]
    fn resume_adds_flag() {
        let mut p = params();
        p.session_id = Some("sess-1".into());
        let argv = ClaudeArgv.build_args(&p).unwrap();
        assert!(argv.windows(2).any(|w| w == ["--resume", "sess-1"]));
    }

    #[test]
    fn init_event_sets_session_and_model() {
        let mut parser = ClaudeParser::new();
        let raw = json!({
            "type": "system", "subtype": "init",
            "session_id": "fake-session-123", "model": "claude-x",
            "tools": ["a", "b"], "mcp_servers": [],
        });
        let events = parser.parse_line(&raw);
        assert_eq!(events.len(), 1);
        assert_eq!(parser.session_id(), Some("fake-session-123"));
        match &events[0].kind {
            EventKind::Lifecycle { lifecycle_type, model, .. } => {
                assert_eq!(*lifecycle_type, LifecycleType::SessionStart);
                assert_eq!(model.as_deref(), Some("claude-x"));
            }
            _ => panic!("expected lifecycle event"),
        }
    }

    #[test]
    fn tool_use_then_result_correlate_by_id() {
        let mut parser = ClaudeParser::new();
        let call = json!({
            "type": "assistant", "session_id": "s1",
            "message": {"content": [{"type": "tool_use", "id": "tu_1", "name": "Bash", "input": {"command": "ls"}}]},
        });
        let events = parser.parse_line(&call);
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            EventKind::Operation { operation_type, name, .. } => {
                assert_eq!(*operation_type, OperationType::Command);
                assert_eq!(name, "Bash");
            }
            _ => panic!("expected operation event"),
        }

        let result = json!({
            "type": "user", "session_id": "s1",
            "message": {"content": [{"type": "tool_result", "tool_use_id": "tu_1", "content": "file1\nfile2", "is_error": false}]},
        });
        let events = parser.parse_line(&result);
        match &events[0].kind {
            EventKind::Operation { name, status, .. } => {
                assert_eq!(name, "Bash");
                assert_eq!(*status, Status::Success);
            }
            _ => panic!("expected operation event"),
        }
    }
}
