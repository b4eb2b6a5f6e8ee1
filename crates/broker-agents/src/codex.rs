use broker_model::{
    AgentKind, ContentType, EventKind, LifecycleType, OperationType, Permission, Role, Severity,
    Status, UnifiedEvent,
};
use serde_json::Value;
use std::collections::HashMap;

use crate::argv::ArgvBuilder;
use crate::classify::classify_operation;
use crate::params::RunParams;
use crate::parser::AgentParser;

/// Builds argv for `codex exec --json`.
pub struct CodexArgv;

impl ArgvBuilder for CodexArgv {
    fn kind(&self) -> AgentKind {
        AgentKind::Codex
    }

    fn build_args(&self, params: &RunParams) -> Result<Vec<String>, String> {
        let mut args = vec!["exec".to_string(), "--json".to_string()];

        let sandbox = match params.permission {
            Permission::ReadOnly => "read-only",
            Permission::WorkspaceWrite => "workspace-write",
            Permission::Unlimited => "danger-full-access",
        };
        args.push("--sandbox".to_string());
        args.push(sandbox.to_string());

        if let Some(model) = &params.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        // codex resumes from a recorded rollout file path, not a bare id.
        if let Some(session_id) = &params.session_id {
            args.push("-c".to_string());
            args.push(format!("experimental_resume={session_id}"));
        }

        for image in &params.image {
            args.push("--image".to_string());
            args.push(image.to_string_lossy().into_owned());
        }

        Ok(args)
    }
}

/// Stateful parser for codex's `--json` event stream.
///
/// `item.started`/`item.updated`/`item.completed` wrap a nested `item`
/// object whose own `type` selects the real occurrence; this parser
/// flattens that nesting the same way the other dialects are flat.
pub struct CodexParser {
    session_id: Option<String>,
    function_names: HashMap<String, String>,
}

impl CodexParser {
    pub fn new() -> Self {
        CodexParser {
            session_id: None,
            function_names: HashMap::new(),
        }
    }

    fn event(&self, raw: &Value, kind: EventKind) -> UnifiedEvent {
        UnifiedEvent::new(AgentKind::Codex, self.session_id.clone(), raw.clone(), kind)
    }

    fn parse_session_configured(&mut self, raw: &Value) -> Vec<UnifiedEvent> {
        let conversation_id = raw
            .pointer("/msg/conversation_id")
            .and_then(Value::as_str)
            .map(String::from);
        self.session_id = conversation_id;
        vec![self.event(
            raw,
            EventKind::Lifecycle {
                lifecycle_type: LifecycleType::SessionStart,
                status: Status::Success,
                model: None,
                stats: serde_json::Map::new(),
            },
        )]
    }

    fn parse_turn_started(&self, raw: &Value) -> Vec<UnifiedEvent> {
        vec![self.event(
            raw,
            EventKind::Lifecycle {
                lifecycle_type: LifecycleType::TurnStart,
                status: Status::Running,
                model: None,
                stats: serde_json::Map::new(),
            },
        )]
    }

    fn parse_turn_completed(&self, raw: &Value) -> Vec<UnifiedEvent> {
        let usage = raw.get("usage").cloned().unwrap_or(Value::Null);
        let mut stats = serde_json::Map::new();
        if !usage.is_null() {
            for key in ["input_tokens", "cached_input_tokens", "output_tokens"] {
                stats.insert(key.into(), usage.get(key).cloned().unwrap_or(Value::Null));
            }
        }
        vec![self.event(
            raw,
            EventKind::Lifecycle {
                lifecycle_type: LifecycleType::TurnEnd,
                status: Status::Success,
                model: None,
                stats,
            },
        )]
    }

    fn parse_turn_failed(&self, raw: &Value) -> Vec<UnifiedEvent> {
        let error_msg = match raw.get("error") {
            Some(Value::Object(o)) => o
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Turn failed")
                .to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => "Turn failed".to_string(),
        };
        let mut stats = serde_json::Map::new();
        stats.insert("error".into(), Value::String(error_msg));
        vec![self.event(
            raw,
            EventKind::Lifecycle {
                lifecycle_type: LifecycleType::TurnEnd,
                status: Status::Failed,
                model: None,
                stats,
            },
        )]
    }

    fn parse_error(&self, raw: &Value) -> Vec<UnifiedEvent> {
        let message = raw
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        vec![self.event(
            raw,
            EventKind::System {
                severity: Severity::Error,
                message,
                is_fallback: false,
            },
        )]
    }

    fn parse_item(&mut self, raw: &Value, event_type: &str) -> Vec<UnifiedEvent> {
        let item = match raw.get("item") {
            Some(v) if v.is_object() => v,
            _ => {
                return vec![self.event(
                    raw,
                    EventKind::System {
                        severity: Severity::Debug,
                        message: "codex item event missing item object".to_string(),
                        is_fallback: true,
                    },
                )]
            }
        };

        let item_type = item.get("type").and_then(Value::as_str).unwrap_or("");
        let item_status = item.get("status").and_then(Value::as_str).unwrap_or("");
        let is_completed = event_type == "item.completed";

        match item_type {
            "error" => vec![self.event(
                raw,
                EventKind::System {
                    severity: Severity::Error,
                    message: item
                        .get("message")
                        .or_else(|| item.get("text"))
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown error")
                        .to_string(),
                    is_fallback: false,
                },
            )],
            "agent_message" => vec![self.event(
                raw,
                EventKind::Message {
                    content_type: ContentType::Text,
                    role: Role::Assistant,
                    text: item.get("text").and_then(Value::as_str).unwrap_or("").to_string(),
                    is_delta: !is_completed,
                },
            )],
            "reasoning" => vec![self.event(
                raw,
                EventKind::Message {
                    content_type: ContentType::Reasoning,
                    role: Role::Assistant,
                    text: item.get("text").and_then(Value::as_str).unwrap_or("").to_string(),
                    is_delta: !is_completed,
                },
            )],
            "command_execution" => {
                let command = item.get("command").and_then(Value::as_str).unwrap_or("");
                let exit_code = item.get("exit_code").and_then(Value::as_i64);
                let status = if is_completed {
                    match exit_code {
                        Some(0) | None => Status::Success,
                        Some(_) => Status::Failed,
                    }
                } else if item_status == "in_progress" {
                    Status::Running
                } else {
                    Status::Pending
                };
                let mut metadata = serde_json::Map::new();
                metadata.insert(
                    "exit_code".into(),
                    exit_code.map(Value::from).unwrap_or(Value::Null),
                );
                metadata.insert(
                    "item_id".into(),
                    item.get("id").cloned().unwrap_or(Value::Null),
                );
                vec![self.event(
                    raw,
                    EventKind::Operation {
                        operation_type: OperationType::Command,
                        name: command.chars().take(50).collect(),
                        operation_id: item.get("id").and_then(Value::as_str).unwrap_or("").to_string(),
                        input: Value::String(command.to_string()),
                        output: item.get("aggregated_output").cloned(),
                        status,
                        metadata,
                    },
                )]
            }
            "file_change" => {
                let changes = item.get("changes").and_then(Value::as_array).cloned().unwrap_or_default();
                let mut metadata = serde_json::Map::new();
                metadata.insert("changes".into(), Value::Array(changes.clone()));
                metadata.insert("count".into(), Value::from(changes.len()));
                let status = if is_completed { Status::Success } else { Status::Running };
                vec![self.event(
                    raw,
                    EventKind::Operation {
                        operation_type: OperationType::File,
                        name: format!("{} files", changes.len()),
                        operation_id: item.get("id").and_then(Value::as_str).unwrap_or("").to_string(),
                        input: Value::Null,
                        output: None,
                        status,
                        metadata,
                    },
                )]
            }
            "function_call" => {
                let name = item.get("name").and_then(Value::as_str).unwrap_or("unknown").to_string();
                let call_id = item.get("call_id").and_then(Value::as_str).unwrap_or("").to_string();
                if !call_id.is_empty() {
                    self.function_names.insert(call_id.clone(), name.clone());
                }
                let arguments = item.get("arguments").cloned().unwrap_or(Value::Null);
                let mut metadata = serde_json::Map::new();
                metadata.insert("arguments".into(), arguments.clone());
                vec![self.event(
                    raw,
                    EventKind::Operation {
                        operation_type: classify_operation(&name),
                        name,
                        operation_id: call_id,
                        input: arguments,
                        output: None,
                        status: Status::Running,
                        metadata,
                    },
                )]
            }
            "function_call_output" => {
                let call_id = item.get("call_id").and_then(Value::as_str).unwrap_or("").to_string();
                let name = self.function_names.get(&call_id).cloned().unwrap_or_else(|| "unknown".to_string());
                let output = item.get("output").cloned().unwrap_or(Value::Null);
                let has_error = output
                    .as_str()
                    .map(|s| s.to_ascii_lowercase().contains("error"))
                    .unwrap_or(false);
                vec![self.event(
                    raw,
                    EventKind::Operation {
                        operation_type: classify_operation(&name),
                        name,
                        operation_id: call_id,
                        input: Value::Null,
                        output: Some(output),
                        status: if has_error { Status::Failed } else { Status::Success },
                        metadata: serde_json::Map::new(),
                    },
                )]
            }
            "mcp_tool_call" => {
                let server = item.get("server").and_then(Value::as_str).unwrap_or("");
                let tool = item.get("tool").and_then(Value::as_str).unwrap_or("");
                let name = if server.is_empty() { tool.to_string() } else { format!("{server}/{tool}") };
                let error = item.get("error");
                let result = item.get("result").cloned();
                let status = if error.is_some() {
                    Status::Failed
                } else if is_completed && result.is_some() {
                    Status::Success
                } else {
                    Status::Running
                };
                let mut metadata = serde_json::Map::new();
                metadata.insert("server".into(), Value::String(server.to_string()));
                metadata.insert("tool".into(), Value::String(tool.to_string()));
                vec![self.event(
                    raw,
                    EventKind::Operation {
                        operation_type: OperationType::Mcp,
                        name,
                        operation_id: String::new(),
                        input: item.get("arguments").cloned().unwrap_or(Value::Null),
                        output: error.cloned().or(result),
                        status,
                        metadata,
                    },
                )]
            }
            "web_search" => vec![self.event(
                raw,
                EventKind::Operation {
                    operation_type: OperationType::Search,
                    name: "web_search".to_string(),
                    operation_id: String::new(),
                    input: item.get("query").cloned().unwrap_or(Value::Null),
                    output: None,
                    status: if is_completed { Status::Success } else { Status::Running },
                    metadata: serde_json::Map::new(),
                },
            )],
            "todo_list" => {
                let items = item.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
                let done = items
                    .iter()
                    .filter(|t| t.get("completed").and_then(Value::as_bool).unwrap_or(false))
                    .count();
                let mut metadata = serde_json::Map::new();
                metadata.insert("items".into(), Value::Array(items.clone()));
                metadata.insert("done".into(), Value::from(done));
                metadata.insert("total".into(), Value::from(items.len()));
                vec![self.event(
                    raw,
                    EventKind::Operation {
                        operation_type: OperationType::Todo,
                        name: format!("TODO {done}/{}", items.len()),
                        operation_id: String::new(),
                        input: Value::Null,
                        output: None,
                        status: if is_completed { Status::Success } else { Status::Running },
                        metadata,
                    },
                )]
            }
            other => vec![self.event(
                raw,
                EventKind::System {
                    severity: Severity::Debug,
                    message: format!("unknown codex item type: {other}"),
                    is_fallback: true,
                },
            )],
        }
    }
}

impl AgentParser for CodexParser {
    fn parse_line(&mut self, raw: &Value) -> Vec<UnifiedEvent> {
        let event_type = raw.get("type").and_then(Value::as_str).unwrap_or("").to_string();

        match event_type.as_str() {
            "session_configured" => self.parse_session_configured(raw),
            "turn.started" => self.parse_turn_started(raw),
            "turn.completed" => self.parse_turn_completed(raw),
            "turn.failed" => self.parse_turn_failed(raw),
            "error" => self.parse_error(raw),
            "item.started" | "item.updated" | "item.completed" => self.parse_item(raw, &event_type),
            other => vec![self.event(
                raw,
                EventKind::System {
                    severity: Severity::Debug,
                    message: format!("unrecognised codex event type: {other}"),
                    is_fallback: true,
                },
            )],
        }
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn check_execution_errors(&self, _non_json_stdout: &[String]) -> Option<String> {
        None
    }
}
