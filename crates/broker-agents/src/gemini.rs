use broker_model::{
    AgentKind, ContentType, EventKind, LifecycleType, Permission, Role, Severity, Status,
    UnifiedEvent,
};
use serde_json::Value;
use std::collections::HashMap;

use crate::argv::ArgvBuilder;
use crate::classify::classify_operation;
use crate::params::RunParams;
use crate::parser::AgentParser;

/// Builds argv for `gemini`. Unlike claude/codex, gemini does not read the
/// prompt from stdin: it is passed as the trailing positional argument.
pub struct GeminiArgv;

impl ArgvBuilder for GeminiArgv {
    fn kind(&self) -> AgentKind {
        AgentKind::Gemini
    }

    fn build_args(&self, params: &RunParams) -> Result<Vec<String>, String> {
        let mut args = Vec::new();

        if params.permission == Permission::Unlimited {
            args.push("--yolo".to_string());
        }

        if let Some(model) = &params.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(session_id) = &params.session_id {
            args.push("--checkpointing".to_string());
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }

        args.push(params.prompt.clone());

        Ok(args)
    }
}

/// Stateful parser for gemini's event stream. gemini's own event types
/// (`init`/`message`/`tool_use`/`tool_result`/`error`/`result`) are a flat
/// shape with no nested item objects, the simplest of the four dialects.
pub struct GeminiParser {
    session_id: Option<String>,
    model: Option<String>,
    tool_names: HashMap<String, String>,
}

impl GeminiParser {
    pub fn new() -> Self {
        GeminiParser {
            session_id: None,
            model: None,
            tool_names: HashMap::new(),
        }
    }

    fn event(&self, raw: &Value, kind: EventKind) -> UnifiedEvent {
        UnifiedEvent::new(AgentKind::Gemini, self.session_id.clone(), raw.clone(), kind)
    }
}

impl AgentParser for GeminiParser {
    fn parse_line(&mut self, raw: &Value) -> Vec<UnifiedEvent> {
        let event_type = raw.get("type").and_then(Value::as_str).unwrap_or("");

        match event_type {
            "init" => {
                self.session_id = raw.get("sessionId").and_then(Value::as_str).map(String::from);
                self.model = raw.get("model").and_then(Value::as_str).map(String::from);
                vec![self.event(
                    raw,
                    EventKind::Lifecycle {
                        lifecycle_type: LifecycleType::SessionStart,
                        status: Status::Success,
                        model: self.model.clone(),
                        stats: serde_json::Map::new(),
                    },
                )]
            }
            "message" => {
                let role_str = raw.get("role").and_then(Value::as_str).unwrap_or("assistant");
                let role = if role_str == "user" { Role::User } else { Role::Assistant };
                let text = raw.get("content").and_then(Value::as_str).unwrap_or("").to_string();
                let is_delta = raw.get("delta").and_then(Value::as_bool).unwrap_or(false);
                vec![self.event(
                    raw,
                    EventKind::Message {
                        content_type: ContentType::Text,
                        role,
                        text,
                        is_delta,
                    },
                )]
            }
            "tool_use" => {
                let tool_name = raw.get("tool_name").and_then(Value::as_str).unwrap_or("unknown").to_string();
                let tool_id = raw.get("tool_id").and_then(Value::as_str).unwrap_or("").to_string();
                if !tool_id.is_empty() {
                    self.tool_names.insert(tool_id.clone(), tool_name.clone());
                }
                let parameters = raw.get("parameters").cloned().unwrap_or(Value::Null);
                let mut metadata = serde_json::Map::new();
                metadata.insert("parameters".into(), parameters.clone());
                vec![self.event(
                    raw,
                    EventKind::Operation {
                        operation_type: classify_operation(&tool_name),
                        name: tool_name,
                        operation_id: tool_id,
                        input: parameters,
                        output: None,
                        status: Status::Running,
                        metadata,
                    },
                )]
            }
            "tool_result" => {
                let tool_id = raw.get("tool_id").and_then(Value::as_str).unwrap_or("").to_string();
                let status_str = raw.get("status").and_then(Value::as_str).unwrap_or("success");
                let error = raw.get("error");
                let tool_name = self.tool_names.get(&tool_id).cloned().unwrap_or_else(|| "unknown".to_string());

                let (status, output) = if status_str == "error" || error.is_some() {
                    let error_msg = match error {
                        Some(Value::Object(o)) => o.get("message").and_then(Value::as_str).map(String::from),
                        Some(Value::String(s)) => Some(s.clone()),
                        _ => None,
                    };
                    (Status::Failed, error_msg.map(Value::String))
                } else {
                    (Status::Success, raw.get("output").cloned())
                };

                vec![self.event(
                    raw,
                    EventKind::Operation {
                        operation_type: classify_operation(&tool_name),
                        name: tool_name,
                        operation_id: tool_id,
                        input: Value::Null,
                        output,
                        status,
                        metadata: serde_json::Map::new(),
                    },
                )]
            }
            "error" => {
                let message = raw.get("message").and_then(Value::as_str).unwrap_or("Unknown error").to_string();
                let severity = match raw.get("severity").and_then(Value::as_str) {
                    Some("warning") => Severity::Warning,
                    _ => Severity::Error,
                };
                vec![self.event(raw, EventKind::System { severity, message, is_fallback: false })]
            }
            "result" => {
                let status_str = raw.get("status").and_then(Value::as_str).unwrap_or("success");
                let error = raw.get("error");
                let status = if status_str == "error" || error.is_some() {
                    Status::Failed
                } else {
                    Status::Success
                };
                let stats_in = raw.get("stats").cloned().unwrap_or(Value::Null);
                let mut stats = serde_json::Map::new();
                if !stats_in.is_null() {
                    for key in ["total_tokens", "input_tokens", "output_tokens", "duration_ms", "tool_calls"] {
                        stats.insert(key.into(), stats_in.get(key).cloned().unwrap_or(Value::Null));
                    }
                }
                vec![self.event(
                    raw,
                    EventKind::Lifecycle {
                        lifecycle_type: LifecycleType::SessionEnd,
                        status,
                        model: self.model.clone(),
                        stats,
                    },
                )]
            }
            other => vec![self.event(
                raw,
                EventKind::System {
                    severity: Severity::Debug,
                    message: format!("unrecognised gemini event type: {other}"),
                    is_fallback: true,
                },
            )],
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
    fn prompt_is_trailing_positional() {
        let argv = GeminiArgv.build_args(&params()).unwrap();
        assert_eq!(argv.last(), Some(&"hi".to_string()));
    }

    #[test]
    fn unlimited_permission_adds_yolo() {
        let mut p = params();
        p.permission = Permission::Unlimited;
        let argv = GeminiArgv.build_args(&p).unwrap();
        assert!(argv.contains(&"--yolo".to_string()));
    }

    #[test]
    fn read_only_omits_yolo() {
        let argv = GeminiArgv.build_args(&params()).unwrap();
        assert!(!argv.contains(&"--yolo".to_string()));
    }

    #[test]
    fn resume_adds_checkpointing_and_resume() {
        let mut p = params();
        p.session_id = Some("sess-9".into());
        let argv = GeminiArgv.build_args(&p).unwrap();
        assert!(argv.contains(&"--checkpointing".to_string()));
        assert!(argv.windows(2).any(|w| w == ["--resume", "sess-9"]));
    }

    #[test]
    fn init_event_reads_camel_case_session_id() {
        let mut parser = GeminiParser::new();
        let raw = json!({"type": "init", "sessionId": "g-session", "model": "gemini-x"});
        parser.parse_line(&raw);
        assert_eq!(parser.session_id(), Some("g-session"));
    }

    #[test]
    fn tool_use_then_result_correlate() {
        let mut parser = GeminiParser::new();
        parser.parse_line(&json!({"type": "tool_use", "tool_id": "t1", "tool_name": "Read", "parameters": {}}));
        let events = parser.parse_line(&json!({"type": "tool_result", "tool_id": "t1", "status": "success", "output": "contents"}));
        match &events[0].kind {
            EventKind::Operation { name, status, .. } => {
                assert_eq!(name, "Read");
                assert_eq!(*status, Status::Success);
            }
            _ => panic!("expected operation"),
        }
    }
}
