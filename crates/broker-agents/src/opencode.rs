use broker_model::{
    AgentKind, ContentType, EventKind, LifecycleType, Permission, Role, Severity, Status,
    UnifiedEvent,
};
use serde_json::Value;
use std::sync::OnceLock;

use crate::argv::ArgvBuilder;
use crate::classify::classify_operation;
use crate::params::RunParams;
use crate::parser::AgentParser;

/// Builds argv for `opencode run`.
///
/// Permission does not map onto an argv flag: opencode reads it from the
/// `OPENCODE_PERMISSION` environment variable as a JSON object, which is
/// why this builder has an [`ArgvBuilder::extra_env`] override rather than
/// appending a flag the way the other three kinds do.
pub struct OpencodeArgv;

impl ArgvBuilder for OpencodeArgv {
    fn kind(&self) -> AgentKind {
        AgentKind::Opencode
    }

    fn build_args(&self, params: &RunParams) -> Result<Vec<String>, String> {
        let mut args = vec!["run".to_string(), "--print-logs".to_string()];

        if let Some(model) = &params.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(session_id) = &params.session_id {
            args.push("--session".to_string());
            args.push(session_id.clone());
        }

        for file in &params.file {
            args.push("--file".to_string());
            args.push(file.to_string_lossy().into_owned());
        }

        args.push(params.prompt.clone());

        Ok(args)
    }

    fn extra_env(&self, params: &RunParams) -> Vec<(String, String)> {
        let config = match params.permission {
            Permission::ReadOnly => serde_json::json!({
                "edit": "deny", "bash": "deny", "webfetch": "deny",
            }),
            Permission::WorkspaceWrite => serde_json::json!({
                "edit": "allow", "bash": "ask", "webfetch": "ask",
            }),
            Permission::Unlimited => serde_json::json!({
                "edit": "allow", "bash": "allow", "webfetch": "allow", "external_directory": "allow",
            }),
        };
        vec![("OPENCODE_PERMISSION".to_string(), config.to_string())]
    }
}

fn error_class_pattern() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^(\w+Error):\s*(.*)$").unwrap())
}

/// Stateful parser for opencode's event stream plus the stdout-traceback
/// error hook: opencode sometimes exits 0 after printing a Python-style
/// traceback to stdout rather than emitting a JSON error event.
pub struct OpencodeParser {
    session_id: Option<String>,
}

impl OpencodeParser {
    pub fn new() -> Self {
        OpencodeParser { session_id: None }
    }

    fn event(&self, raw: &Value, kind: EventKind) -> UnifiedEvent {
        UnifiedEvent::new(AgentKind::Opencode, self.session_id.clone(), raw.clone(), kind)
    }

    fn adopt_session_id(&mut self, raw: &Value) {
        if self.session_id.is_none() {
            if let Some(id) = raw.get("sessionID").and_then(Value::as_str) {
                if !id.is_empty() {
                    self.session_id = Some(id.to_string());
                }
            }
        }
    }
}

impl AgentParser for OpencodeParser {
    fn parse_line(&mut self, raw: &Value) -> Vec<UnifiedEvent> {
        self.adopt_session_id(raw);
        let event_type = raw.get("type").and_then(Value::as_str).unwrap_or("");

        match event_type {
            "tool_use" => {
                let part = raw.get("part").cloned().unwrap_or(Value::Null);
                let tool_name = part.get("tool").and_then(Value::as_str).unwrap_or("unknown").to_string();
                let state = part.get("state").cloned().unwrap_or(Value::Null);
                let input = state.get("input").cloned().unwrap_or(Value::Null);
                let output = state.get("output").and_then(Value::as_str).map(String::from);
                let title = state.get("title").and_then(Value::as_str).map(String::from);
                let status_str = state.get("status").and_then(Value::as_str).unwrap_or("completed");

                let status = match status_str {
                    "completed" => Status::Success,
                    "running" => Status::Running,
                    "failed" | "error" => Status::Failed,
                    _ => Status::Success,
                };

                let mut metadata = serde_json::Map::new();
                metadata.insert("state".into(), state);
                metadata.insert("title".into(), title.clone().map(Value::String).unwrap_or(Value::Null));

                vec![self.event(
                    raw,
                    EventKind::Operation {
                        operation_type: classify_operation(&tool_name),
                        name: tool_name,
                        operation_id: String::new(),
                        input,
                        output: output.or(title).map(Value::String),
                        status,
                        metadata,
                    },
                )]
            }
            "step_start" => vec![self.event(
                raw,
                EventKind::Lifecycle {
                    lifecycle_type: LifecycleType::TurnStart,
                    status: Status::Running,
                    model: None,
                    stats: serde_json::Map::new(),
                },
            )],
            "step_finish" => vec![self.event(
                raw,
                EventKind::Lifecycle {
                    lifecycle_type: LifecycleType::TurnEnd,
                    status: Status::Success,
                    model: None,
                    stats: serde_json::Map::new(),
                },
            )],
            "text" => {
                let part = raw.get("part").cloned().unwrap_or(Value::Null);
                let text = part.get("text").and_then(Value::as_str).unwrap_or("").to_string();
                let has_end = part
                    .get("time")
                    .and_then(|t| t.get("end"))
                    .map(|v| !v.is_null())
                    .unwrap_or(false);
                vec![self.event(
                    raw,
                    EventKind::Message {
                        content_type: ContentType::Text,
                        role: Role::Assistant,
                        text,
                        is_delta: !has_end,
                    },
                )]
            }
            "error" => {
                let error = raw.get("error").cloned().unwrap_or(Value::Null);
                let message = if let Some(obj) = error.as_object() {
                    let base = obj
                        .get("message")
                        .or_else(|| obj.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown error");
                    obj.get("data")
                        .and_then(Value::as_object)
                        .and_then(|d| d.get("message"))
                        .and_then(Value::as_str)
                        .unwrap_or(base)
                        .to_string()
                } else {
                    error.as_str().unwrap_or("Unknown error").to_string()
                };
                vec![self.event(raw, EventKind::System { severity: Severity::Error, message, is_fallback: false })]
            }
            other => vec![self.event(
                raw,
                EventKind::System {
                    severity: Severity::Debug,
                    message: format!("unrecognised opencode event type: {other}"),
                    is_fallback: true,
                },
            )],
        }
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn check_execution_errors(&self, non_json_stdout: &[String]) -> Option<String> {
        let pattern = error_class_pattern();
        non_json_stdout
            .iter()
            .rev()
            .find_map(|line| pattern.captures(line.trim_end()))
            .map(|caps| {
                let error_name = &caps[1];
                let error_msg = caps.get(2).map(|m| m.as_str()).filter(|s| !s.is_empty()).unwrap_or(error_name);
                format!("OpenCode error (exit code 0): {error_name}: {error_msg}")
            })
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
        let argv = OpencodeArgv.build_args(&params()).unwrap();
        assert_eq!(argv.last(), Some(&"hi".to_string()));
    }

    #[test]
    fn read_only_denies_edit_and_bash() {
        let env = OpencodeArgv.extra_env(&params());
        let (_, value) = &env[0];
        assert!(value.contains("\"edit\":\"deny\""));
    }

    #[test]
    fn unlimited_allows_external_directory() {
        let mut p = params();
        p.permission = Permission::Unlimited;
        let env = OpencodeArgv.extra_env(&p);
        assert!(env[0].1.contains("external_directory"));
    }

    #[test]
    fn session_resume_uses_session_flag() {
        let mut p = params();
        p.session_id = Some("sess-5".into());
        let argv = OpencodeArgv.build_args(&p).unwrap();
        assert!(argv.windows(2).any(|w| w == ["--session", "sess-5"]));
    }

    #[test]
    fn sticky_session_id_from_first_event() {
        let mut parser = OpencodeParser::new();
        parser.parse_line(&json!({"type": "step_start", "sessionID": "oc-1"}));
        parser.parse_line(&json!({"type": "step_finish"}));
        assert_eq!(parser.session_id(), Some("oc-1"));
    }

    #[test]
    fn check_execution_errors_finds_trailing_traceback_line() {
        let parser = OpencodeParser::new();
        let stdout = vec![
            "some normal log line".to_string(),
            "ProviderModelNotFoundError: unknown model foo".to_string(),
        ];
        let err = parser.check_execution_errors(&stdout).unwrap();
        assert!(err.contains("ProviderModelNotFoundError"));
    }

    #[test]
    fn check_execution_errors_none_when_no_traceback() {
        let parser = OpencodeParser::new();
        let stdout = vec!["all good".to_string()];
        assert!(parser.check_execution_errors(&stdout).is_none());
    }
}
