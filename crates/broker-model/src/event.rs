use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::agent::AgentKind;

/// Status shared by lifecycle and operation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleType {
    SessionStart,
    TurnStart,
    TurnEnd,
    SessionEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Reasoning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A tool call's classification. `File` serialises as `"file_change"`,
/// carried over verbatim from the dialect this was distilled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Command,
    #[serde(rename = "file_change")]
    File,
    Tool,
    Mcp,
    Search,
    Todo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// The broker's canonical representation of one item an agent produced.
///
/// Every variant carries the fields common to all events (`event_id`,
/// `timestamp`, `source`, `session_id`, `raw`) plus whatever is specific to
/// that kind of occurrence. `raw` is the original parsed JSON value for the
/// line that produced this event and is never mutated after construction —
/// it exists purely so the dashboard and debug logs can show exactly what
/// the agent said.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UnifiedEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: AgentKind,
    pub session_id: Option<String>,
    pub raw: Value,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum EventKind {
    Lifecycle {
        lifecycle_type: LifecycleType,
        status: Status,
        model: Option<String>,
        #[serde(default)]
        stats: Map<String, Value>,
    },
    Message {
        content_type: ContentType,
        role: Role,
        text: String,
        is_delta: bool,
    },
    Operation {
        operation_type: OperationType,
        name: String,
        operation_id: String,
        input: Value,
        #[serde(default)]
        output: Option<Value>,
        status: Status,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    System {
        severity: Severity,
        message: String,
        #[serde(default)]
        is_fallback: bool,
    },
}

impl UnifiedEvent {
    pub fn new(source: AgentKind, session_id: Option<String>, raw: Value, kind: EventKind) -> Self {
        UnifiedEvent {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source,
            session_id,
            raw,
            kind,
        }
    }

    /// Synthetic events the broker itself produces (start/cancel markers)
    /// carry `raw = null` since there is no originating agent line.
    pub fn synthetic_system(
        source: AgentKind,
        session_id: Option<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        UnifiedEvent::new(
            source,
            session_id,
            Value::Null,
            EventKind::System {
                severity,
                message: message.into(),
                is_fallback: false,
            },
        )
    }

    pub fn is_assistant_message(&self) -> bool {
        matches!(
            &self.kind,
            EventKind::Message {
                role: Role::Assistant,
                content_type: ContentType::Text,
                ..
            }
        )
    }

    pub fn is_operation(&self) -> bool {
        matches!(&self.kind, EventKind::Operation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_type_file_serialises_as_file_change() {
        let v = serde_json::to_value(OperationType::File).unwrap();
        assert_eq!(v, json!("file_change"));
    }

    #[test]
    fn operation_type_file_round_trips() {
        let v: OperationType = serde_json::from_value(json!("file_change")).unwrap();
        assert_eq!(v, OperationType::File);
    }

    #[test]
    fn synthetic_system_has_null_raw() {
        let ev = UnifiedEvent::synthetic_system(
            AgentKind::Claude,
            None,
            Severity::Warning,
            "Execution cancelled by user",
        );
        assert_eq!(ev.raw, Value::Null);
        match ev.kind {
            EventKind::System { is_fallback, .. } => assert!(!is_fallback),
            _ => panic!("expected System variant"),
        }
    }
}
