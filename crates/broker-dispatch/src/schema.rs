//! Dynamic MCP tool/argument schema generation. Schemas are built
//! programmatically per `AgentKind` rather than hand-written per tool: a
//! shared base is extended with each agent's extras and, for the
//! `_parallel` variant, the singular fields are pluralised.

use broker_model::AgentKind;
use serde_json::{json, Value};

/// One MCP tool: its exact name, human-facing description, and the JSON
/// Schema its `call_tool` arguments must satisfy.
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn tool_description(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Codex => {
            "Run the OpenAI Codex CLI agent for deep analysis and critical review. \
             It has no shared memory with the other agents: it sees only this prompt, \
             any context_paths, and its own history via continuation_id. Strong at \
             finding edge cases, bugs, and architectural issues. Supports image attachments."
        }
        AgentKind::Gemini => {
            "Run the Google Gemini CLI agent for UI design and broad codebase analysis. \
             No shared memory with the other agents — only this prompt, context_paths, and \
             continuation_id history. Good first choice for \"understand this codebase\" tasks."
        }
        AgentKind::Claude => {
            "Run the Anthropic Claude CLI agent for code implementation. No shared memory \
             with the other agents — only this prompt, context_paths, and continuation_id \
             history. Strong at turning requirements into working code that follows existing \
             conventions. Supports system_prompt, append_system_prompt, and agent parameters."
        }
        AgentKind::Opencode => {
            "Run the OpenCode CLI agent for full-stack development across multiple providers. \
             No shared memory with the other agents — only this prompt, context_paths, and \
             continuation_id history. Supports file attachments and named agent profiles \
             (build, plan, ...)."
        }
    }
}

fn common_properties(parallel: bool) -> Vec<(&'static str, Value)> {
    let mut props = vec![
        ("workspace", json!({"type": "string", "description": "Absolute path to the project directory the agent runs in."})),
        ("permission", json!({
            "type": "string",
            "enum": ["read-only", "workspace-write", "unlimited"],
            "default": "read-only",
            "description": "Sandbox level granted to the agent process.",
        })),
        ("handoff_file", json!({"type": "string", "description": "Path (absolute or workspace-relative) the scheduler appends this run's output to."})),
        ("report_mode", json!({"type": "boolean", "default": false, "description": "Ask the agent for a self-contained, standalone report rather than a conversational reply."})),
        ("context_paths", json!({
            "type": "array",
            "items": {"type": "string"},
            "default": [],
            "description": "Reference file paths the agent may read for extra context.",
        })),
    ];

    if parallel {
        props.push(("model", json!({
            "type": "array",
            "items": {"type": "string"},
            "default": [],
            "description": "Model override(s). A single element applies to every task; multiple elements must match parallel_prompts length.",
        })));
    } else {
        props.push(("prompt", json!({"type": "string", "description": "The task prompt sent to the agent."})));
        props.push(("continuation_id", json!({"type": "string", "description": "Session id from a previous call to resume that conversation."})));
        props.push(("model", json!({"type": "string", "description": "Model override; empty uses the agent CLI's own default."})));
    }

    props
}

fn agent_specific_properties(kind: AgentKind) -> Vec<(&'static str, Value)> {
    match kind {
        AgentKind::Codex => vec![(
            "image",
            json!({
                "type": "array",
                "items": {"type": "string"},
                "default": [],
                "description": "Absolute paths to images to attach.",
            }),
        )],
        AgentKind::Claude => vec![
            ("system_prompt", json!({"type": "string", "description": "Replaces the agent's default system prompt."})),
            ("append_system_prompt", json!({"type": "string", "description": "Appended after the agent's default system prompt."})),
            ("agent", json!({"type": "string", "description": "Named sub-agent profile to run as."})),
        ],
        AgentKind::Opencode => vec![
            ("file", json!({
                "type": "array",
                "items": {"type": "string"},
                "default": [],
                "description": "Absolute paths to files to attach to the message.",
            })),
            ("agent", json!({"type": "string", "default": "build", "description": "Named agent profile, e.g. 'build' or 'plan'."})),
        ],
        AgentKind::Gemini => Vec::new(),
    }
}

fn parallel_properties() -> Vec<(&'static str, Value)> {
    vec![
        ("parallel_prompts", json!({
            "type": "array",
            "minItems": 1,
            "maxItems": 100,
            "items": {"type": "string", "minLength": 1},
            "description": "One prompt per independent subprocess.",
        })),
        ("parallel_task_notes", json!({
            "type": "array",
            "minItems": 1,
            "maxItems": 100,
            "items": {"type": "string", "minLength": 1, "maxLength": 120},
            "description": "One label per task; length must equal parallel_prompts.",
        })),
        ("parallel_max_concurrency", json!({
            "type": "integer",
            "default": 20,
            "minimum": 1,
            "maximum": 100,
            "description": "Maximum number of tasks running at once.",
        })),
        ("parallel_fail_fast", json!({
            "type": "boolean",
            "default": false,
            "description": "Stop starting new tasks once any task fails; already-running tasks finish.",
        })),
    ]
}

fn tail_properties(parallel: bool) -> Vec<(&'static str, Value)> {
    let mut props = Vec::new();
    if !parallel {
        props.push(("task_note", json!({
            "type": "string",
            "default": "",
            "description": "Short user-facing label for this task, shown in the dashboard.",
        })));
    }
    props.push(("debug", json!({"type": "boolean", "default": false, "description": "Include execution statistics (tokens, duration) in the reply."})));
    props
}

/// Builds the schema for `kind`'s single-call or `_parallel` tool.
pub fn build_schema(kind: AgentKind, parallel: bool) -> ToolSchema {
    let mut properties = serde_json::Map::new();
    let mut order = Vec::new();

    for (key, value) in common_properties(parallel) {
        order.push(key);
        properties.insert(key.to_string(), value);
    }
    for (key, value) in agent_specific_properties(kind) {
        order.push(key);
        properties.insert(key.to_string(), value);
    }
    if parallel {
        for (key, value) in parallel_properties() {
            order.push(key);
            properties.insert(key.to_string(), value);
        }
    }
    for (key, value) in tail_properties(parallel) {
        order.push(key);
        properties.insert(key.to_string(), value);
    }

    let required: Vec<&str> = if parallel {
        vec!["workspace", "handoff_file", "parallel_prompts", "parallel_task_notes"]
    } else {
        vec!["prompt", "workspace", "handoff_file"]
    };

    let name = if parallel { kind.parallel_tool_name() } else { kind.tool_name().to_string() };
    let description = if parallel {
        format!("Fan out N independent prompts across concurrent {} subprocesses. {}", kind.tool_name(), tool_description(kind))
    } else {
        tool_description(kind).to_string()
    };

    ToolSchema {
        name,
        description,
        parameters: Value::Object({
            let mut schema = serde_json::Map::new();
            schema.insert("type".to_string(), json!("object"));
            schema.insert("properties".to_string(), Value::Object(properties));
            schema.insert("required".to_string(), json!(required));
            schema
        }),
    }
}

/// The constant, argument-free `get_gui_url` tool.
pub fn gui_url_schema() -> ToolSchema {
    ToolSchema {
        name: "get_gui_url".to_string(),
        description: "Returns the URL of the live dashboard, or an explanatory error if it is disabled or failed to bind.".to_string(),
        parameters: json!({"type": "object", "properties": {}, "required": []}),
    }
}

/// Every tool schema the dispatcher can serve, honoring the enable/disable
/// lists from configuration.
pub fn all_schemas(is_enabled: impl Fn(&str) -> bool) -> Vec<ToolSchema> {
    let mut schemas = Vec::new();
    for kind in AgentKind::ALL {
        if !is_enabled(kind.tool_name()) {
            continue;
        }
        schemas.push(build_schema(kind, false));
        schemas.push(build_schema(kind, true));
    }
    schemas.push(gui_url_schema());
    schemas
}
