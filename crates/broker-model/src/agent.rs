use std::fmt;
use std::str::FromStr;

/// The closed set of code-assistant CLIs the broker knows how to drive.
///
/// Adding a new kind is additive: a new variant plus its argv template,
/// parser, and session-id rule elsewhere in the workspace. Nothing here
/// should ever need a wildcard/default arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Claude,
    Codex,
    Gemini,
    Opencode,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Claude,
        AgentKind::Codex,
        AgentKind::Gemini,
        AgentKind::Opencode,
    ];

    /// The base tool name exposed over MCP (`claude`, `codex`, ...).
    pub fn tool_name(&self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Codex => "codex",
            AgentKind::Gemini => "gemini",
            AgentKind::Opencode => "opencode",
        }
    }

    /// The fan-out tool name (`claude_parallel`, ...). Every kind supports
    /// fan-out; there is no kind-specific opt-out.
    pub fn parallel_tool_name(&self) -> String {
        format!("{}_parallel", self.tool_name())
    }

    /// The executable this kind invokes.
    pub fn binary(&self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Codex => "codex",
            AgentKind::Gemini => "gemini",
            AgentKind::Opencode => "opencode",
        }
    }

    /// Whether the prompt is delivered on stdin (true) or as a positional
    /// argv entry (false).
    pub fn prompt_on_stdin(&self) -> bool {
        matches!(self, AgentKind::Claude | AgentKind::Codex)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(AgentKind::Claude),
            "codex" => Ok(AgentKind::Codex),
            "gemini" => Ok(AgentKind::Gemini),
            "opencode" => Ok(AgentKind::Opencode),
            other => Err(format!("unknown agent kind: {other}")),
        }
    }
}

/// Sandbox level requested for a run. Each agent maps this to its own
/// native flag; the mapping lives with the agent, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    #[default]
    ReadOnly,
    WorkspaceWrite,
    Unlimited,
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-only" | "read_only" => Ok(Permission::ReadOnly),
            "workspace-write" | "workspace_write" => Ok(Permission::WorkspaceWrite),
            "unlimited" => Ok(Permission::Unlimited),
            other => Err(format!("unknown permission: {other}")),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Permission::ReadOnly => "read-only",
            Permission::WorkspaceWrite => "workspace-write",
            Permission::Unlimited => "unlimited",
        };
        f.write_str(s)
    }
}
