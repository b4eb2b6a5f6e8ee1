use std::path::PathBuf;

use broker_model::Permission;

/// Parameters accepted by one agent run, merged from the common schema
/// plus each kind's extras. Fields that do not apply to a given
/// `AgentKind` are simply left at their defaults — the argv builder for
/// that kind ignores them.
#[derive(Debug, Clone, Default)]
pub struct RunParams {
    pub prompt: String,
    pub workspace: PathBuf,
    pub permission: Permission,
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub task_note: Option<String>,
    pub tags: Vec<String>,

    // claude-specific
    pub system_prompt: Option<String>,
    pub append_system_prompt: Option<String>,
    pub agent_name: Option<String>,

    // codex-specific
    pub image: Vec<PathBuf>,

    // opencode-specific
    pub file: Vec<PathBuf>,
}

impl RunParams {
    pub fn new(prompt: impl Into<String>, workspace: PathBuf) -> Self {
        RunParams {
            prompt: prompt.into(),
            workspace,
            ..Default::default()
        }
    }
}
