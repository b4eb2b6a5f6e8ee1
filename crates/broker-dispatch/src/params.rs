//! Parses and validates the raw JSON arguments a `call_tool` request
//! carries into either a single-call or fan-out request, normalising every
//! path-valued field against the workspace.

use std::path::PathBuf;

use broker_agents::RunParams;
use broker_model::{AgentKind, Permission};
use serde::Deserialize;
use serde_json::Value;

use crate::transcript::resolve_path;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case", default)]
struct RawSingleArgs {
    prompt: String,
    workspace: String,
    permission: Option<String>,
    continuation_id: Option<String>,
    model: Option<String>,
    handoff_file: String,
    report_mode: bool,
    context_paths: Vec<String>,
    task_note: Option<String>,
    debug: bool,
    system_prompt: Option<String>,
    append_system_prompt: Option<String>,
    agent: Option<String>,
    image: Vec<String>,
    file: Vec<String>,
}

/// A validated, workspace-normalised single-call request.
pub struct SingleCallRequest {
    pub run_params: RunParams,
    pub handoff_file: PathBuf,
    pub report_mode: bool,
    pub context_paths: Vec<String>,
    pub task_note: Option<String>,
    pub debug: bool,
}

/// Parses and validates a single-call `call_tool` payload. Required: a
/// non-blank `prompt`, a `workspace` that exists, and a non-blank
/// `handoff_file`.
pub fn parse_single_call(kind: AgentKind, args: Value) -> Result<SingleCallRequest, String> {
    let raw: RawSingleArgs = serde_json::from_value(args).map_err(|e| format!("invalid arguments: {e}"))?;

    if raw.prompt.trim().is_empty() {
        return Err("Missing required argument: 'prompt'".to_string());
    }
    if raw.workspace.trim().is_empty() {
        return Err("Missing required argument: 'workspace'".to_string());
    }
    if raw.handoff_file.trim().is_empty() {
        return Err("Missing required argument: 'handoff_file'".to_string());
    }

    let workspace = resolve_path(&std::env::current_dir().unwrap_or_default(), &raw.workspace);
    if !workspace.is_dir() {
        return Err(format!("workspace does not exist or is not a directory: {}", workspace.display()));
    }

    let permission = match raw.permission {
        Some(p) => p.parse::<Permission>()?,
        None => Permission::default(),
    };

    let handoff_file = resolve_path(&workspace, &raw.handoff_file);

    let run_params = RunParams {
        prompt: raw.prompt,
        workspace: workspace.clone(),
        permission,
        session_id: raw.continuation_id,
        model: raw.model,
        task_note: raw.task_note.clone(),
        tags: Vec::new(),
        system_prompt: raw.system_prompt,
        append_system_prompt: raw.append_system_prompt,
        agent_name: raw.agent,
        image: raw.image.into_iter().map(|p| resolve_path(&workspace, &p)).collect(),
        file: raw.file.into_iter().map(|p| resolve_path(&workspace, &p)).collect(),
    };

    Ok(SingleCallRequest {
        run_params,
        handoff_file,
        report_mode: raw.report_mode,
        context_paths: raw.context_paths,
        task_note: raw.task_note,
        debug: raw.debug,
    })
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case", default)]
struct RawParallelArgs {
    workspace: String,
    permission: Option<String>,
    model: Vec<String>,
    handoff_file: String,
    report_mode: bool,
    context_paths: Vec<String>,
    debug: bool,
    system_prompt: Option<String>,
    append_system_prompt: Option<String>,
    agent: Option<String>,
    image: Vec<String>,
    file: Vec<String>,
    parallel_prompts: Vec<String>,
    parallel_task_notes: Vec<String>,
    parallel_max_concurrency: Option<u32>,
    parallel_fail_fast: bool,
}

/// One prepared fan-out task: a complete `RunParams` ready for its own
/// isolated `Invoker`.
pub struct FanoutTask {
    pub index: usize,
    pub run_params: RunParams,
    pub task_note: String,
}

pub struct FanoutRequest {
    pub tasks: Vec<FanoutTask>,
    pub handoff_file: PathBuf,
    pub max_concurrency: usize,
    pub fail_fast: bool,
    pub debug: bool,
}

const MAX_FANOUT_TASKS: usize = 100;

/// Parses and validates a `_parallel` `call_tool` payload per the
/// fan-out contract: prompts non-empty and capped, notes length must
/// match, models either broadcast (single element) or match length,
/// `max_concurrency` clamped to `[1, 100]`.
pub fn parse_fanout_call(kind: AgentKind, args: Value) -> Result<FanoutRequest, String> {
    let raw: RawParallelArgs = serde_json::from_value(args).map_err(|e| format!("invalid arguments: {e}"))?;

    if raw.workspace.trim().is_empty() {
        return Err("Missing required argument: 'workspace'".to_string());
    }
    if raw.handoff_file.trim().is_empty() {
        return Err("Missing required argument: 'handoff_file'".to_string());
    }
    if raw.parallel_prompts.is_empty() {
        return Err("'parallel_prompts' must not be empty".to_string());
    }
    if raw.parallel_prompts.len() > MAX_FANOUT_TASKS {
        return Err(format!("'parallel_prompts' exceeds the cap of {MAX_FANOUT_TASKS}"));
    }
    if raw.parallel_prompts.iter().any(|p| p.trim().is_empty()) {
        return Err("'parallel_prompts' entries must not be blank".to_string());
    }
    if raw.parallel_task_notes.len() != raw.parallel_prompts.len() {
        return Err("'parallel_task_notes' length must equal 'parallel_prompts' length".to_string());
    }
    if raw.parallel_task_notes.iter().any(|n| n.trim().is_empty()) {
        return Err("'parallel_task_notes' entries must not be blank".to_string());
    }
    if raw.model.len() > 1 && raw.model.len() != raw.parallel_prompts.len() {
        return Err("'model' must have one element (broadcast) or match 'parallel_prompts' length".to_string());
    }

    let workspace = resolve_path(&std::env::current_dir().unwrap_or_default(), &raw.workspace);
    if !workspace.is_dir() {
        return Err(format!("workspace does not exist or is not a directory: {}", workspace.display()));
    }

    let permission = match raw.permission {
        Some(p) => p.parse::<Permission>()?,
        None => Permission::default(),
    };
    let handoff_file = resolve_path(&workspace, &raw.handoff_file);
    let max_concurrency = raw.parallel_max_concurrency.unwrap_or(20).clamp(1, 100) as usize;

    let images: Vec<PathBuf> = raw.image.iter().map(|p| resolve_path(&workspace, p)).collect();
    let files: Vec<PathBuf> = raw.file.iter().map(|p| resolve_path(&workspace, p)).collect();

    let mut tasks = Vec::with_capacity(raw.parallel_prompts.len());
    for (index, prompt) in raw.parallel_prompts.into_iter().enumerate() {
        let model = if raw.model.len() == 1 {
            Some(raw.model[0].clone())
        } else {
            raw.model.get(index).cloned()
        };

        let run_params = RunParams {
            prompt,
            workspace: workspace.clone(),
            permission,
            session_id: None,
            model,
            task_note: Some(raw.parallel_task_notes[index].clone()),
            tags: Vec::new(),
            system_prompt: raw.system_prompt.clone(),
            append_system_prompt: raw.append_system_prompt.clone(),
            agent_name: raw.agent.clone(),
            image: images.clone(),
            file: files.clone(),
        };

        let _ = kind;
        tasks.push(FanoutTask { index, run_params, task_note: raw.parallel_task_notes[index].clone() });
    }

    Ok(FanoutRequest {
        tasks,
        handoff_file,
        max_concurrency,
        fail_fast: raw.parallel_fail_fast,
        debug: raw.debug,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workspace_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn single_call_requires_prompt() {
        let ws = workspace_dir();
        let args = json!({"prompt": "  ", "workspace": ws.path().to_str().unwrap(), "handoff_file": "out.txt"});
        assert!(parse_single_call(AgentKind::Claude, args).is_err());
    }

    #[test]
    fn single_call_requires_existing_workspace() {
        let args = json!({"prompt": "hi", "workspace": "/no/such/dir", "handoff_file": "out.txt"});
        assert!(parse_single_call(AgentKind::Claude, args).is_err());
    }

    #[test]
    fn single_call_parses_happy_path() {
        let ws = workspace_dir();
        let args = json!({
            "prompt": "hello",
            "workspace": ws.path().to_str().unwrap(),
            "handoff_file": "out.txt",
            "permission": "workspace-write",
        });
        let req = parse_single_call(AgentKind::Claude, args).unwrap();
        assert_eq!(req.run_params.prompt, "hello");
        assert_eq!(req.run_params.permission, Permission::WorkspaceWrite);
        assert_eq!(req.handoff_file, ws.path().join("out.txt"));
    }

    #[test]
    fn fanout_requires_matching_note_lengths() {
        let ws = workspace_dir();
        let args = json!({
            "workspace": ws.path().to_str().unwrap(),
            "handoff_file": "out.txt",
            "parallel_prompts": ["a", "b"],
            "parallel_task_notes": ["only one"],
        });
        assert!(parse_fanout_call(AgentKind::Codex, args).is_err());
    }

    #[test]
    fn fanout_clamps_max_concurrency() {
        let ws = workspace_dir();
        let args = json!({
            "workspace": ws.path().to_str().unwrap(),
            "handoff_file": "out.txt",
            "parallel_prompts": ["a"],
            "parallel_task_notes": ["note"],
            "parallel_max_concurrency": 9999,
        });
        let req = parse_fanout_call(AgentKind::Codex, args).unwrap();
        assert_eq!(req.max_concurrency, 100);
    }

    #[test]
    fn fanout_broadcasts_single_model_to_every_task() {
        let ws = workspace_dir();
        let args = json!({
            "workspace": ws.path().to_str().unwrap(),
            "handoff_file": "out.txt",
            "parallel_prompts": ["a", "b"],
            "parallel_task_notes": ["n1", "n2"],
            "model": ["gpt-5"],
        });
        let req = parse_fanout_call(AgentKind::Codex, args).unwrap();
        assert_eq!(req.tasks[0].run_params.model.as_deref(), Some("gpt-5"));
        assert_eq!(req.tasks[1].run_params.model.as_deref(), Some("gpt-5"));
    }

    #[test]
    fn fanout_rejects_mismatched_model_count() {
        let ws = workspace_dir();
        let args = json!({
            "workspace": ws.path().to_str().unwrap(),
            "handoff_file": "out.txt",
            "parallel_prompts": ["a", "b", "c"],
            "parallel_task_notes": ["n1", "n2", "n3"],
            "model": ["m1", "m2"],
        });
        assert!(parse_fanout_call(AgentKind::Codex, args).is_err());
    }
}
