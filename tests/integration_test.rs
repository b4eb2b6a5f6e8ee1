//! End-to-end tests across the public crate boundaries: configuration,
//! the request registry, and the dispatcher's bookkeeping around a
//! single and a fan-out call. None of these spawn a real `claude`/
//! `codex`/`gemini`/`opencode` binary (none is installed in this
//! environment) — the invoker will fail to launch the child, so these
//! assert the guarantees that must hold regardless of that failure:
//! registry cleanup, transcript ordering, and config parsing never
//! panicking.

use std::collections::HashMap;
use std::sync::Arc;

use broker_config::Config;
use broker_dispatch::Dispatcher;
use broker_runtime::RequestRegistry;
use serde_json::json;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

// ── Config (C9) never panics on garbage, and disable wins over enable ──────

#[test]
fn config_from_env_never_panics_on_garbage() {
    let cfg = Config::from_map(&env(&[
        ("TASKBROKER_SIGINT_MODE", "not-a-mode"),
        ("TASKBROKER_GUI_PORT", "not-a-port"),
        ("TASKBROKER_GUI_GRACE_PERIOD_SECS", "not-a-number"),
        ("TASKBROKER_SIGINT_DOUBLE_TAP_WINDOW", "-5"),
    ]));
    assert_eq!(cfg.gui_port, 0);
    assert!(cfg.sigint_double_tap_window >= 0.1 && cfg.sigint_double_tap_window <= 10.0);
}

#[test]
fn disable_wins_when_a_name_is_in_both_lists() {
    let cfg = Config::from_map(&env(&[("TASKBROKER_ENABLE", "claude,codex"), ("TASKBROKER_DISABLE", "claude")]));
    assert!(!cfg.is_tool_enabled("claude"));
    assert!(cfg.is_tool_enabled("codex"));
}

// ── Request Registry (C4): register/unregister round-trips ────────────────

#[test]
fn unregister_after_register_restores_empty_state() {
    let registry = RequestRegistry::new();
    let token = tokio_util::sync::CancellationToken::new();
    registry.register("r1".to_string(), broker_model::AgentKind::Claude, token, None).unwrap();
    assert_eq!(registry.active_count(), 1);

    registry.unregister("r1");
    assert_eq!(registry.active_count(), 0);
    assert!(!registry.has_active());
}

#[test]
fn double_cancel_of_the_same_request_is_a_no_op() {
    let registry = RequestRegistry::new();
    let token = tokio_util::sync::CancellationToken::new();
    registry.register("r1".to_string(), broker_model::AgentKind::Codex, token.clone(), None).unwrap();

    assert!(registry.cancel("r1"));
    assert!(token.is_cancelled());

    // Cancelling an already-cancelled token a second time changes nothing.
    assert!(registry.cancel("r1"));
    assert!(token.is_cancelled());
}

// ── Dispatcher (C6): full call_tool path without a real child binary ──────

#[tokio::test]
async fn single_call_writes_transcript_and_leaves_registry_empty() {
    let ws = tempfile::tempdir().unwrap();
    let handoff = ws.path().join("handoff.txt");
    let registry = Arc::new(RequestRegistry::new());
    let dispatcher = Dispatcher::new(Config::default(), Arc::clone(&registry));

    let args = json!({
        "prompt": "say hi",
        "workspace": ws.path().to_str().unwrap(),
        "handoff_file": handoff.to_str().unwrap(),
    });
    let _reply = dispatcher.call_tool("claude", args, None).await;

    assert_eq!(registry.active_count(), 0);
    let transcript = tokio::fs::read_to_string(&handoff).await.unwrap();
    assert!(transcript.contains("<agent-output"));
    assert!(transcript.contains("say hi"));
}

#[tokio::test]
async fn fanout_call_orders_blocks_by_task_index() {
    let ws = tempfile::tempdir().unwrap();
    let handoff = ws.path().join("handoff.txt");
    let registry = Arc::new(RequestRegistry::new());
    let dispatcher = Dispatcher::new(Config::default(), Arc::clone(&registry));

    let args = json!({
        "workspace": ws.path().to_str().unwrap(),
        "handoff_file": handoff.to_str().unwrap(),
        "parallel_prompts": ["first task", "second task", "third task"],
        "parallel_task_notes": ["n1", "n2", "n3"],
        "parallel_max_concurrency": 3,
    });
    let reply = dispatcher.call_tool("claude_parallel", args, None).await;
    assert!(reply.text.contains("of 3"));

    assert_eq!(registry.active_count(), 0);
    let transcript = tokio::fs::read_to_string(&handoff).await.unwrap();
    let first = transcript.find("first task");
    let second = transcript.find("second task");
    let third = transcript.find("third task");
    if let (Some(a), Some(b), Some(c)) = (first, second, third) {
        assert!(a < b && b < c, "transcript blocks must stay in input-index order");
    }
}

#[tokio::test]
async fn unknown_tool_name_is_rejected_without_touching_the_registry() {
    let registry = Arc::new(RequestRegistry::new());
    let dispatcher = Dispatcher::new(Config::default(), Arc::clone(&registry));

    let reply = dispatcher.call_tool("not_a_real_tool", json!({}), None).await;
    assert!(reply.is_error);
    assert_eq!(registry.active_count(), 0);
}

#[tokio::test]
async fn disabled_tool_is_rejected_by_config_allow_deny_lists() {
    let mut config = Config::default();
    config.disable = vec!["gemini".to_string()];
    let registry = Arc::new(RequestRegistry::new());
    let dispatcher = Dispatcher::new(config, registry);

    let reply = dispatcher.call_tool("gemini", json!({}), None).await;
    assert!(reply.is_error);
    assert!(reply.text.contains("disabled"));
}

#[test]
fn list_tools_respects_enable_list() {
    let mut config = Config::default();
    config.enable = vec!["claude".to_string()];
    let registry = Arc::new(RequestRegistry::new());
    let dispatcher = Dispatcher::new(config, registry);

    let names: Vec<String> = dispatcher.list_tools().into_iter().map(|s| s.name).collect();
    assert!(names.contains(&"claude".to_string()));
    assert!(names.contains(&"claude_parallel".to_string()));
    assert!(!names.contains(&"codex".to_string()));
    assert!(names.contains(&"get_gui_url".to_string()));
}
