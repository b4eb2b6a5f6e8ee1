//! The single-call dispatch path (§4.6 steps 1-8): validate, inject prompt
//! suffixes, register with the request registry, run the invoker, append
//! the transcript, and format the reply. Transcript writing and
//! unregistration always happen, even when the run was cancelled.

use std::sync::Arc;

use broker_model::AgentKind;
use broker_runtime::{Invoker, RequestRegistry};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::heartbeat::{Heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
use crate::injection::{inject_context_and_report_mode, inject_handoff_hint};
use crate::params::SingleCallRequest;
use crate::reply::{format_reply, transcript_status, ToolReply};
use crate::transcript::{append_block, build_wrapper};

/// Runs one single-call tool invocation end to end.
pub async fn dispatch_single(
    kind: AgentKind,
    mut request: SingleCallRequest,
    registry: Arc<RequestRegistry>,
    events_tx: Option<tokio::sync::mpsc::UnboundedSender<broker_model::UnifiedEvent>>,
) -> ToolReply {
    let original_prompt = request.run_params.prompt.clone();

    let handoff_file_str = request.handoff_file.display().to_string();
    request.run_params.prompt = inject_handoff_hint(&request.run_params.prompt, &handoff_file_str);
    request.run_params.prompt =
        inject_context_and_report_mode(&request.run_params.prompt, &request.context_paths, request.report_mode);

    let request_id = Uuid::new_v4().to_string();
    let cancel = CancellationToken::new();
    if registry.register(request_id.clone(), kind, cancel.clone(), request.task_note.clone()).is_err() {
        return ToolReply { text: "Internal error: duplicate request id".to_string(), is_error: true };
    }

    let heartbeat_label = format!("{} {}", kind.tool_name(), request_id);
    let heartbeat = Heartbeat::spawn(DEFAULT_HEARTBEAT_INTERVAL, move || {
        tracing::info!(request = %heartbeat_label, "run still in progress");
    });

    let invoker = Invoker::new(kind);
    let result = invoker.execute(request.run_params, cancel, events_tx).await;
    drop(heartbeat);

    let wrapped = build_wrapper(
        kind.tool_name(),
        result.session_id.as_deref().unwrap_or(""),
        request.task_note.as_deref().unwrap_or(""),
        0,
        transcript_status(&result),
        &original_prompt,
        if result.success { &result.final_answer } else { result.error.as_ref().map(|e| e.to_string()).as_deref().unwrap_or("") },
    );

    if let Err(e) = append_block(&request.handoff_file, &wrapped).await {
        tracing::warn!(path = %request.handoff_file.display(), error = %e, "failed to append handoff transcript");
    }

    registry.unregister(&request_id);

    format_reply(&result, request.debug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::parse_single_call;
    use serde_json::json;

    #[tokio::test]
    async fn dispatch_single_appends_transcript_and_unregisters() {
        let ws = tempfile::tempdir().unwrap();
        let handoff = ws.path().join("handoff.txt");
        let args = json!({
            "prompt": "say hi",
            "workspace": ws.path().to_str().unwrap(),
            "handoff_file": handoff.to_str().unwrap(),
        });
        let request = parse_single_call(AgentKind::Claude, args).unwrap();
        let registry = Arc::new(RequestRegistry::new());

        // No real `claude` binary is available in this environment, so the
        // invoker will fail to spawn; we only assert the bookkeeping (the
        // transcript write and registry cleanup) always runs regardless.
        let reply = dispatch_single(AgentKind::Claude, request, Arc::clone(&registry), None).await;

        assert_eq!(registry.active_count(), 0);
        assert!(tokio::fs::metadata(&handoff).await.is_ok());
        let _ = reply;
    }
}
