//! The Fan-out Coordinator (C8): bounded-concurrency scheduling for N
//! independent agent invocations, an optional fail-fast latch, ordered
//! result collection, and a single atomic transcript append.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use broker_model::AgentKind;
use broker_runtime::{ExecutionResult, Invoker, RequestRegistry};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::heartbeat::{Heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
use crate::params::FanoutRequest;
use crate::reply::transcript_status;
use crate::transcript::{append_block, build_wrapper};

/// The outcome of one fan-out task, in input order once the batch settles.
pub enum FanoutOutcome {
    Completed { index: usize, task_note: String, prompt: String, result: ExecutionResult },
    Skipped { index: usize, task_note: String },
}

/// Runs every task in `request` with bounded concurrency, honoring
/// fail-fast, then writes one transcript block per non-skipped task as a
/// single atomic append and returns a summary reply.
pub async fn dispatch_fanout(
    kind: AgentKind,
    request: FanoutRequest,
    registry: Arc<RequestRegistry>,
    on_progress: Option<Arc<dyn Fn(usize, usize) + Send + Sync>>,
) -> crate::reply::ToolReply {
    let total = request.tasks.len();
    let semaphore = Arc::new(Semaphore::new(request.max_concurrency));
    let fail_fast_tripped = Arc::new(AtomicBool::new(false));
    let completed_count = Arc::new(AtomicUsize::new(0));
    let fail_fast = request.fail_fast;

    let heartbeat_label = kind.tool_name().to_string();
    let heartbeat_counter = Arc::clone(&completed_count);
    let heartbeat = Heartbeat::spawn(DEFAULT_HEARTBEAT_INTERVAL, move || {
        let done = heartbeat_counter.load(Ordering::SeqCst);
        tracing::info!(tool = %heartbeat_label, done, total, "fan-out still in progress");
    });

    let mut join_set = Vec::with_capacity(total);
    for task in request.tasks {
        let semaphore = Arc::clone(&semaphore);
        let fail_fast_tripped = Arc::clone(&fail_fast_tripped);
        let completed_count = Arc::clone(&completed_count);
        let registry = Arc::clone(&registry);
        let on_progress = on_progress.clone();

        join_set.push(tokio::spawn(async move {
            let permit = semaphore.acquire_owned().await.expect("semaphore closed");

            if fail_fast && fail_fast_tripped.load(Ordering::SeqCst) {
                drop(permit);
                return FanoutOutcome::Skipped { index: task.index, task_note: task.task_note };
            }

            let request_id = format!("fanout-{}", Uuid::new_v4());
            let cancel = CancellationToken::new();
            let _ = registry.register(request_id.clone(), kind, cancel.clone(), Some(task.task_note.clone()));

            let prompt = task.run_params.prompt.clone();
            let invoker = Invoker::new(kind);
            let result = invoker.execute(task.run_params, cancel, None).await;

            registry.unregister(&request_id);

            if !result.success && fail_fast {
                fail_fast_tripped.store(true, Ordering::SeqCst);
            }

            let done = completed_count.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(progress) = &on_progress {
                progress(done, total);
            }

            drop(permit);
            FanoutOutcome::Completed { index: task.index, task_note: task.task_note, prompt, result }
        }));
    }

    let mut outcomes: Vec<FanoutOutcome> = Vec::with_capacity(total);
    for handle in join_set {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(join_err) => {
                tracing::warn!(error = %join_err, "fan-out task panicked");
            }
        }
    }
    drop(heartbeat);

    outcomes.sort_by_key(|o| match o {
        FanoutOutcome::Completed { index, .. } => *index,
        FanoutOutcome::Skipped { index, .. } => *index,
    });

    let mut blocks = Vec::new();
    let mut success_count = 0usize;
    let mut failure_count = 0usize;
    let mut skipped_count = 0usize;

    for outcome in &outcomes {
        match outcome {
            FanoutOutcome::Completed { index, task_note, prompt, result } => {
                if result.success {
                    success_count += 1;
                } else {
                    failure_count += 1;
                }
                let body = if result.success {
                    result.final_answer.clone()
                } else {
                    result.error.as_ref().map(|e| e.to_string()).unwrap_or_default()
                };
                blocks.push(build_wrapper(
                    kind.tool_name(),
                    result.session_id.as_deref().unwrap_or(""),
                    task_note,
                    *index,
                    transcript_status(result),
                    prompt,
                    &body,
                ));
            }
            FanoutOutcome::Skipped { .. } => {
                skipped_count += 1;
            }
        }
    }

    if !blocks.is_empty() {
        let combined = blocks.join("\n");
        if let Err(e) = append_block(&request.handoff_file, &combined).await {
            tracing::warn!(path = %request.handoff_file.display(), error = %e, "failed to append fan-out transcript");
        }
    }

    let text = format!(
        "Fan-out complete: {success_count} succeeded, {failure_count} failed, {skipped_count} skipped (of {total}).",
    );
    crate::reply::ToolReply { text, is_error: failure_count > 0 && success_count == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::parse_fanout_call;
    use serde_json::json;

    #[tokio::test]
    async fn fanout_writes_one_block_per_completed_task() {
        let ws = tempfile::tempdir().unwrap();
        let handoff = ws.path().join("handoff.txt");
        let args = json!({
            "workspace": ws.path().to_str().unwrap(),
            "handoff_file": handoff.to_str().unwrap(),
            "parallel_prompts": ["a", "b"],
            "parallel_task_notes": ["n1", "n2"],
            "parallel_max_concurrency": 2,
        });
        let request = parse_fanout_call(AgentKind::Claude, args).unwrap();
        let registry = Arc::new(RequestRegistry::new());

        let reply = dispatch_fanout(AgentKind::Claude, request, registry, None).await;
        assert!(reply.text.contains("of 2"));
        assert!(tokio::fs::metadata(&handoff).await.is_ok());
    }

    #[tokio::test]
    async fn max_concurrency_one_runs_tasks_sequentially() {
        let ws = tempfile::tempdir().unwrap();
        let handoff = ws.path().join("handoff.txt");
        let args = json!({
            "workspace": ws.path().to_str().unwrap(),
            "handoff_file": handoff.to_str().unwrap(),
            "parallel_prompts": ["a", "b"],
            "parallel_task_notes": ["n1", "n2"],
            "parallel_max_concurrency": 1,
        });
        let request = parse_fanout_call(AgentKind::Claude, args).unwrap();
        assert_eq!(request.max_concurrency, 1);
        let registry = Arc::new(RequestRegistry::new());
        let reply = dispatch_fanout(AgentKind::Claude, request, registry, None).await;
        assert!(reply.text.contains("2"));
    }
}
