//! The Invoker (C3): orchestrates one agent run end to end — builds argv,
//! pumps lines from the process runner through the agent's parser,
//! aggregates the final answer, and classifies the outcome.

use std::collections::HashMap;

use broker_agents::{argv_builder, new_parser, RunParams};
use broker_model::{AgentKind, ContentType, EventKind, OperationType, Role, Severity, UnifiedEvent};
use tokio::sync::mpsc::UnboundedSender;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::api_errors;
use crate::context::ExecutionContext;
use crate::error::{DebugStats, ErrorKind, ExecutionResult};
use crate::fatal::is_ignorable_stdout_error;
use crate::process::{ProcessRunner, ProcessSpec};

/// Accumulates consecutive same-role/content-type deltas into one merged
/// event, flushed as soon as a different event interrupts the run.
struct PendingMerge {
    role: Role,
    content_type: ContentType,
    text: String,
    source: AgentKind,
    session_id: Option<String>,
    last_raw: serde_json::Value,
}

impl PendingMerge {
    fn into_event(self) -> UnifiedEvent {
        UnifiedEvent::new(
            self.source,
            self.session_id,
            self.last_raw,
            EventKind::Message {
                content_type: self.content_type,
                role: self.role,
                text: self.text,
                is_delta: false,
            },
        )
    }
}

/// The number of trailing stderr lines folded into an `exit_error`'s tail
/// when the child exits non-zero without a fatal match.
const EXIT_ERROR_TAIL_LINES: usize = 20;

#[derive(Clone, Copy)]
pub struct Invoker {
    kind: AgentKind,
    runner: ProcessRunner,
}

impl Invoker {
    pub fn new(kind: AgentKind) -> Self {
        Invoker { kind, runner: ProcessRunner::default() }
    }

    /// Runs one agent call to completion, sending every normalised event to
    /// `events_tx` (if present) as it is produced.
    pub async fn execute(
        &self,
        params: RunParams,
        cancel: CancellationToken,
        events_tx: Option<UnboundedSender<UnifiedEvent>>,
    ) -> ExecutionResult {
        if let Err(msg) = Self::validate(&params) {
            return ExecutionResult::failure(ErrorKind::Validation(msg), None, Vec::new());
        }

        let builder = argv_builder(self.kind);
        let args = match builder.build_args(&params) {
            Ok(args) => args,
            Err(msg) => return ExecutionResult::failure(ErrorKind::Validation(msg), None, Vec::new()),
        };

        Self::emit(&events_tx, UnifiedEvent::synthetic_system(self.kind, None, Severity::Info, format!("{} started", self.kind)));

        let mut argv = vec![self.kind.binary().to_string()];
        argv.extend(args);

        let env: HashMap<String, String> = builder.extra_env(&params).into_iter().collect();
        let stdin_bytes = if builder.prompt_on_stdin() { Some(params.prompt.as_bytes().to_vec()) } else { None };

        let spec = ProcessSpec { argv, cwd: params.workspace.clone(), env, stdin_bytes };

        let mut parser = new_parser(self.kind);
        let mut ctx = ExecutionContext::new();
        let mut pending: Option<PendingMerge> = None;
        let mut non_json_stdout: Vec<String> = Vec::new();
        let mut stdout_fatal: Option<String> = None;
        let fatal_cancel = cancel.clone();

        let outcome = match self
            .runner
            .run(spec, cancel.clone(), |line| {
                match serde_json::from_str::<serde_json::Value>(line) {
                    Ok(raw) => {
                        for ev in parser.parse_line(&raw) {
                            Self::handle_event(ev, &mut ctx, &mut pending, &events_tx, &mut stdout_fatal, &fatal_cancel);
                        }
                    }
                    Err(_) => non_json_stdout.push(line.to_string()),
                }
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(io_err) => {
                return ExecutionResult::failure(
                    ErrorKind::Internal(io_err.to_string()),
                    ctx.session_id.clone(),
                    ctx.thought_steps.clone(),
                );
            }
        };

        if let Some(merged) = pending.take() {
            Self::emit(&events_tx, merged.into_event());
        }

        // A stdout-stream fatal (an agent that prints a JSON error item and
        // then exits 0) cancels the run to stop the child promptly, so it
        // must be checked before the generic cancellation check below or it
        // would be misreported as a user cancellation.
        if let Some(trigger_line) = stdout_fatal {
            return ExecutionResult::failure(ErrorKind::FatalError { trigger_line }, ctx.session_id.clone(), ctx.thought_steps.clone());
        }

        if cancel.is_cancelled() {
            Self::emit(
                &events_tx,
                UnifiedEvent::synthetic_system(self.kind, ctx.session_id.clone(), Severity::Warning, "Execution cancelled by user"),
            );
            return ExecutionResult::cancelled(ctx.session_id.clone(), ctx.current_final().to_string(), ctx.thought_steps.clone());
        }

        if let Some(trigger_line) = outcome.fatal_reason {
            return ExecutionResult::failure(ErrorKind::FatalError { trigger_line }, ctx.session_id.clone(), ctx.thought_steps.clone());
        }

        let api_errors = api_errors::extract(&non_json_stdout);

        if outcome.exit_code != Some(0) {
            if !api_errors.is_empty() {
                return ExecutionResult::failure(
                    ErrorKind::ApiError(api_errors.join("\n")),
                    ctx.session_id.clone(),
                    ctx.thought_steps.clone(),
                );
            }
            let tail = Self::tail_lines(&outcome.stderr_tail, &non_json_stdout);
            return ExecutionResult::failure(
                ErrorKind::ExitError { exit_code: outcome.exit_code, tail },
                ctx.session_id.clone(),
                ctx.thought_steps.clone(),
            );
        }

        if let Some(msg) = parser.check_execution_errors(&non_json_stdout) {
            return ExecutionResult::failure(
                ErrorKind::ExitError { exit_code: outcome.exit_code, tail: msg },
                ctx.session_id.clone(),
                ctx.thought_steps.clone(),
            );
        }

        ExecutionResult {
            success: true,
            session_id: ctx.session_id.clone(),
            final_answer: ctx.current_final().to_string(),
            thought_steps: ctx.thought_steps.clone(),
            error: None,
            cancelled: false,
            captured_errors: api_errors,
            debug: DebugStats {
                model: ctx.model.clone(),
                duration_ms: ctx.duration_ms(),
                message_count: ctx.message_count,
                tool_call_count: ctx.tool_call_count,
                token_usage: ctx.token_usage.clone(),
            },
        }
    }

    /// Convenience wrapper over [`Invoker::execute`] for callers that want
    /// an event stream rather than a callback: spawns the run on the
    /// current runtime and returns its join handle alongside a stream of
    /// the events it produces.
    pub fn stream(
        &self,
        params: RunParams,
        cancel: CancellationToken,
    ) -> (tokio::task::JoinHandle<ExecutionResult>, UnboundedReceiverStream<UnifiedEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let invoker = *self;
        let handle = tokio::spawn(async move { invoker.execute(params, cancel, Some(tx)).await });
        (handle, UnboundedReceiverStream::new(rx))
    }

    fn validate(params: &RunParams) -> Result<(), String> {
        if params.prompt.trim().is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        if !params.workspace.is_dir() {
            return Err(format!("workspace does not exist or is not a directory: {}", params.workspace.display()));
        }
        Ok(())
    }

    fn emit(events_tx: &Option<UnboundedSender<UnifiedEvent>>, event: UnifiedEvent) {
        if let Some(tx) = events_tx {
            let _ = tx.send(event);
        }
    }

    fn handle_event(
        ev: UnifiedEvent,
        ctx: &mut ExecutionContext,
        pending: &mut Option<PendingMerge>,
        events_tx: &Option<UnboundedSender<UnifiedEvent>>,
        stdout_fatal: &mut Option<String>,
        fatal_cancel: &CancellationToken,
    ) {
        if let Some(session_id) = &ev.session_id {
            ctx.record_session_id(session_id);
        }

        match &ev.kind {
            EventKind::Message { content_type, role, text, is_delta } => {
                if *role == Role::Assistant && *content_type == ContentType::Text {
                    ctx.message_count += 1;
                    if *is_delta {
                        ctx.append_delta(text);
                    } else if !text.is_empty() {
                        ctx.supersede_final(text);
                    }
                }

                if *is_delta {
                    match pending {
                        Some(p) if p.role == *role && p.content_type == *content_type => {
                            p.text.push_str(text);
                            p.last_raw = ev.raw.clone();
                            p.session_id = ev.session_id.clone();
                        }
                        _ => {
                            if let Some(old) = pending.take() {
                                Self::emit(events_tx, old.into_event());
                            }
                            *pending = Some(PendingMerge {
                                role: *role,
                                content_type: *content_type,
                                text: text.clone(),
                                source: ev.source,
                                session_id: ev.session_id.clone(),
                                last_raw: ev.raw.clone(),
                            });
                        }
                    }
                } else {
                    if let Some(old) = pending.take() {
                        Self::emit(events_tx, old.into_event());
                    }
                    Self::emit(events_tx, ev);
                }
            }
            EventKind::Lifecycle { model, .. } => {
                if let Some(model) = model {
                    ctx.model = Some(model.clone());
                }
                if let Some(old) = pending.take() {
                    Self::emit(events_tx, old.into_event());
                }
                Self::emit(events_tx, ev);
            }
            EventKind::Operation { operation_type, .. } => {
                if matches!(operation_type, OperationType::Command | OperationType::Tool | OperationType::Mcp) {
                    ctx.tool_call_count += 1;
                }
                if let Some(old) = pending.take() {
                    Self::emit(events_tx, old.into_event());
                }
                Self::emit(events_tx, ev);
            }
            EventKind::System { severity, message, is_fallback } => {
                if *severity == Severity::Error && !*is_fallback && stdout_fatal.is_none() {
                    if is_ignorable_stdout_error(message) {
                        tracing::debug!(%message, "ignoring transient stdout error");
                    } else {
                        tracing::warn!(%message, "fatal error event in stdout");
                        *stdout_fatal = Some(message.clone());
                        fatal_cancel.cancel();
                    }
                }
                if let Some(old) = pending.take() {
                    Self::emit(events_tx, old.into_event());
                }
                Self::emit(events_tx, ev);
            }
        }
    }

    fn tail_lines(stderr_tail: &str, non_json_stdout: &[String]) -> String {
        let stderr_trimmed = stderr_tail.trim();
        if !stderr_trimmed.is_empty() {
            stderr_trimmed
                .lines()
                .rev()
                .take(EXIT_ERROR_TAIL_LINES)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            non_json_stdout.iter().rev().take(EXIT_ERROR_TAIL_LINES).rev().cloned().collect::<Vec<_>>().join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_prompt() {
        let params = RunParams::new("   ", std::env::temp_dir());
        assert!(Invoker::validate(&params).is_err());
    }

    #[test]
    fn validate_rejects_missing_workspace() {
        let params = RunParams::new("hello", std::path::PathBuf::from("/does/not/exist/at/all"));
        assert!(Invoker::validate(&params).is_err());
    }

    #[test]
    fn validate_accepts_well_formed_params() {
        let params = RunParams::new("hello", std::env::temp_dir());
        assert!(Invoker::validate(&params).is_ok());
    }

    #[test]
    fn tail_lines_prefers_stderr_over_stdout() {
        let tail = Invoker::tail_lines("stderr line\n", &["stdout fallback".to_string()]);
        assert_eq!(tail, "stderr line");
    }

    #[test]
    fn tail_lines_falls_back_to_stdout_when_stderr_empty() {
        let tail = Invoker::tail_lines("", &["stdout fallback".to_string()]);
        assert_eq!(tail, "stdout fallback");
    }

    fn system_error_event(message: &str) -> UnifiedEvent {
        UnifiedEvent::new(
            AgentKind::Codex,
            None,
            serde_json::Value::Null,
            EventKind::System { severity: Severity::Error, message: message.to_string(), is_fallback: false },
        )
    }

    #[test]
    fn non_ignorable_stdout_error_sets_fatal_and_cancels() {
        let mut ctx = ExecutionContext::new();
        let mut pending = None;
        let mut stdout_fatal = None;
        let cancel = CancellationToken::new();

        Invoker::handle_event(system_error_event("tool crashed with a null pointer"), &mut ctx, &mut pending, &None, &mut stdout_fatal, &cancel);

        assert_eq!(stdout_fatal.as_deref(), Some("tool crashed with a null pointer"));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn ignorable_stdout_error_does_not_set_fatal() {
        let mut ctx = ExecutionContext::new();
        let mut pending = None;
        let mut stdout_fatal = None;
        let cancel = CancellationToken::new();

        Invoker::handle_event(system_error_event("reconnecting, rate limit hit (429)"), &mut ctx, &mut pending, &None, &mut stdout_fatal, &cancel);

        assert!(stdout_fatal.is_none());
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn second_fatal_stdout_error_does_not_overwrite_the_first() {
        let mut ctx = ExecutionContext::new();
        let mut pending = None;
        let mut stdout_fatal = None;
        let cancel = CancellationToken::new();

        Invoker::handle_event(system_error_event("first fatal"), &mut ctx, &mut pending, &None, &mut stdout_fatal, &cancel);
        Invoker::handle_event(system_error_event("second fatal"), &mut ctx, &mut pending, &None, &mut stdout_fatal, &cancel);

        assert_eq!(stdout_fatal.as_deref(), Some("first fatal"));
    }
}
