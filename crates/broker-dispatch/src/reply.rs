//! Formats an `ExecutionResult` into the plain-text reply handed back to
//! the MCP client. This is a deliberately simple formatter, not a
//! translation of any original response-prettifier — that layer is out of
//! scope here, only the data a caller needs to act on matters.

use broker_runtime::{ErrorKind, ExecutionResult};

pub struct ToolReply {
    pub text: String,
    pub is_error: bool,
}

pub fn format_reply(result: &ExecutionResult, debug: bool) -> ToolReply {
    let mut out = String::new();

    if let Some(session_id) = &result.session_id {
        out.push_str(&format!("continuation_id: {session_id}\n\n"));
    }

    if result.cancelled {
        out.push_str("Execution was cancelled.\n");
        if !result.final_answer.is_empty() {
            out.push_str(&format!("\nPartial answer:\n{}\n", result.final_answer));
        }
    } else if result.success {
        out.push_str(&result.final_answer);
        if !result.captured_errors.is_empty() {
            out.push_str("\n\nNon-fatal errors captured during the run:\n");
            for err in &result.captured_errors {
                out.push_str(&format!("- {err}\n"));
            }
        }
    } else {
        out.push_str("Execution failed.\n");
        if let Some(err) = &result.error {
            out.push_str(&format!("\n{}\n", describe_error(err)));
        }
        if !result.thought_steps.is_empty() {
            out.push_str("\nThought steps so far:\n");
            for step in &result.thought_steps {
                out.push_str(&format!("- {step}\n"));
            }
        }
    }

    if debug {
        out.push_str(&format!(
            "\n---\nmodel={:?} duration_ms={} messages={} tool_calls={}\n",
            result.debug.model, result.debug.duration_ms, result.debug.message_count, result.debug.tool_call_count
        ));
    }

    ToolReply { text: out, is_error: !result.success && !result.cancelled }
}

fn describe_error(error: &ErrorKind) -> String {
    match error {
        ErrorKind::Validation(msg) => format!("Validation error: {msg}"),
        ErrorKind::ExitError { exit_code, tail } => format!("Process exited with code {exit_code:?}:\n{tail}"),
        ErrorKind::FatalError { trigger_line } => format!("Fatal error detected: {trigger_line}"),
        ErrorKind::ApiError(msg) => format!("API error: {msg}"),
        ErrorKind::Cancelled => "Cancelled.".to_string(),
        ErrorKind::Internal(msg) => format!("Internal error: {msg}"),
    }
}

/// The status attribute a run's transcript record carries.
pub fn transcript_status(result: &ExecutionResult) -> &'static str {
    if result.success {
        "success"
    } else {
        "error"
    }
}
