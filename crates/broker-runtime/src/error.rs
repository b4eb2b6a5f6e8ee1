//! The run-local error taxonomy. Every variant carries its own structured
//! data rather than a bare string, so call sites match on kind instead of
//! parsing messages.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("child exited with code {exit_code:?}")]
    ExitError { exit_code: Option<i32>, tail: String },

    #[error("fatal error: {trigger_line}")]
    FatalError { trigger_line: String },

    #[error("api error: {0}")]
    ApiError(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

/// The outcome of one [`crate::invoker::Invoker::execute`] call.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub session_id: Option<String>,
    pub final_answer: String,
    pub thought_steps: Vec<String>,
    pub error: Option<ErrorKind>,
    pub cancelled: bool,
    /// Non-fatal `api_error` lines seen on stdout during a run that still
    /// exited cleanly — surfaced as warnings rather than a failure.
    pub captured_errors: Vec<String>,
    pub debug: DebugStats,
}

#[derive(Debug, Clone, Default)]
pub struct DebugStats {
    pub model: Option<String>,
    pub duration_ms: u128,
    pub message_count: usize,
    pub tool_call_count: usize,
    pub token_usage: Option<serde_json::Value>,
}

impl ExecutionResult {
    pub fn failure(error: ErrorKind, session_id: Option<String>, thought_steps: Vec<String>) -> Self {
        ExecutionResult {
            success: false,
            session_id,
            final_answer: String::new(),
            thought_steps,
            error: Some(error),
            cancelled: false,
            captured_errors: Vec::new(),
            debug: DebugStats::default(),
        }
    }

    pub fn cancelled(session_id: Option<String>, final_answer: String, thought_steps: Vec<String>) -> Self {
        ExecutionResult {
            success: false,
            session_id,
            final_answer,
            thought_steps,
            error: Some(ErrorKind::Cancelled),
            cancelled: true,
            captured_errors: Vec::new(),
            debug: DebugStats::default(),
        }
    }
}
