//! Per-request execution state, owned exclusively by one [`crate::invoker::Invoker`]
//! call for the duration of one run. Reusing an Invoker for a second run
//! requires constructing a fresh context — contexts are never shared
//! across runs.

use std::time::Instant;

use serde_json::Value;

/// Maintains the "current final answer" buffer and the superseded-answer
/// history, per the delta-merging/aggregation rule: a delta message
/// appends to the buffer; a non-delta message with text supersedes it,
/// pushing the old buffer into `thought_steps`.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    pub session_id: Option<String>,
    pub model: Option<String>,
    current_final: String,
    pub thought_steps: Vec<String>,
    pub exit_error: Option<String>,
    pub tool_call_count: usize,
    pub message_count: usize,
    pub token_usage: Option<Value>,
    started_at: Option<Instant>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        ExecutionContext {
            started_at: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_session_id(&mut self, id: &str) {
        if self.session_id.is_none() {
            self.session_id = Some(id.to_string());
        }
    }

    /// Appends to the current final answer (assistant delta).
    pub fn append_delta(&mut self, text: &str) {
        self.current_final.push_str(text);
    }

    /// A non-delta assistant message with text: push the old buffer into
    /// `thought_steps` and start a fresh current final.
    pub fn supersede_final(&mut self, text: &str) {
        if !self.current_final.is_empty() {
            self.thought_steps.push(std::mem::take(&mut self.current_final));
        }
        self.current_final = text.to_string();
    }

    pub fn current_final(&self) -> &str {
        &self.current_final
    }

    pub fn duration_ms(&self) -> u128 {
        self.started_at.map(|s| s.elapsed().as_millis()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_recorded_once() {
        let mut ctx = ExecutionContext::new();
        ctx.record_session_id("first");
        ctx.record_session_id("second");
        assert_eq!(ctx.session_id.as_deref(), Some("first"));
    }

    #[test]
    fn supersede_pushes_old_final_into_thought_steps() {
        let mut ctx = ExecutionContext::new();
        ctx.append_delta("partial answer");
        ctx.supersede_final("final answer");
        assert_eq!(ctx.thought_steps, vec!["partial answer".to_string()]);
        assert_eq!(ctx.current_final(), "final answer");
    }

    #[test]
    fn supersede_with_empty_buffer_pushes_nothing() {
        let mut ctx = ExecutionContext::new();
        ctx.supersede_final("first answer");
        assert!(ctx.thought_steps.is_empty());
        assert_eq!(ctx.current_final(), "first answer");
    }
}
