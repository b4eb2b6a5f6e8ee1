use broker_model::UnifiedEvent;
use serde_json::Value;

/// Turns one agent's native JSONL dialect into [`UnifiedEvent`]s.
///
/// A parser is stateful: it caches `operation_id -> name` correlations (so a
/// later `_output`/`result` line can be matched back to the call that opened
/// it) and remembers the session id and model once it has seen them. One
/// instance is created per run and dropped at the end of it.
pub trait AgentParser: Send {
    /// Parse one decoded JSON line. A single native line can fan out into
    /// zero, one, or several `UnifiedEvent`s (codex's `item.*` lines in
    /// particular can carry more than one reportable occurrence).
    fn parse_line(&mut self, raw: &Value) -> Vec<UnifiedEvent>;

    /// The session id this run is operating under, once discovered. `None`
    /// until the dialect-specific "session started" line has been seen.
    fn session_id(&self) -> Option<&str>;

    /// Subclass hook: lets a dialect flag an error even after a zero exit
    /// code. `opencode` in particular sometimes prints a traceback to
    /// stdout and exits cleanly; everyone else accepts the default `None`.
    ///
    /// `non_json_stdout` carries the stdout lines the run produced that
    /// could not be parsed as the dialect's JSONL (opencode's tracebacks
    /// are plain text, not JSON, so they never reach `parse_line`).
    fn check_execution_errors(&self, non_json_stdout: &[String]) -> Option<String> {
        let _ = non_json_stdout;
        None
    }
}
