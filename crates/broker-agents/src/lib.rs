//! Per-agent knowledge: how to build an argv for each [`AgentKind`], and how
//! to parse each agent's native JSONL dialect into [`UnifiedEvent`]s.
//!
//! Everything kind-specific lives in one module per agent (`claude`,
//! `codex`, `gemini`, `opencode`); the rest of the workspace only ever
//! touches the two traits in [`argv`] and [`parser`] plus the lookup
//! functions in this root module.

pub mod argv;
mod claude;
pub mod classify;
mod codex;
pub mod detect;
mod gemini;
mod opencode;
pub mod params;
pub mod parser;

pub use argv::ArgvBuilder;
pub use params::RunParams;
pub use parser::AgentParser;

use broker_model::AgentKind;

/// The stateless argv builder for a kind. Builders hold no per-run state,
/// so a single static reference is handed out rather than a fresh `Box`.
pub fn argv_builder(kind: AgentKind) -> &'static dyn ArgvBuilder {
    match kind {
        AgentKind::Claude => &claude::ClaudeArgv,
        AgentKind::Codex => &codex::CodexArgv,
        AgentKind::Gemini => &gemini::GeminiArgv,
        AgentKind::Opencode => &opencode::OpencodeArgv,
    }
}

/// A fresh, stateful parser for one run of the given kind. Parsers cache
/// operation-id/name correlations internally, so a new instance is required
/// per run — see [`broker_model::UnifiedEvent`]'s single-owner invariant.
pub fn new_parser(kind: AgentKind) -> Box<dyn AgentParser> {
    match kind {
        AgentKind::Claude => Box::new(claude::ClaudeParser::new()),
        AgentKind::Codex => Box::new(codex::CodexParser::new()),
        AgentKind::Gemini => Box::new(gemini::GeminiParser::new()),
        AgentKind::Opencode => Box::new(opencode::OpencodeParser::new()),
    }
}
