use broker_model::AgentKind;

use crate::params::RunParams;

/// Builds the argv (and, where needed, extra environment) for one agent
/// kind. Builders are stateless — the same instance is reused across every
/// run of that kind, since all the per-run data lives in [`RunParams`].
pub trait ArgvBuilder: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// The child's argv, *excluding* argv[0] (the binary itself — see
    /// [`AgentKind::binary`]).
    fn build_args(&self, params: &RunParams) -> Result<Vec<String>, String>;

    /// Extra environment variables to set on top of the inherited
    /// environment. Most kinds need nothing here.
    fn extra_env(&self, _params: &RunParams) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Whether the prompt goes on stdin rather than as a positional arg.
    fn prompt_on_stdin(&self) -> bool {
        self.kind().prompt_on_stdin()
    }
}
