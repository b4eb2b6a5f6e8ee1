//! Process isolation, fatal-stderr detection, and the per-request invoker:
//! the layer that actually runs an agent CLI and turns its output into
//! [`broker_model::UnifiedEvent`]s.

mod api_errors;
mod context;
mod error;
mod fatal;
mod invoker;
mod process;
mod registry;

pub use context::ExecutionContext;
pub use error::{DebugStats, ErrorKind, ExecutionResult};
pub use fatal::FatalDetector;
pub use invoker::Invoker;
pub use process::{ProcessOutcome, ProcessRunner, ProcessSpec};
pub use registry::RequestRegistry;
