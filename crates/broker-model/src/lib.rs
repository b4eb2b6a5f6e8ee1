//! Shared types for the broker: the closed set of agent kinds, the
//! permission enum, and the unified event model every parser emits into.
//!
//! Nothing in this crate spawns a process or touches the filesystem; it
//! exists so `broker-agents`, `broker-runtime`, `broker-dispatch` and
//! `broker-bus` can all agree on the same vocabulary without depending on
//! each other.

mod agent;
mod event;
mod request;

pub use agent::{AgentKind, Permission};
pub use event::{
    ContentType, LifecycleType, OperationType, Role, Severity, Status, UnifiedEvent,
};
pub use request::RequestInfo;
