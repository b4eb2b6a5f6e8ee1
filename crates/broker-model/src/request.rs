use chrono::{DateTime, Utc};

use crate::agent::AgentKind;

/// What the Request Registry knows about one in-flight call. The cancel
/// handle itself is generic over whatever cancellation primitive the
/// runtime crate uses, so this type stays free of a `tokio_util` dependency.
#[derive(Debug, Clone)]
pub struct RequestInfo<C> {
    pub request_id: String,
    pub agent_kind: AgentKind,
    pub cancel_handle: C,
    pub created_at: DateTime<Utc>,
    pub task_note: Option<String>,
}

impl<C> RequestInfo<C> {
    pub fn new(
        request_id: impl Into<String>,
        agent_kind: AgentKind,
        cancel_handle: C,
        task_note: Option<String>,
    ) -> Self {
        RequestInfo {
            request_id: request_id.into(),
            agent_kind,
            cancel_handle,
            created_at: Utc::now(),
            task_note,
        }
    }
}
