//! The Dispatcher (C6) and Fan-out Coordinator (C8): top-level tool-call
//! entry, argument validation and schema generation, single and fan-out
//! execution, and handoff transcript writing.

mod dispatcher;
mod fanout;
mod heartbeat;
mod injection;
mod params;
mod reply;
mod schema;
mod single;
mod transcript;

pub use dispatcher::Dispatcher;
pub use fanout::{dispatch_fanout, FanoutOutcome};
pub use heartbeat::{Heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
pub use params::{parse_fanout_call, parse_single_call, FanoutRequest, FanoutTask, SingleCallRequest};
pub use reply::{format_reply, transcript_status, ToolReply};
pub use schema::{all_schemas, build_schema, gui_url_schema, ToolSchema};
pub use single::dispatch_single;
pub use transcript::{append_block, build_wrapper, resolve_path, xml_escape_attr};
