//! Wire protocol for task RPC.
//!
//! - `message` - tagged request/response/error messages
//! - `request_id` - correlation IDs
//! - `framing` - `Content-Length` framing over byte streams

mod framing;
mod message;
mod request_id;

pub(crate) use framing::{read_frame, write_frame};
pub use message::{Message, MessageTag};
pub use request_id::RequestId;

/// Producer method a task calls once its own setup has completed.
pub const READY: &str = "ready";

/// Consumer method the host calls to shut a task down.
pub const TEARDOWN: &str = "teardown";
