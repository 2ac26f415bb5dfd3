//! Request/response layer.
//!
//! Correlates outgoing calls with their responses by ID and dispatches
//! incoming requests to registered handlers, in both directions over a single
//! [`MessageChannel`](crate::channel::MessageChannel).
//!
//! # Module Structure
//!
//! - `endpoint` - channel owner, dispatcher task and [`Caller`]
//! - `handlers` - method name to async handler map
//! - `peer` - local or remote call-side handle
//! - `router` - pending call table

mod endpoint;
mod handlers;
mod peer;
mod router;

pub use endpoint::{Caller, Endpoint, ServedCall};
pub use handlers::{HandlerFuture, Handlers, single_argument};
pub use peer::{LocalPeer, Peer};
