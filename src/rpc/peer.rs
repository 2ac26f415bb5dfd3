//! Call-side handle to the other end of a task, wherever it runs.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::endpoint::Caller;
use super::handlers::Handlers;
use crate::error::{RpcError, RpcResult};

/// The other end of a task conversation.
///
/// `Remote` goes through a channel; `Local` invokes handlers living in this
/// process directly. Both are asynchronous and fail the same way.
#[derive(Clone, Debug)]
pub enum Peer {
    Remote(Caller),
    Local(LocalPeer),
}

impl Peer {
    pub fn local(handlers: Handlers) -> Self {
        Peer::Local(LocalPeer::new(handlers))
    }

    pub async fn call(&self, method: &str, args: Vec<Value>) -> RpcResult<Value> {
        match self {
            Peer::Remote(caller) => caller.call(method, args).await,
            Peer::Local(local) => local.call(method, args).await,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Peer::Local(_))
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Peer::Remote(caller) => caller.is_closed(),
            Peer::Local(local) => local.is_closed(),
        }
    }
}

/// Handlers in this process, called as if they were remote.
#[derive(Clone)]
pub struct LocalPeer {
    handlers: Arc<Handlers>,
    /// Cancelled on close; fails new and in-flight calls alike
    closed: CancellationToken,
}

impl fmt::Debug for LocalPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPeer")
            .field("handlers", &self.handlers)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LocalPeer {
    pub fn new(handlers: Handlers) -> Self {
        Self {
            handlers: Arc::new(handlers),
            closed: CancellationToken::new(),
        }
    }

    /// Invoke a handler on a later scheduler turn.
    ///
    /// Faults surface as [`RpcError::Remote`], exactly as over a channel.
    /// Closing the peer fails the call with [`RpcError::ChannelClosed`], even
    /// while its handler is still running.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> RpcResult<Value> {
        if self.is_closed() {
            return Err(RpcError::ChannelClosed);
        }
        tokio::task::yield_now().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(RpcError::ChannelClosed),
            outcome = self.handlers.invoke(method, args) => outcome.map_err(RpcError::Remote),
        }
    }

    /// Refuse further calls and fail those in flight. Shared by every clone.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
