//! Pending call table.
//!
//! Tracks in-flight requests and delivers each response or error to the
//! caller that issued it, via a oneshot channel per request:
//! - Before sending a request, `register(id)` to get a oneshot Receiver
//! - The dispatcher calls `route(id, outcome)` when a response arrives
//! - The caller awaits the Receiver without holding any lock

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{RpcError, RpcResult};
use crate::protocol::RequestId;

pub(crate) type CallOutcome = RpcResult<Value>;

/// Routes responses to pending requests via oneshot channels.
pub(crate) struct ResponseRouter {
    pending: DashMap<RequestId, oneshot::Sender<CallOutcome>>,
    /// Set once the channel has ended; no further registrations are accepted.
    closed: AtomicBool,
}

impl ResponseRouter {
    pub(crate) fn new() -> Self {
        Self {
            pending: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a pending request and return a receiver for its outcome.
    ///
    /// Must be called before sending the request so the response can be
    /// routed whenever it arrives. Fails with `ChannelClosed` once the
    /// router has been failed, and with a protocol error for a duplicate ID.
    pub(crate) fn register(&self, id: RequestId) -> RpcResult<oneshot::Receiver<CallOutcome>> {
        if self.is_closed() {
            return Err(RpcError::ChannelClosed);
        }

        let (tx, rx) = oneshot::channel();
        match self.pending.entry(id) {
            Entry::Occupied(_) => {
                return Err(RpcError::protocol(format!("duplicate request id {}", id)));
            }
            Entry::Vacant(entry) => {
                entry.insert(tx);
            }
        }

        // fail_all may have drained the table between the check above and the
        // insert; never leave a waiter behind in a closed router.
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(RpcError::ChannelClosed);
        }
        Ok(rx)
    }

    /// Deliver an outcome to the waiter for `id`.
    ///
    /// Returns `true` if a waiter received it, `false` for unknown IDs or
    /// waiters that already gave up.
    pub(crate) fn route(&self, id: RequestId, outcome: CallOutcome) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Remove a pending request without delivering anything.
    pub(crate) fn remove(&self, id: RequestId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Fail every pending request with `ChannelClosed` and refuse new ones.
    pub(crate) fn fail_all(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let ids: Vec<RequestId> = self.pending.iter().map(|entry| *entry.key()).collect();
        if !ids.is_empty() {
            log::debug!(
                target: "taskbridge::rpc",
                "Failing {} pending call(s): channel closed",
                ids.len()
            );
        }
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(RpcError::ChannelClosed));
            }
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
