//! One side of a request/response conversation over a [`MessageChannel`].
//!
//! An `Endpoint` owns the channel and a single dispatcher task that drains
//! the channel's receive sequence:
//! - `Response`/`Error` messages complete pending calls via the router
//! - `Request` messages run their handler as a separate task, so a slow
//!   handler never blocks correlation of other traffic
//!
//! The dispatcher starts with [`Endpoint::serve`]. A [`Caller`] can be taken
//! before that, so handlers may capture a way to call back to the far end.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use serde_json::Value;
use tokio::task::{JoinHandle, JoinSet};

use super::handlers::Handlers;
use super::router::{CallOutcome, ResponseRouter};
use crate::channel::queue::{AsyncQueue, QueueConsumer};
use crate::channel::{ChannelState, MessageChannel};
use crate::error::{Fault, RpcError, RpcResult};
use crate::protocol::{Message, RequestId};

/// A request this endpoint has serviced.
#[derive(Debug, Clone, PartialEq)]
pub struct ServedCall {
    pub method: String,
    pub args: Vec<Value>,
    pub outcome: Result<Value, Fault>,
}

/// Request/response endpoint bound to one channel.
pub struct Endpoint {
    channel: Arc<MessageChannel>,
    router: Arc<ResponseRouter>,
    caller: Caller,
    served: AsyncQueue<ServedCall>,
    dispatcher: Option<JoinHandle<()>>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("state", &self.channel.state())
            .field("pending", &self.router.pending_count())
            .field("serving", &self.dispatcher.is_some())
            .finish()
    }
}

impl Endpoint {
    /// Wrap a channel. Nothing is read from it until [`serve`](Self::serve).
    pub fn open(channel: MessageChannel) -> Self {
        let channel = Arc::new(channel);
        let router = Arc::new(ResponseRouter::new());
        let caller = Caller {
            inner: Arc::new(CallerInner {
                channel: Arc::clone(&channel),
                router: Arc::clone(&router),
                next_id: AtomicU64::new(1),
            }),
        };
        Self {
            channel,
            router,
            caller,
            served: AsyncQueue::new(),
            dispatcher: None,
        }
    }

    /// Start the dispatcher, answering requests with `handlers`.
    ///
    /// Must be called once, from within a tokio runtime.
    pub fn serve(&mut self, handlers: Handlers) -> RpcResult<()> {
        if self.dispatcher.is_some() {
            return Err(RpcError::protocol("endpoint is already serving"));
        }
        log::debug!(
            target: "taskbridge::rpc",
            "Serving {:?}",
            handlers
        );
        let dispatcher = tokio::spawn(dispatch_loop(
            Arc::clone(&self.channel),
            Arc::clone(&self.router),
            Arc::new(handlers),
            self.served.clone(),
        ));
        self.dispatcher = Some(dispatcher);
        Ok(())
    }

    /// Caller side of this endpoint. Cheap to clone.
    pub fn caller(&self) -> Caller {
        self.caller.clone()
    }

    /// Sequence of requests this endpoint has serviced, in completion order.
    ///
    /// Only requests completed after this is taken are recorded, and nothing
    /// is recorded once the consumer is dropped. Ends once the channel has
    /// ended. Only one consumer exists; later calls return `None`.
    pub fn served(&self) -> Option<QueueConsumer<ServedCall>> {
        self.served.consumer()
    }

    /// Close the channel and fail every outstanding call. Idempotent.
    pub fn close(&self) {
        self.channel.close();
        self.router.fail_all();
    }

    /// Wait until the underlying channel is fully closed.
    pub async fn closed(&self) {
        self.channel.closed().await;
    }

    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn pending_calls(&self) -> usize {
        self.router.pending_count()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.close();
    }
}

async fn dispatch_loop(
    channel: Arc<MessageChannel>,
    router: Arc<ResponseRouter>,
    handlers: Arc<Handlers>,
    served: AsyncQueue<ServedCall>,
) {
    let mut in_flight = JoinSet::new();
    {
        let mut incoming = channel.receive().await;
        loop {
            tokio::select! {
                message = incoming.next() => {
                    let Some(message) = message else {
                        break;
                    };
                    match message {
                        Message::Request { id, method, args } => {
                            in_flight.spawn(serve_request(
                                Arc::clone(&channel),
                                Arc::clone(&handlers),
                                served.clone(),
                                id,
                                method,
                                args,
                            ));
                        }
                        Message::Response { id, result } => route(&router, id, Ok(result)),
                        Message::Error { id, payload } => {
                            route(&router, id, Err(RpcError::Remote(Fault::from_payload(payload))))
                        }
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(err) = joined {
                        log::warn!(target: "taskbridge::rpc", "Handler task failed: {}", err);
                    }
                }
            }
        }
    }

    log::debug!(target: "taskbridge::rpc", "Channel ended, stopping dispatcher");
    router.fail_all();
    // Nobody is left to receive replies from handlers still running.
    in_flight.shutdown().await;
    served.close();
}

fn route(router: &ResponseRouter, id: RequestId, outcome: CallOutcome) {
    if !router.route(id, outcome) {
        log::debug!(
            target: "taskbridge::rpc",
            "Dropping reply for unknown or abandoned request {}",
            id
        );
    }
}

async fn serve_request(
    channel: Arc<MessageChannel>,
    handlers: Arc<Handlers>,
    served: AsyncQueue<ServedCall>,
    id: RequestId,
    method: String,
    args: Vec<Value>,
) {
    log::debug!(target: "taskbridge::rpc", "<- {} {}", id, method);

    let outcome = match AssertUnwindSafe(handlers.invoke(&method, args.clone()))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            log::error!(target: "taskbridge::rpc", "Handler for `{}` panicked", method);
            Err(Fault::new("Panic", format!("handler for `{method}` panicked")))
        }
    };

    let reply = match &outcome {
        Ok(result) => Message::Response {
            id,
            result: result.clone(),
        },
        Err(fault) => Message::Error {
            id,
            payload: fault.to_payload(),
        },
    };
    channel.send(reply);
    if served.has_consumer() {
        served.push(ServedCall {
            method,
            args,
            outcome,
        });
    }
}

struct CallerInner {
    channel: Arc<MessageChannel>,
    router: Arc<ResponseRouter>,
    /// Per-endpoint ID space; the other direction counts independently.
    next_id: AtomicU64,
}

/// Issues calls to the far end of an [`Endpoint`]'s channel.
#[derive(Clone)]
pub struct Caller {
    inner: Arc<CallerInner>,
}

impl fmt::Debug for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caller")
            .field("state", &self.inner.channel.state())
            .field("pending", &self.inner.router.pending_count())
            .finish()
    }
}

impl Caller {
    /// Call `method` on the far end and wait for its result.
    ///
    /// Fails with [`RpcError::Remote`] if the far end's handler raised a
    /// fault, and with [`RpcError::ChannelClosed`] if the channel is not open
    /// or ends before the response arrives.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> RpcResult<Value> {
        let inner = &self.inner;
        if !inner.channel.is_open() {
            return Err(RpcError::ChannelClosed);
        }

        let id = RequestId::new(inner.next_id.fetch_add(1, Ordering::Relaxed));
        let receiver = inner.router.register(id)?;
        let guard = PendingGuard {
            router: &inner.router,
            id,
        };

        log::debug!(target: "taskbridge::rpc", "-> {} {}", id, method);
        inner.channel.send(Message::request(id, method, args));

        let outcome = receiver.await;
        drop(guard);
        outcome.unwrap_or(Err(RpcError::ChannelClosed))
    }

    pub fn is_closed(&self) -> bool {
        !self.inner.channel.is_open() || self.inner.router.is_closed()
    }
}

/// Removes the pending entry if the calling future is dropped early.
struct PendingGuard<'a> {
    router: &'a ResponseRouter,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.router.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::HandlerFuture;
    use serde_json::json;
    use tokio::sync::Notify;

    fn connect(client_handlers: Handlers, server_handlers: Handlers) -> (Endpoint, Endpoint) {
        let (left, right) = MessageChannel::pair();
        let mut client = Endpoint::open(left);
        client.serve(client_handlers).unwrap();
        let mut server = Endpoint::open(right);
        server.serve(server_handlers).unwrap();
        (client, server)
    }

    fn gated(
        gate: Arc<Notify>,
        value: &'static str,
    ) -> impl Fn(Vec<Value>) -> HandlerFuture + Send + Sync + 'static {
        move |_| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Ok(json!(value))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn out_of_order_completion_resolves_each_caller_with_its_own_result() {
        let gate_a = Arc::new(Notify::new());
        let gate_c = Arc::new(Notify::new());
        let server_handlers = Handlers::new()
            .on("a", gated(Arc::clone(&gate_a), "A"))
            .on("b", |_| async { Ok(json!("B")) })
            .on("c", gated(Arc::clone(&gate_c), "C"));
        let (client, _server) = connect(Handlers::new(), server_handlers);
        let caller = client.caller();

        // Issue a, b, c without awaiting in between.
        let spawn_call = |method: &'static str| {
            let caller = caller.clone();
            tokio::spawn(async move { caller.call(method, vec![]).await })
        };
        let a = spawn_call("a");
        let b = spawn_call("b");
        let c = spawn_call("c");

        // b is processed fastest
        assert_eq!(b.await.unwrap().unwrap(), json!("B"));
        assert!(!a.is_finished() && !c.is_finished());

        // then a
        gate_a.notify_one();
        assert_eq!(a.await.unwrap().unwrap(), json!("A"));
        assert!(!c.is_finished(), "c must still be waiting for its own response");

        // then c
        gate_c.notify_one();
        assert_eq!(c.await.unwrap().unwrap(), json!("C"));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn handler_fault_reaches_caller_unchanged() {
        let server_handlers =
            Handlers::new().on("x", |_| async { Err(Fault::new("BoomCondition", "oops")) });
        let (client, _server) = connect(Handlers::new(), server_handlers);

        let err = client.caller().call("x", vec![]).await.unwrap_err();
        assert_eq!(err.fault(), Some(&Fault::new("BoomCondition", "oops")));
    }

    #[tokio::test]
    async fn unknown_method_is_answered_with_error() {
        let (client, _server) = connect(Handlers::new(), Handlers::new());

        let err = client.caller().call("missing", vec![]).await.unwrap_err();
        assert_eq!(err.fault().map(|f| f.name.as_str()), Some("UnknownMethod"));
    }

    #[tokio::test]
    async fn close_before_response_fails_pending_call_with_channel_closed() {
        let server_handlers = Handlers::new().on("y", |_| futures::future::pending());
        let (client, _server) = connect(Handlers::new(), server_handlers);
        let caller = client.caller();

        let pending = tokio::spawn({
            let caller = caller.clone();
            async move { caller.call("y", vec![]).await }
        });
        while client.pending_calls() == 0 {
            tokio::task::yield_now().await;
        }

        client.close();
        let err = pending.await.unwrap().unwrap_err();
        assert!(err.is_channel_closed(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn far_end_disappearing_fails_pending_call_with_channel_closed() {
        let started = Arc::new(Notify::new());
        let server_handlers = Handlers::new().on("y", {
            let started = Arc::clone(&started);
            move |_| {
                started.notify_one();
                futures::future::pending()
            }
        });
        let (client, server) = connect(Handlers::new(), server_handlers);
        let caller = client.caller();

        let pending = tokio::spawn(async move { caller.call("y", vec![]).await });
        started.notified().await;
        drop(server);

        let err = pending.await.unwrap().unwrap_err();
        assert!(err.is_channel_closed(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn call_after_close_fails_immediately() {
        let (client, _server) = connect(Handlers::new(), Handlers::new());
        client.close();

        let err = client.caller().call("anything", vec![]).await.unwrap_err();
        assert!(err.is_channel_closed());
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_calls_are_correlated() {
        let server_handlers = Handlers::new().on("double", |args| async move {
            let n = args.first().and_then(Value::as_u64).unwrap_or(0);
            tokio::task::yield_now().await;
            Ok(json!(n * 2))
        });
        let (client, _server) = connect(Handlers::new(), server_handlers);
        let caller = client.caller();

        let calls = (0..50u64).map(|n| {
            let caller = caller.clone();
            async move { (n, caller.call("double", vec![json!(n)]).await) }
        });
        for (n, result) in futures::future::join_all(calls).await {
            assert_eq!(result.unwrap(), json!(n * 2), "call {n} got another call's result");
        }
    }

    #[tokio::test]
    async fn handler_can_call_back_over_the_same_channel() {
        let (left, right) = MessageChannel::pair();
        let mut host = Endpoint::open(left);
        host.serve(Handlers::new().on("progress", |args| async move {
            Ok(json!({"ack": args}))
        }))
        .unwrap();

        let mut task = Endpoint::open(right);
        let back = task.caller();
        task.serve(Handlers::new().on("work", move |_| {
            let back = back.clone();
            async move {
                let ack = back
                    .call("progress", vec![json!("half")])
                    .await
                    .map_err(|err| Fault::new("CallbackFailed", err.to_string()))?;
                Ok(json!({"done": true, "ack": ack}))
            }
        }))
        .unwrap();

        let result = host.caller().call("work", vec![]).await.unwrap();
        assert_eq!(result, json!({"done": true, "ack": {"ack": ["half"]}}));
    }

    #[tokio::test]
    async fn served_sequence_records_outcomes_and_ends_with_channel() {
        let server_handlers = Handlers::new()
            .on("teardown", |_| async { Ok(Value::Null) })
            .on("x", |_| async { Err(Fault::new("BoomCondition", "oops")) });
        let (client, server) = connect(Handlers::new(), server_handlers);
        let mut served = server.served().unwrap();
        assert!(server.served().is_none(), "served sequence has a single consumer");

        let caller = client.caller();
        let _ = caller.call("x", vec![json!(1)]).await;
        caller.call("teardown", vec![]).await.unwrap();

        let first = served.next().await.unwrap();
        assert_eq!(first.method, "x");
        assert_eq!(first.args, vec![json!(1)]);
        assert_eq!(first.outcome, Err(Fault::new("BoomCondition", "oops")));
        let second = served.next().await.unwrap();
        assert_eq!(second.method, "teardown");
        assert_eq!(second.outcome, Ok(Value::Null));

        client.close();
        assert!(served.next().await.is_none());
    }

    #[tokio::test]
    async fn each_direction_numbers_its_own_requests() {
        let (left, right) = MessageChannel::pair();
        let mut a = Endpoint::open(left);
        a.serve(Handlers::new().on("who", |_| async { Ok(json!("a")) })).unwrap();
        let mut b = Endpoint::open(right);
        b.serve(Handlers::new().on("who", |_| async { Ok(json!("b")) })).unwrap();

        // Both sides use request id 1 concurrently without interference.
        let (caller_a, caller_b) = (a.caller(), b.caller());
        let (from_b, from_a) = tokio::join!(
            caller_a.call("who", vec![]),
            caller_b.call("who", vec![])
        );
        assert_eq!(from_b.unwrap(), json!("b"));
        assert_eq!(from_a.unwrap(), json!("a"));
    }

    #[tokio::test]
    async fn served_calls_are_not_kept_without_a_consumer() {
        let (left, right) = MessageChannel::pair();
        let mut host = Endpoint::open(left);
        host.serve(Handlers::new().on("reportBuildState", |_| async { Ok(Value::Null) }))
            .unwrap();
        let mut task = Endpoint::open(right);
        task.serve(Handlers::new()).unwrap();
        let caller = task.caller();

        for n in 0..200 {
            caller
                .call("reportBuildState", vec![json!({"state": "bundling", "n": n})])
                .await
                .unwrap();
        }

        assert!(host.served.is_empty(), "{} calls buffered", host.served.len());
    }

    #[tokio::test]
    async fn serve_twice_is_rejected() {
        let (left, _right) = MessageChannel::pair();
        let mut endpoint = Endpoint::open(left);
        endpoint.serve(Handlers::new()).unwrap();
        assert!(endpoint.serve(Handlers::new()).is_err());
    }
}
