//! Worker side of a forked task.
//!
//! The worker speaks the wire protocol on its stdin/stdout: it adapts the
//! named task implementation through the named bridge, serves the host's
//! calls, signals `ready` and exits once `teardown` has been serviced or the
//! host goes away.

use crate::bridges::{self, Bridge};
use crate::channel::MessageChannel;
use crate::error::{RpcError, RpcResult};
use crate::protocol::{READY, TEARDOWN};
use crate::rpc::{Endpoint, Peer};
use crate::tasks::{self, TaskImplementation};

/// Resolve `bridge` and `implementation` and serve them over stdio.
pub async fn run(bridge: &str, implementation: &str) -> RpcResult<()> {
    let bridge = bridges::find(bridge)?;
    let task = tasks::find(implementation)?;
    serve(MessageChannel::stdio(), bridge, task).await
}

/// Serve `task` through `bridge` over `channel` until teardown.
pub async fn serve(
    channel: MessageChannel,
    bridge: &dyn Bridge,
    task: &TaskImplementation,
) -> RpcResult<()> {
    let mut endpoint = Endpoint::open(channel);
    let producer = Peer::Remote(endpoint.caller());
    let handlers = bridge.adapt(producer.clone(), task)?;

    let mut served = endpoint
        .served()
        .ok_or_else(|| RpcError::protocol("served calls already consumed"))?;
    endpoint.serve(handlers)?;

    producer.call(READY, vec![]).await?;
    log::debug!(
        target: "taskbridge::worker",
        "{} ready behind {} bridge",
        task.name,
        bridge.name()
    );

    while let Some(call) = served.next().await {
        log::debug!(
            target: "taskbridge::worker",
            "Served {} ({})",
            call.method,
            if call.outcome.is_ok() { "ok" } else { "fault" }
        );
        if call.method == TEARDOWN {
            break;
        }
    }

    endpoint.close();
    endpoint.closed().await;
    log::debug!(target: "taskbridge::worker", "{} finished", task.name);
    Ok(())
}
