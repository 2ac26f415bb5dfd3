//! Task supervisor.
//!
//! Creates tasks either in this process or in a spawned worker process,
//! drives the `ready` handshake and hands out [`TaskHandle`]s.
//!
//! # Module Structure
//!
//! - `handle` - task handle, calls and teardown
//! - `process` - worker spawning, reaping and force-kill
//! - `state` - lifecycle states and task identifiers

mod handle;
mod process;
mod state;

pub use handle::TaskHandle;
pub use state::{TaskId, TaskState};

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use crate::bridges::{self, Bridge};
use crate::channel::MessageChannel;
use crate::config::{ExecutionMode, SupervisorConfig};
use crate::error::{RpcError, RpcResult};
use crate::protocol::READY;
use crate::rpc::{Endpoint, Handlers, LocalPeer, Peer};
use crate::tasks::{self, TaskImplementation};
use handle::TaskLink;

/// What to run: a bridge and the task implementation behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub bridge: String,
    pub implementation: String,
}

impl TaskSpec {
    pub fn new(bridge: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            implementation: implementation.into(),
        }
    }
}

/// Creates and supervises tasks.
#[derive(Debug, Clone)]
pub struct TaskSupervisor {
    config: SupervisorConfig,
}

impl TaskSupervisor {
    pub fn new(config: SupervisorConfig) -> RpcResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Start a task and wait for its `ready` handshake.
    ///
    /// `producer` holds the callbacks the task may call (`ready` plus the
    /// bridge's progress callback). Creation fails if the task disconnects or
    /// does not become ready within the handshake timeout.
    pub async fn create(&self, spec: TaskSpec, producer: Handlers) -> RpcResult<TaskHandle> {
        let bridge = bridges::find(&spec.bridge)?;
        let task = tasks::find(&spec.implementation)?;

        let id = TaskId::new();
        log::info!(
            target: "taskbridge::supervisor",
            "Creating task {} ({} via {} bridge, {:?})",
            id,
            spec.implementation,
            spec.bridge,
            self.config.mode
        );

        let (producer, ready) = with_ready_signal(producer);
        let (peer, link) = match self.config.mode {
            ExecutionMode::InProcess => start_local(bridge, task, producer)?,
            ExecutionMode::Forked => self.start_forked(&spec, producer)?,
        };
        let handle = TaskHandle::new(id, spec, peer, link, self.config.teardown_timeout());

        let timeout = self.config.handshake_timeout();
        match await_ready(ready, &handle.link, timeout).await {
            Ok(()) => {
                handle.mark_ready();
                log::info!(target: "taskbridge::supervisor", "Task {} ready", id);
                Ok(handle)
            }
            Err(err) => {
                log::warn!(
                    target: "taskbridge::supervisor",
                    "Task {} failed to start: {}",
                    id,
                    err
                );
                handle.abort().await;
                Err(err)
            }
        }
    }

    fn start_forked(&self, spec: &TaskSpec, producer: Handlers) -> RpcResult<(Peer, TaskLink)> {
        let program = self.config.worker_program()?;
        let mut child = process::spawn_worker(&program, spec)?;
        let channel = MessageChannel::for_child(&mut child)?;

        let mut endpoint = Endpoint::open(channel);
        endpoint.serve(producer)?;
        let peer = Peer::Remote(endpoint.caller());
        Ok((peer, TaskLink::forked(endpoint, child)))
    }
}

/// Build the task in this process and signal `ready` on a later turn.
fn start_local(
    bridge: &dyn Bridge,
    task: &TaskImplementation,
    producer: Handlers,
) -> RpcResult<(Peer, TaskLink)> {
    let producer = LocalPeer::new(producer);
    let task_handlers = bridge.adapt(Peer::Local(producer.clone()), task)?;
    let task = LocalPeer::new(task_handlers);

    let signal = producer.clone();
    tokio::spawn(async move {
        if let Err(err) = signal.call(READY, vec![]).await {
            log::warn!(target: "taskbridge::supervisor", "Local ready signal failed: {}", err);
        }
    });

    Ok((Peer::Local(task.clone()), TaskLink::Local { producer, task }))
}

/// Wrap the producer's `ready` so the supervisor observes the handshake.
///
/// The caller's own `ready` handler, if any, still runs first.
fn with_ready_signal(mut producer: Handlers) -> (Handlers, watch::Receiver<bool>) {
    let (ready_tx, ready_rx) = watch::channel(false);
    let ready_tx = Arc::new(ready_tx);
    let user = Arc::new(producer.clone());

    producer.insert(READY, move |args| {
        let ready_tx = Arc::clone(&ready_tx);
        let user = Arc::clone(&user);
        async move {
            let result = if user.contains(READY) {
                user.invoke(READY, args).await
            } else {
                Ok(Value::Null)
            };
            if ready_tx.send_replace(true) {
                log::debug!(target: "taskbridge::supervisor", "Ignoring repeated ready");
            }
            result
        }
    });
    (producer, ready_rx)
}

async fn await_ready(
    mut ready: watch::Receiver<bool>,
    link: &TaskLink,
    timeout: Duration,
) -> RpcResult<()> {
    tokio::select! {
        biased;
        signalled = async { ready.wait_for(|ready| *ready).await.is_ok() } => {
            if signalled { Ok(()) } else { Err(RpcError::ChannelClosed) }
        }
        _ = link.disconnected() => Err(RpcError::ChannelClosed),
        _ = tokio::time::sleep(timeout) => Err(RpcError::HandshakeTimeout(timeout)),
    }
}
