//! Handle to a created task.

use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Child;
use tokio::sync::Mutex;

use super::process;
use super::{TaskId, TaskSpec, TaskState};
use crate::error::{LockResultExt, RpcError, RpcResult};
use crate::protocol::TEARDOWN;
use crate::rpc::{Endpoint, LocalPeer, Peer};

/// Transport behind a task handle.
pub(crate) enum TaskLink {
    Local {
        producer: LocalPeer,
        task: LocalPeer,
    },
    Forked {
        endpoint: Endpoint,
        child: Mutex<Option<Child>>,
    },
}

impl TaskLink {
    pub(crate) fn forked(endpoint: Endpoint, child: Child) -> Self {
        TaskLink::Forked {
            endpoint,
            child: Mutex::new(Some(child)),
        }
    }

    /// Resolves once the transport to the task is gone.
    ///
    /// A local task has no transport and never disconnects on its own.
    pub(crate) async fn disconnected(&self) {
        match self {
            TaskLink::Local { .. } => std::future::pending().await,
            TaskLink::Forked { endpoint, .. } => endpoint.closed().await,
        }
    }

    /// Close the transport and reap the worker within `timeout`.
    async fn close(&self, id: TaskId, timeout: Duration) {
        match self {
            TaskLink::Local { producer, task } => {
                task.close();
                producer.close();
            }
            TaskLink::Forked { endpoint, child } => {
                endpoint.close();
                let child = child.lock().await.take();
                if let Some(mut child) = child {
                    process::reap(&mut child, timeout, id).await;
                }
            }
        }
    }
}

/// A created task: call its operations, then tear it down.
pub struct TaskHandle {
    id: TaskId,
    spec: TaskSpec,
    peer: Peer,
    state: RwLock<TaskState>,
    pub(crate) link: TaskLink,
    teardown_timeout: Duration,
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("state", &self.state())
            .field("local", &self.peer.is_local())
            .finish()
    }
}

impl TaskHandle {
    pub(crate) fn new(
        id: TaskId,
        spec: TaskSpec,
        peer: Peer,
        link: TaskLink,
        teardown_timeout: Duration,
    ) -> Self {
        Self {
            id,
            spec,
            peer,
            state: RwLock::new(TaskState::Creating),
            link,
            teardown_timeout,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn state(&self) -> TaskState {
        *self.state.read().recover_poison("TaskHandle::state")
    }

    pub fn is_local(&self) -> bool {
        self.peer.is_local()
    }

    fn set_state(&self, to: TaskState) {
        let mut state = self.state.write().recover_poison("TaskHandle::set_state");
        log::debug!(
            target: "taskbridge::supervisor",
            "Task {}: {:?} -> {:?}",
            self.id,
            *state,
            to
        );
        *state = to;
    }

    pub(crate) fn mark_ready(&self) {
        self.set_state(TaskState::Ready);
    }

    /// Call an operation on the task.
    ///
    /// Fails with [`RpcError::ChannelClosed`] once teardown has started or
    /// the worker has gone away.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> RpcResult<Value> {
        {
            let mut state = self.state.write().recover_poison("TaskHandle::call");
            if !state.accepts_calls() {
                return Err(match *state {
                    TaskState::Creating => {
                        RpcError::protocol(format!("task {} is not ready", self.id))
                    }
                    _ => RpcError::ChannelClosed,
                });
            }
            *state = TaskState::Running;
        }
        self.peer.call(method, args).await
    }

    /// Ask the task to tear down, then close its channel and reap the worker.
    ///
    /// Idempotent: returns `Ok(())` if teardown already started. A channel
    /// that closed before `teardown` could be answered counts as success;
    /// any other error is returned after the task has been closed anyway.
    pub async fn teardown(&self) -> RpcResult<()> {
        {
            let mut state = self.state.write().recover_poison("TaskHandle::teardown");
            match *state {
                TaskState::TearingDown | TaskState::Closed => {
                    log::debug!(
                        target: "taskbridge::supervisor",
                        "Task {} already {:?}, skipping teardown",
                        self.id,
                        *state
                    );
                    return Ok(());
                }
                _ => *state = TaskState::TearingDown,
            }
        }
        log::info!(target: "taskbridge::supervisor", "Tearing down task {}", self.id);

        let result = match self.peer.call(TEARDOWN, vec![]).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_channel_closed() => {
                log::debug!(
                    target: "taskbridge::supervisor",
                    "Task {} channel closed before teardown completed",
                    self.id
                );
                Ok(())
            }
            Err(err) => {
                log::warn!(
                    target: "taskbridge::supervisor",
                    "Task {} teardown failed: {}",
                    self.id,
                    err
                );
                Err(err)
            }
        };

        self.link.close(self.id, self.teardown_timeout).await;
        self.set_state(TaskState::Closed);
        result
    }

    /// Close a task whose handshake failed, without asking it anything.
    pub(crate) async fn abort(&self) {
        self.link.close(self.id, Duration::ZERO).await;
        self.set_state(TaskState::Closed);
    }
}
