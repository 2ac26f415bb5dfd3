//! Process-transparent task RPC.
//!
//! A host invokes asynchronous operations on a *task* that runs either in the
//! same process or in a supervised worker process, through one interface.
//! Both ends can call each other over the same channel: the host calls the
//! task's primary operation, the task calls back with progress.
//!
//! Layers, leaves first:
//! - [`channel`] - framed duplex message channel and its async queue
//! - [`rpc`] - correlation of calls and dispatch of requests to handlers
//! - [`supervisor`] - task creation, `ready` handshake and teardown
//! - [`bridges`] - task-kind adapters (build, release, submit)
//! - [`worker`] - child-process entry point

pub mod bridges;
pub mod channel;
pub mod config;
pub mod error;
pub mod protocol;
pub mod rpc;
pub mod supervisor;
pub mod tasks;
pub mod worker;

pub use config::{ExecutionMode, SupervisorConfig};
pub use error::{ContractViolation, Fault, RpcError, RpcResult};
pub use rpc::{Handlers, Peer};
pub use supervisor::{TaskHandle, TaskSpec, TaskState, TaskSupervisor};
