//! Bridge adapters.
//!
//! A bridge sits on the task side. Given the producer peer and a resolved task
//! implementation it returns the consumer handlers the host calls: the
//! bridge's primary operation plus `teardown`. Progress only ever flows back
//! through the producer peer.
//!
//! | bridge    | primary method     | progress callback    |
//! |-----------|--------------------|----------------------|
//! | `build`   | `build`            | `reportBuildState`   |
//! | `release` | `release`          | `reportReleaseState` |
//! | `submit`  | `findDependencies` | none                 |

pub mod build;
pub mod release;
pub mod submit;

use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::{ContractViolation, RpcError, RpcResult};
use crate::protocol::TEARDOWN;
use crate::rpc::{Handlers, Peer};
use crate::tasks::{ProgressReporter, TaskContext, TaskImplementation};

/// Adapts a task implementation to the generic consumer interface.
pub trait Bridge: Send + Sync {
    fn name(&self) -> &'static str;

    /// The one operation the host invokes on the task.
    fn primary_method(&self) -> &'static str;

    /// Producer callback receiving progress states, if the bridge has one.
    fn progress_method(&self) -> Option<&'static str> {
        None
    }

    /// Build the consumer handlers for `task`.
    ///
    /// Fails with a contract violation if the implementation lacks the
    /// primary method.
    fn adapt(&self, producer: Peer, task: &TaskImplementation) -> RpcResult<Handlers>;
}

static BRIDGES: &[&dyn Bridge] = &[&build::BuildBridge, &release::ReleaseBridge, &submit::SubmitBridge];

/// Every registered bridge.
pub fn all() -> impl Iterator<Item = &'static dyn Bridge> {
    BRIDGES.iter().copied()
}

/// Resolve a bridge by name.
pub fn find(name: &str) -> RpcResult<&'static dyn Bridge> {
    all()
        .find(|bridge| bridge.name() == name)
        .ok_or_else(|| RpcError::resolve("bridge", name))
}

/// Instantiate `task` for `bridge` and check it implements the primary method.
pub(crate) fn instantiate(
    bridge: &dyn Bridge,
    producer: &Peer,
    task: &TaskImplementation,
) -> Result<Handlers, ContractViolation> {
    let progress = bridge
        .progress_method()
        .map(|method| ProgressReporter::new(producer.clone(), method));
    let implementation = task.instantiate(TaskContext::new(progress));

    let missing = implementation.missing(&[bridge.primary_method()]);
    if !missing.is_empty() {
        log::error!(
            target: "taskbridge::bridge",
            "{} bridge: task {} is missing {:?}",
            bridge.name(),
            task.name,
            missing
        );
        return Err(ContractViolation {
            bridge: bridge.name().to_string(),
            implementation: task.name.to_string(),
            missing: missing.into_iter().map(str::to_owned).collect(),
        });
    }
    Ok(implementation)
}

/// Consumer handlers exposing `teardown` on top of `primary`.
///
/// `teardown` forwards to the implementation when it has one.
pub(crate) fn consumer(implementation: Arc<Handlers>, primary: Handlers) -> Handlers {
    let mut consumer = primary;
    consumer.insert(TEARDOWN, move |args| {
        let implementation = Arc::clone(&implementation);
        async move {
            if implementation.contains(TEARDOWN) {
                implementation.invoke(TEARDOWN, args).await
            } else {
                Ok(Value::Null)
            }
        }
    });
    consumer
}

/// State names a staged bridge reports around the implementation call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stages {
    pub started: &'static str,
    pub finished: &'static str,
}

/// Shared adapter for bridges that report `{"state": ...}` around the work.
///
/// Reports `started` before invoking the implementation, then `finished` or
/// `failed` (with the fault) once it returns. Reporting failures are logged
/// and never change the outcome.
pub(crate) fn adapt_staged(
    bridge: &dyn Bridge,
    stages: Stages,
    producer: Peer,
    task: &TaskImplementation,
) -> RpcResult<Handlers> {
    let implementation = Arc::new(instantiate(bridge, &producer, task)?);
    let primary = bridge.primary_method();
    let reporter = bridge
        .progress_method()
        .map(|method| ProgressReporter::new(producer, method));

    let staged = Handlers::new().on(primary, {
        let implementation = Arc::clone(&implementation);
        move |args| {
            let implementation = Arc::clone(&implementation);
            let reporter = reporter.clone();
            async move {
                if let Some(reporter) = &reporter {
                    reporter.notify(json!({"state": stages.started})).await;
                }
                let outcome = implementation.invoke(primary, args).await;
                if let Some(reporter) = &reporter {
                    let state = match &outcome {
                        Ok(_) => json!({"state": stages.finished}),
                        Err(fault) => json!({"state": "failed", "error": fault.to_payload()}),
                    };
                    reporter.notify(state).await;
                }
                outcome
            }
        }
    });

    log::debug!(
        target: "taskbridge::bridge",
        "{} bridge adapted task {}",
        bridge.name(),
        task.name
    );
    Ok(consumer(implementation, staged))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use serde_json::Value;

    use crate::rpc::{Handlers, Peer};

    /// Local producer that records every value sent to `method`.
    pub(crate) fn recording_producer(method: &'static str) -> (Peer, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handlers = Handlers::new().on(method, {
            let seen = Arc::clone(&seen);
            move |args| {
                seen.lock().unwrap().extend(args);
                async { Ok(Value::Null) }
            }
        });
        (Peer::local(handlers), seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks;

    #[test]
    fn find_resolves_each_bridge() {
        assert_eq!(find("build").unwrap().primary_method(), "build");
        assert_eq!(find("release").unwrap().primary_method(), "release");
        assert_eq!(find("submit").unwrap().primary_method(), "findDependencies");
        assert!(matches!(find("deploy"), Err(RpcError::Resolve { .. })));
    }

    #[test]
    fn incomplete_task_is_a_contract_violation_for_every_bridge() {
        let task = tasks::find("incomplete").unwrap();
        for bridge in all() {
            let err = bridge
                .adapt(Peer::local(Handlers::new()), task)
                .unwrap_err();
            match err {
                RpcError::Contract(violation) => {
                    assert_eq!(violation.bridge, bridge.name());
                    assert_eq!(violation.implementation, "incomplete");
                    assert_eq!(violation.missing, vec![bridge.primary_method().to_string()]);
                }
                other => panic!("expected contract violation, got {other}"),
            }
        }
    }

    #[tokio::test]
    async fn teardown_defaults_to_noop() {
        let task = tasks::find("echo-release").unwrap();
        let handlers = find("release")
            .unwrap()
            .adapt(Peer::local(Handlers::new()), task)
            .unwrap();
        assert_eq!(handlers.invoke(TEARDOWN, vec![]).await, Ok(Value::Null));
    }
}
