//! Compiled-in task implementations.
//!
//! The worker resolves its task implementation by name from this registry.
//! Each entry is a factory that receives a [`TaskContext`] and returns the
//! handler map the bridge will expose.

mod echo;
mod faulty;

use std::fmt;

use serde_json::Value;

use crate::error::{RpcError, RpcResult};
use crate::rpc::{Handlers, Peer};

/// Builds the handlers of a task implementation.
pub type TaskFactory = fn(TaskContext) -> Handlers;

/// A named task implementation.
pub struct TaskImplementation {
    pub name: &'static str,
    pub description: &'static str,
    factory: TaskFactory,
}

impl fmt::Debug for TaskImplementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskImplementation")
            .field("name", &self.name)
            .finish()
    }
}

impl TaskImplementation {
    pub const fn new(name: &'static str, description: &'static str, factory: TaskFactory) -> Self {
        Self {
            name,
            description,
            factory,
        }
    }

    pub fn instantiate(&self, context: TaskContext) -> Handlers {
        (self.factory)(context)
    }
}

static TASKS: &[TaskImplementation] = &[
    TaskImplementation::new(
        "echo-build",
        "reports each options.entries item and returns one bundle per entry",
        echo::echo_build,
    ),
    TaskImplementation::new(
        "echo-release",
        "returns the requested options.version as released",
        echo::echo_release,
    ),
    TaskImplementation::new(
        "echo-submit",
        "returns options.packages as the dependency list",
        echo::echo_submit,
    ),
    TaskImplementation::new(
        "failing-build",
        "build always raises BoomCondition",
        faulty::failing_build,
    ),
    TaskImplementation::new(
        "incomplete",
        "implements no operation at all",
        faulty::incomplete,
    ),
    TaskImplementation::new(
        "exiting-build",
        "build terminates the worker process",
        faulty::exiting_build,
    ),
];

/// Every registered task implementation.
pub fn all() -> &'static [TaskImplementation] {
    TASKS
}

/// Resolve a task implementation by name.
pub fn find(name: &str) -> RpcResult<&'static TaskImplementation> {
    TASKS
        .iter()
        .find(|task| task.name == name)
        .ok_or_else(|| RpcError::resolve("task implementation", name))
}

/// What a task implementation receives from its bridge.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    progress: Option<ProgressReporter>,
}

impl TaskContext {
    pub fn new(progress: Option<ProgressReporter>) -> Self {
        Self { progress }
    }

    /// Report progress if the bridge has a progress callback.
    pub async fn report(&self, state: Value) {
        if let Some(progress) = &self.progress {
            progress.notify(state).await;
        }
    }
}

/// Sends progress states to the producer through its callback method.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    producer: Peer,
    method: &'static str,
}

impl ProgressReporter {
    pub fn new(producer: Peer, method: &'static str) -> Self {
        Self { producer, method }
    }

    pub async fn report(&self, state: Value) -> RpcResult<Value> {
        self.producer.call(self.method, vec![state]).await
    }

    /// Report, logging instead of failing. Progress never aborts the work.
    pub async fn notify(&self, state: Value) {
        if let Err(err) = self.report(state).await {
            log::warn!(
                target: "taskbridge::bridge",
                "Progress callback {} failed: {}",
                self.method,
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn find_resolves_registered_names() {
        for name in ["echo-build", "echo-release", "echo-submit", "failing-build", "incomplete"] {
            assert_eq!(find(name).unwrap().name, name);
        }
    }

    #[test]
    fn find_unknown_name_is_a_resolve_error() {
        let err = find("no-such-task").unwrap_err();
        assert!(matches!(err, RpcError::Resolve { .. }));
        assert!(err.to_string().contains("no-such-task"));
    }

    #[test]
    fn task_names_are_unique() {
        let mut names: Vec<&str> = all().iter().map(|task| task.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all().len());
    }

    #[tokio::test]
    async fn context_report_reaches_producer_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let producer = Peer::local(Handlers::new().on("reportBuildState", {
            let seen = Arc::clone(&seen);
            move |args| {
                seen.lock().unwrap().extend(args);
                async { Ok(Value::Null) }
            }
        }));
        let context = TaskContext::new(Some(ProgressReporter::new(producer, "reportBuildState")));

        context.report(json!({"state": "halfway"})).await;
        assert_eq!(*seen.lock().unwrap(), vec![json!({"state": "halfway"})]);
    }

    #[tokio::test]
    async fn failing_progress_callback_is_not_fatal() {
        let context = TaskContext::new(Some(ProgressReporter::new(
            Peer::local(Handlers::new()),
            "reportBuildState",
        )));
        // UnknownMethod on the producer side is logged and swallowed
        context.report(json!({"state": "x"})).await;
        TaskContext::default().report(json!({"state": "y"})).await;
    }
}
