//! `release` bridge and its host-side helpers.

use std::sync::Arc;

use serde_json::Value;

use super::{Bridge, Stages, adapt_staged};
use crate::error::RpcResult;
use crate::rpc::{Handlers, Peer, single_argument};
use crate::supervisor::TaskHandle;
use crate::tasks::TaskImplementation;

pub const METHOD: &str = "release";
pub const PROGRESS_METHOD: &str = "reportReleaseState";

pub struct ReleaseBridge;

impl Bridge for ReleaseBridge {
    fn name(&self) -> &'static str {
        "release"
    }

    fn primary_method(&self) -> &'static str {
        METHOD
    }

    fn progress_method(&self) -> Option<&'static str> {
        Some(PROGRESS_METHOD)
    }

    fn adapt(&self, producer: Peer, task: &TaskImplementation) -> RpcResult<Handlers> {
        let stages = Stages {
            started: "releasing",
            finished: "released",
        };
        adapt_staged(self, stages, producer, task)
    }
}

/// Producer handlers passing each reported release state to `on_state`.
pub fn producer<F>(on_state: F) -> Handlers
where
    F: Fn(Value) + Send + Sync + 'static,
{
    let on_state = Arc::new(on_state);
    Handlers::new().on(PROGRESS_METHOD, move |args| {
        let on_state = Arc::clone(&on_state);
        async move {
            on_state(single_argument(args)?);
            Ok(Value::Null)
        }
    })
}

pub async fn release(task: &TaskHandle, options: Value) -> RpcResult<Value> {
    task.call(METHOD, vec![options]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridges::test_support::recording_producer;
    use crate::tasks;
    use serde_json::json;

    #[tokio::test]
    async fn release_reports_releasing_then_released() {
        let (producer, seen) = recording_producer(PROGRESS_METHOD);
        let handlers = ReleaseBridge
            .adapt(producer, tasks::find("echo-release").unwrap())
            .unwrap();

        let result = handlers
            .invoke(METHOD, vec![json!({"version": "2.0.0"})])
            .await
            .unwrap();

        assert_eq!(result, json!({"released": "2.0.0"}));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!({"state": "releasing"}), json!({"state": "released"})]
        );
    }

    #[test]
    fn build_implementation_does_not_satisfy_release() {
        let err = ReleaseBridge
            .adapt(Peer::local(Handlers::new()), tasks::find("echo-build").unwrap())
            .unwrap_err();
        assert!(matches!(err, crate::error::RpcError::Contract(_)));
    }
}
