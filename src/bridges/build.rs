//! `build` bridge and its host-side helpers.

use std::sync::Arc;

use serde_json::Value;

use super::{Bridge, Stages, adapt_staged};
use crate::error::RpcResult;
use crate::rpc::{Handlers, Peer, single_argument};
use crate::supervisor::TaskHandle;
use crate::tasks::TaskImplementation;

pub const METHOD: &str = "build";
pub const PROGRESS_METHOD: &str = "reportBuildState";

pub struct BuildBridge;

impl Bridge for BuildBridge {
    fn name(&self) -> &'static str {
        "build"
    }

    fn primary_method(&self) -> &'static str {
        METHOD
    }

    fn progress_method(&self) -> Option<&'static str> {
        Some(PROGRESS_METHOD)
    }

    fn adapt(&self, producer: Peer, task: &TaskImplementation) -> RpcResult<Handlers> {
        let stages = Stages {
            started: "building",
            finished: "built",
        };
        adapt_staged(self, stages, producer, task)
    }
}

/// Producer handlers passing each reported build state to `on_state`.
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

/// Run the task's build with `options`.
pub async fn build(task: &TaskHandle, options: Value) -> RpcResult<Value> {
    task.call(METHOD, vec![options]).await
}
