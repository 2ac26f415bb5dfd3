//! `submit` bridge: dependency discovery, no progress callback.

use std::sync::Arc;

use serde_json::{Value, json};

use super::{Bridge, consumer, instantiate};
use crate::error::{Fault, RpcError, RpcResult};
use crate::rpc::{Handlers, Peer};
use crate::supervisor::TaskHandle;
use crate::tasks::TaskImplementation;

pub const METHOD: &str = "findDependencies";

pub struct SubmitBridge;

impl Bridge for SubmitBridge {
    fn name(&self) -> &'static str {
        "submit"
    }

    fn primary_method(&self) -> &'static str {
        METHOD
    }

    fn adapt(&self, producer: Peer, task: &TaskImplementation) -> RpcResult<Handlers> {
        let implementation = Arc::new(instantiate(self, &producer, task)?);

        let primary = Handlers::new().on(METHOD, {
            let implementation = Arc::clone(&implementation);
            move |args| {
                let implementation = Arc::clone(&implementation);
                async move {
                    match implementation.invoke(METHOD, args).await? {
                        Value::Array(dependencies) => Ok(json!({ "dependencies": dependencies })),
                        other => Err(Fault::new(
                            "InvalidResult",
                            format!("{METHOD} must return a sequence, got {other}"),
                        )),
                    }
                }
            }
        });
        Ok(consumer(implementation, primary))
    }
}

/// Ask the task for its dependencies.
pub async fn find_dependencies(task: &TaskHandle, options: Value) -> RpcResult<Vec<Value>> {
    let mut result = task.call(METHOD, vec![options]).await?;
    match result.get_mut("dependencies").map(Value::take) {
        Some(Value::Array(dependencies)) => Ok(dependencies),
        _ => Err(RpcError::protocol(format!(
            "{METHOD} result has no dependency list: {result}"
        ))),
    }
}
