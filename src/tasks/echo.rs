//! Well-behaved task implementations that echo their options back.

use serde_json::{Value, json};

use super::TaskContext;
use crate::error::Fault;
use crate::rpc::{Handlers, single_argument};

pub(super) fn echo_build(context: TaskContext) -> Handlers {
    Handlers::new()
        .on("build", move |args| {
            let context = context.clone();
            async move {
                let options = single_argument(args)?;
                let entries = string_list(&options, "entries")?;

                let mut bundles = Vec::with_capacity(entries.len());
                for entry in entries {
                    context
                        .report(json!({"state": "bundling", "entry": entry}))
                        .await;
                    bundles.push(format!("{entry}.bundle"));
                }
                Ok(json!({ "bundles": bundles }))
            }
        })
        .on("teardown", |_| async { Ok(Value::Null) })
}

pub(super) fn echo_release(_context: TaskContext) -> Handlers {
    Handlers::new().on("release", |args| async move {
        let options = single_argument(args)?;
        let version = options.get("version").cloned().unwrap_or(Value::Null);
        Ok(json!({ "released": version }))
    })
}

pub(super) fn echo_submit(_context: TaskContext) -> Handlers {
    Handlers::new().on("findDependencies", |args| async move {
        let options = single_argument(args)?;
        Ok(options
            .get("packages")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())))
    })
}

fn string_list(options: &Value, key: &str) -> Result<Vec<String>, Fault> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_owned).ok_or_else(|| {
                    Fault::invalid_arguments(format!("`{key}` must contain only strings"))
                })
            })
            .collect(),
        Some(_) => Err(Fault::invalid_arguments(format!("`{key}` must be a list"))),
    }
}
