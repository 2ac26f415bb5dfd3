//! Task implementations that misbehave on purpose.

use serde_json::Value;

use super::TaskContext;
use crate::error::Fault;
use crate::rpc::Handlers;

/// Exit status of a worker killed by `exiting-build`.
const EXIT_STATUS: i32 = 3;

pub(super) fn failing_build(_context: TaskContext) -> Handlers {
    Handlers::new().on("build", |_| async { Err(Fault::new("BoomCondition", "oops")) })
}

pub(super) fn incomplete(_context: TaskContext) -> Handlers {
    Handlers::new()
}

pub(super) fn exiting_build(_context: TaskContext) -> Handlers {
    Handlers::new().on("build", |_| async { terminate() })
}

fn terminate() -> Result<Value, Fault> {
    log::warn!(target: "taskbridge::worker", "exiting-build: terminating process");
    std::process::exit(EXIT_STATUS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_build_raises_boom_condition() {
        let fault = failing_build(TaskContext::default())
            .invoke("build", vec![])
            .await
            .unwrap_err();
        assert_eq!(fault, Fault::new("BoomCondition", "oops"));
    }

    #[test]
    fn incomplete_exposes_nothing() {
        assert_eq!(incomplete(TaskContext::default()).methods().count(), 0);
    }
}
