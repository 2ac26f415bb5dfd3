//! Worker process spawning and reaping.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use super::{TaskId, TaskSpec};
use crate::error::{RpcError, RpcResult};

/// Grace period between SIGTERM and SIGKILL.
#[cfg(unix)]
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Spawn `<program> <bridge> <implementation>` with piped stdin/stdout.
///
/// Stderr is inherited so worker logs reach the host's terminal. The child
/// is killed if its handle is dropped without being reaped.
pub(crate) fn spawn_worker(program: &Path, spec: &TaskSpec) -> RpcResult<Child> {
    let mut command = Command::new(program);
    command
        .arg(&spec.bridge)
        .arg(&spec.implementation)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    command.spawn().map_err(|err| {
        log::error!(
            target: "taskbridge::supervisor",
            "Failed to spawn worker {}: {}",
            program.display(),
            err
        );
        RpcError::Io(io::Error::new(
            err.kind(),
            format!("failed to spawn {}: {}", program.display(), err),
        ))
    })
}

/// Wait for the worker to exit, killing it once `timeout` has passed.
pub(crate) async fn reap(child: &mut Child, timeout: Duration, task: TaskId) {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            log::debug!(
                target: "taskbridge::supervisor",
                "Worker for task {} exited: {}",
                task,
                status
            );
        }
        Ok(Err(err)) => {
            log::warn!(
                target: "taskbridge::supervisor",
                "Failed to wait for worker of task {}: {}",
                task,
                err
            );
        }
        Err(_) => {
            log::warn!(
                target: "taskbridge::supervisor",
                "Worker for task {} did not exit within {:?}, killing it",
                task,
                timeout
            );
            force_kill(child).await;
        }
    }
}

/// Terminate the worker.
///
/// Unix: SIGTERM, then SIGKILL if the worker outlives the grace period.
/// Elsewhere: immediate kill.
async fn force_kill(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                if let Ok(Ok(_)) = tokio::time::timeout(KILL_GRACE, child.wait()).await {
                    return;
                }
            }
        }
    }

    if let Err(err) = child.kill().await {
        log::warn!(
            target: "taskbridge::supervisor",
            "Failed to kill worker: {}",
            err
        );
    }
}
