use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RpcError, RpcResult};

/// File name of the worker program, installed next to the host binary.
pub const WORKER_PROGRAM: &str = "taskbridge-worker";

/// Where a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Child process speaking the wire protocol over its stdio
    #[default]
    Forked,
    /// Same process, handlers invoked directly
    InProcess,
}

/// Settings for [`TaskSupervisor`](crate::supervisor::TaskSupervisor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Worker program; defaults to `taskbridge-worker` next to the current executable
    pub worker: Option<PathBuf>,
    pub mode: ExecutionMode,
    /// How long a new task may take to call `ready`
    pub handshake_timeout_ms: u64,
    /// How long a torn-down worker may take to exit before it is killed
    pub teardown_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            worker: None,
            mode: ExecutionMode::default(),
            handshake_timeout_ms: 10_000,
            teardown_timeout_ms: 5_000,
        }
    }
}

impl SupervisorConfig {
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_worker(mut self, worker: impl Into<PathBuf>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    /// Reject settings the supervisor cannot work with.
    pub fn validate(&self) -> RpcResult<()> {
        if self.handshake_timeout_ms == 0 {
            return Err(RpcError::Config("handshake_timeout_ms must be positive".into()));
        }
        if self.teardown_timeout_ms == 0 {
            return Err(RpcError::Config("teardown_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// The worker program to spawn for forked tasks.
    pub fn worker_program(&self) -> RpcResult<PathBuf> {
        if let Some(worker) = &self.worker {
            return Ok(worker.clone());
        }
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| RpcError::Config(format!("{} has no parent directory", exe.display())))?;
        Ok(dir.join(format!("{}{}", WORKER_PROGRAM, std::env::consts::EXE_SUFFIX)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.mode, ExecutionMode::Forked);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.teardown_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml_over_defaults() {
        let config: SupervisorConfig = toml::from_str(
            r#"
            mode = "in-process"
            handshake_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, ExecutionMode::InProcess);
        assert_eq!(config.handshake_timeout_ms, 250);
        assert_eq!(config.teardown_timeout_ms, 5_000);
        assert_eq!(config.worker, None);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(toml::from_str::<SupervisorConfig>("handshake_timeout = 5").is_err());
    }

    #[test]
    fn zero_timeouts_are_invalid() {
        let config = SupervisorConfig {
            teardown_timeout_ms: 0,
            ..SupervisorConfig::default()
        };
        assert!(matches!(config.validate(), Err(RpcError::Config(_))));
    }

    #[test]
    fn configured_worker_wins_over_sibling_lookup() {
        let config = SupervisorConfig::default().with_worker("/opt/bin/my-worker");
        assert_eq!(config.worker_program().unwrap(), PathBuf::from("/opt/bin/my-worker"));
    }

    #[test]
    fn default_worker_sits_next_to_current_executable() {
        let program = SupervisorConfig::default().worker_program().unwrap();
        let exe = std::env::current_exe().unwrap();
        assert_eq!(program.parent(), exe.parent());
        assert!(program.file_name().unwrap().to_string_lossy().starts_with(WORKER_PROGRAM));
    }
}
