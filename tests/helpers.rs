//! Shared helpers for supervisor tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::Value;
use taskbridge::{ExecutionMode, SupervisorConfig, TaskSupervisor};

/// Supervisor spawning the crate's own worker binary.
pub fn forked_supervisor() -> TaskSupervisor {
    forked_config(SupervisorConfig::default())
}

pub fn forked_config(config: SupervisorConfig) -> TaskSupervisor {
    let config = config
        .with_mode(ExecutionMode::Forked)
        .with_worker(env!("CARGO_BIN_EXE_taskbridge-worker"));
    TaskSupervisor::new(config).expect("valid config")
}

pub fn in_process_supervisor() -> TaskSupervisor {
    TaskSupervisor::new(SupervisorConfig::default().with_mode(ExecutionMode::InProcess))
        .expect("valid config")
}

/// Shared log of values handed to a producer callback.
#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Vec<Value>>>);

impl Recorded {
    pub fn sink(&self) -> impl Fn(Value) + Send + Sync + 'static {
        let inner = Arc::clone(&self.0);
        move |value| inner.lock().unwrap().push(value)
    }

    pub fn values(&self) -> Vec<Value> {
        self.0.lock().unwrap().clone()
    }
}
