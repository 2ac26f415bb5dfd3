//! Task lifecycle states and identifiers.

use std::fmt;

use ulid::Ulid;

/// State of a supervised task.
///
/// Transitions:
/// - Creating -> Ready (task called the producer's `ready`)
/// - Ready -> Running (first call on the task)
/// - Ready | Running -> TearingDown (teardown requested)
/// - Creating -> Closed (handshake failed)
/// - TearingDown -> Closed (channel closed, worker reaped; terminal state)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Started, awaiting `ready`
    Creating,
    /// Handshake complete, no calls yet
    Ready,
    /// At least one call issued
    Running,
    /// `teardown` in progress; new calls are refused
    TearingDown,
    /// Channel closed (terminal state)
    Closed,
}

impl TaskState {
    /// Whether calls may be issued in this state.
    pub fn accepts_calls(self) -> bool {
        matches!(self, TaskState::Ready | TaskState::Running)
    }
}

/// Unique identifier of a task instance, used in log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Ulid);

impl TaskId {
    pub(crate) fn new() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
