//! Error handling types for taskbridge
//!
//! This module provides the error taxonomy shared by the channel, the
//! request/response layer, the supervisor and the bridges.

use std::fmt;
use std::sync::PoisonError;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error condition carried by an `Error` message.
///
/// Handlers raise a `Fault` when servicing a request fails. It crosses the
/// channel verbatim as the error payload and is re-raised on the calling side
/// as [`RpcError::Remote`], where it compares equal to the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    /// Condition name (e.g. `BoomCondition`)
    pub name: String,
    /// Human-readable message
    pub message: String,
    /// Optional additional data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Fault {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Raised for a request naming a method that has no registered handler.
    pub fn unknown_method(method: &str) -> Self {
        Self::new("UnknownMethod", format!("no handler registered for `{method}`"))
    }

    /// Raised when a handler receives arguments it cannot use.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new("InvalidArguments", message)
    }

    /// Serialize into a wire payload.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(self.to_string()))
    }

    /// Rebuild a fault from a wire payload.
    ///
    /// Payloads that are not fault-shaped (a peer sent a bare string, say) are
    /// wrapped in a generic `Error` fault that keeps the original value as data.
    pub fn from_payload(payload: Value) -> Self {
        match serde_json::from_value::<Fault>(payload.clone()) {
            Ok(fault) => fault,
            Err(_) => {
                let message = match &payload {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Self::new("Error", message).with_data(payload)
            }
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for Fault {}

/// A resolved task implementation lacks methods its bridge requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task `{implementation}` does not implement {missing:?} required by the {bridge} bridge")]
pub struct ContractViolation {
    pub bridge: String,
    pub implementation: String,
    pub missing: Vec<String>,
}

/// Comprehensive error type for task RPC operations
#[derive(Debug, Error)]
pub enum RpcError {
    /// The channel ended while a call awaited its response, or the call was
    /// issued after the channel closed
    #[error("channel closed while waiting for response")]
    ChannelClosed,

    /// The far end's handler raised a condition
    #[error("remote error: {0}")]
    Remote(Fault),

    /// The task implementation does not satisfy its bridge
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    /// A bridge or task implementation name is not registered
    #[error("unknown {kind}: {name}")]
    Resolve { kind: &'static str, name: String },

    /// The task never signalled readiness
    #[error("task did not become ready within {0:?}")]
    HandshakeTimeout(Duration),

    /// A wire message could not be decoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// True for the transport-closed condition.
    ///
    /// Teardown treats this condition as success.
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, RpcError::ChannelClosed)
    }

    /// The remote fault, if this error came from the far end.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            RpcError::Remote(fault) => Some(fault),
            _ => None,
        }
    }

    pub fn resolve(kind: &'static str, name: impl Into<String>) -> Self {
        RpcError::Resolve {
            kind,
            name: name.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        RpcError::Protocol(message.into())
    }
}

impl From<Fault> for RpcError {
    fn from(fault: Fault) -> Self {
        RpcError::Remote(fault)
    }
}

/// Result type for task RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Helper trait to recover from poisoned locks.
pub trait LockResultExt<T> {
    /// Recover the guard from a poisoned lock, logging the context.
    ///
    /// The context parameter identifies which operation triggered lock recovery,
    /// helping developers debug thread safety issues.
    fn recover_poison(self, context: &str) -> T;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    target: "taskbridge::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                poisoned.into_inner()
            }
        }
    }
}
