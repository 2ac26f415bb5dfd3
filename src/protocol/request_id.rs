//! Correlation ID type for task RPC messages.
//!
//! This module provides a type-safe wrapper for request IDs, preventing
//! confusion with other integer types.

use std::fmt;

use serde_json::Value;

/// Correlation ID linking a request to its response or error.
///
/// Scoped to the sending endpoint: each direction of a channel has its own
/// ID space, so a host request 3 and a task request 3 are unrelated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Create a new RequestId from a u64 value.
    #[inline]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value.
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Extract a RequestId from a wire value.
    ///
    /// Returns `None` for anything that is not a non-negative integer.
    pub(crate) fn from_json(value: &Value) -> Option<Self> {
        value.as_u64().map(Self)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<RequestId> for u64 {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

impl From<RequestId> for Value {
    fn from(id: RequestId) -> Self {
        Value::from(id.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
