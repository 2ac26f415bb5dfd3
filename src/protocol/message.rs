//! Wire messages exchanged between host and task.
//!
//! Every message is a JSON array whose first element is a small integer tag:
//!
//! ```text
//! [0, id, method, args]   request
//! [1, id, result]         response
//! [2, id, error]          error
//! ```

use serde_json::Value;

use super::RequestId;
use crate::error::RpcError;

/// Tag identifying the shape of a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    Request = 0,
    Response = 1,
    Error = 2,
}

impl MessageTag {
    fn from_json(value: &Value) -> Option<Self> {
        match value.as_u64()? {
            0 => Some(MessageTag::Request),
            1 => Some(MessageTag::Response),
            2 => Some(MessageTag::Error),
            _ => None,
        }
    }
}

/// Unit of transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: RequestId,
        method: String,
        args: Vec<Value>,
    },
    Response {
        id: RequestId,
        result: Value,
    },
    Error {
        id: RequestId,
        payload: Value,
    },
}

impl Message {
    pub fn request(id: RequestId, method: impl Into<String>, args: Vec<Value>) -> Self {
        Message::Request {
            id,
            method: method.into(),
            args,
        }
    }

    pub fn id(&self) -> RequestId {
        match self {
            Message::Request { id, .. } | Message::Response { id, .. } | Message::Error { id, .. } => {
                *id
            }
        }
    }

    pub fn tag(&self) -> MessageTag {
        match self {
            Message::Request { .. } => MessageTag::Request,
            Message::Response { .. } => MessageTag::Response,
            Message::Error { .. } => MessageTag::Error,
        }
    }

    /// Encode into the tagged array form.
    pub fn to_json(&self) -> Value {
        let tag = Value::from(self.tag() as u8);
        match self {
            Message::Request { id, method, args } => Value::Array(vec![
                tag,
                (*id).into(),
                Value::String(method.clone()),
                Value::Array(args.clone()),
            ]),
            Message::Response { id, result } => Value::Array(vec![tag, (*id).into(), result.clone()]),
            Message::Error { id, payload } => Value::Array(vec![tag, (*id).into(), payload.clone()]),
        }
    }

    /// Decode from the tagged array form.
    pub fn from_json(value: Value) -> Result<Self, RpcError> {
        let Value::Array(mut items) = value else {
            return Err(RpcError::protocol("message is not an array"));
        };

        let tag = items
            .first()
            .and_then(MessageTag::from_json)
            .ok_or_else(|| RpcError::protocol("missing or unknown message tag"))?;
        let expected_len = match tag {
            MessageTag::Request => 4,
            MessageTag::Response | MessageTag::Error => 3,
        };
        if items.len() != expected_len {
            return Err(RpcError::protocol(format!(
                "{:?} message has {} elements, expected {}",
                tag,
                items.len(),
                expected_len
            )));
        }
        let id = RequestId::from_json(&items[1])
            .ok_or_else(|| RpcError::protocol("message id is not an unsigned integer"))?;

        // Pop from the back so the payload values move out without cloning.
        match tag {
            MessageTag::Request => {
                let args = match items.pop() {
                    Some(Value::Array(args)) => args,
                    _ => return Err(RpcError::protocol("request arguments are not an array")),
                };
                let method = match items.pop() {
                    Some(Value::String(method)) => method,
                    _ => return Err(RpcError::protocol("request method is not a string")),
                };
                Ok(Message::Request { id, method, args })
            }
            MessageTag::Response => Ok(Message::Response {
                id,
                result: items.pop().unwrap_or(Value::Null),
            }),
            MessageTag::Error => Ok(Message::Error {
                id,
                payload: items.pop().unwrap_or(Value::Null),
            }),
        }
    }
}
