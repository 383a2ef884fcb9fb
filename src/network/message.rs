//! Wire envelope and message bodies.
//!
//! One JSON object per line:
//! `{"src": .., "dest": .., "body": {"type": .., "msg_id": .., ...}}`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::Result;
use crate::types::{NodeId, Value};

/// Message type names.
pub mod kinds {
    pub const INIT: &str = "init";
    pub const INIT_OK: &str = "init_ok";
    pub const ECHO: &str = "echo";
    pub const ECHO_OK: &str = "echo_ok";
    pub const GENERATE: &str = "generate";
    pub const GENERATE_OK: &str = "generate_ok";
    pub const BROADCAST: &str = "broadcast";
    pub const BROADCAST_OK: &str = "broadcast_ok";
    pub const TOPOLOGY: &str = "topology";
    pub const TOPOLOGY_OK: &str = "topology_ok";
    pub const READ: &str = "read";
    pub const READ_OK: &str = "read_ok";
    pub const ERROR: &str = "error";
}

/// Error codes carried in `error` bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Timeout = 0,
    NodeNotFound = 1,
    NotSupported = 10,
    TemporarilyUnavailable = 11,
    MalformedRequest = 12,
    Crash = 13,
}

/// Complete message with routing header.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sending node or client
    pub src: NodeId,

    /// Receiving node
    pub dest: NodeId,

    /// Typed payload
    pub body: Body,
}

/// Message payload: a type tag, optional correlation ids, and any other
/// fields the type carries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,

    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl Body {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Add a payload field.
    pub fn with(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Raw payload field.
    pub fn field(&self, key: &str) -> Option<&JsonValue> {
        self.fields.get(key)
    }

    /// Gossip a value to a peer.
    pub fn broadcast(value: Value) -> Self {
        Self::new(kinds::BROADCAST).with("message", value)
    }

    /// Error reply body.
    pub fn error(code: ErrorCode, text: impl Into<String>) -> Self {
        Self::new(kinds::ERROR)
            .with("code", code as u32)
            .with("text", text.into())
    }

    pub fn is_error(&self) -> bool {
        self.kind == kinds::ERROR
    }
}

impl Message {
    pub fn new(src: impl Into<NodeId>, dest: impl Into<NodeId>, body: Body) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            body,
        }
    }

    /// Build the reply to this message, correlated by `in_reply_to`.
    pub fn reply(&self, mut body: Body) -> Message {
        body.in_reply_to = self.body.msg_id;
        Message::new(self.dest.clone(), self.src.clone(), body)
    }

    /// Whether this message answers an earlier request.
    pub fn is_reply(&self) -> bool {
        self.body.in_reply_to.is_some()
    }

    /// Parse one line of input.
    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Serialize to a single line (no trailing newline).
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
