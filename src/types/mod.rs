//! Core type definitions for the gossip node.
//!
//! Values are the unit of gossip, node ids come from the substrate, and a
//! retry key names one in-flight delivery of a value to a peer.

pub mod ids;

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Opaque gossip payload. Identity is by equality; ordering is only used
/// for reporting.
pub type Value = i64;

/// Node or client identifier as assigned by the substrate (`"n1"`, `"c4"`).
pub type NodeId = String;

/// Identifies one outstanding delivery attempt: a value on its way to a peer.
///
/// Successive retries of the same logical send derive the same key, so a new
/// attempt supersedes the previous one in the retry coordinator.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RetryKey {
    /// Peer the value is being delivered to
    pub target: NodeId,

    /// The value being delivered
    pub value: Value,
}

impl RetryKey {
    pub fn new(target: impl Into<NodeId>, value: Value) -> Self {
        Self {
            target: target.into(),
            value,
        }
    }
}

impl fmt::Debug for RetryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RetryKey({}:{})", self.target, self.value)
    }
}

impl fmt::Display for RetryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target, self.value)
    }
}

/// Numeric part of a node id (`"n12"` -> 12).
///
/// The first character is the role prefix and is ignored.
pub fn numeric_node_id(node_id: &str) -> Option<u64> {
    let mut chars = node_id.chars();
    chars.next()?;
    chars.as_str().parse().ok()
}
