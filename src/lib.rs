//! Gossip Node Library
//!
//! A single node's side of a topology-aware broadcast protocol:
//! - Deduplicated value store
//! - Neighbor fan-out from an externally assigned topology
//! - Acknowledged delivery with bounded retries
//! - Newline-delimited JSON messaging with request/reply correlation

pub mod error;
pub mod gossip;
pub mod network;
pub mod node;
pub mod types;

// Re-export core types for convenience
pub use error::NodeError;
pub use gossip::{Disseminator, GossipConfig, RetryCoordinator, SeenSet, TopologyTable};
pub use network::{Body, LineTransport, Message, Outbound};
pub use node::{GossipNode, NodeConfig, Router};
pub use types::{NodeId, RetryKey, Value};
