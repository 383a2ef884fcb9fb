//! Gossip node.
//!
//! Combines the gossip engine and the line transport into a runnable node:
//! - Configuration
//! - Request routing
//! - The input loop

pub mod config;
pub mod node;
pub mod router;

pub use config::NodeConfig;
pub use node::GossipNode;
pub use router::Router;
