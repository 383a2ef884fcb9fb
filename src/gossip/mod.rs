//! Gossip dissemination engine.
//!
//! Implements reliable best-effort broadcast:
//! - Deduplication of accepted values
//! - Topology-driven fan-out
//! - Acknowledged delivery with bounded retries

pub mod disseminator;
pub mod retry;
pub mod store;
pub mod topology;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use disseminator::Disseminator;
pub use retry::RetryCoordinator;
pub use store::SeenSet;
pub use topology::TopologyTable;

/// Configuration for gossip delivery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GossipConfig {
    /// How long to wait for a peer's acknowledgment before resending
    pub retry_timeout_ms: u64,

    /// Delivery attempts per (peer, value) before giving up
    pub max_retries: u32,
}

impl GossipConfig {
    pub fn retry_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_timeout_ms)
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            retry_timeout_ms: 5000,
            max_retries: 10,
        }
    }
}
