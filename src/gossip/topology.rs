//! Neighbor table assigned by `topology` messages.

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::NodeId;

/// Node id -> ordered neighbor list.
pub type Topology = HashMap<NodeId, Vec<NodeId>>;

/// The single active topology.
///
/// Absent until the first `replace`; each later `replace` swaps the whole
/// map, so readers see either the old table or the new one.
#[derive(Debug, Default)]
pub struct TopologyTable {
    current: RwLock<Option<Arc<Topology>>>,
}

impl TopologyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new topology, discarding the previous one entirely.
    pub fn replace(&self, topology: Topology) {
        *self.current.write() = Some(Arc::new(topology));
    }

    /// Configured neighbors of `node`, or empty if unknown.
    pub fn neighbors_of(&self, node: &str) -> Vec<NodeId> {
        self.current
            .read()
            .as_ref()
            .and_then(|t| t.get(node).cloned())
            .unwrap_or_default()
    }

    /// Whether any topology has been installed yet.
    pub fn is_configured(&self) -> bool {
        self.current.read().is_some()
    }
}

/// Build a topology from the JSON `topology` field.
///
/// Entries whose value is not a list made only of strings are skipped.
/// Returns `None` if the field itself is not an object.
pub fn parse_topology(raw: &JsonValue) -> Option<Topology> {
    let entries = raw.as_object()?;
    let mut topology = Topology::with_capacity(entries.len());

    for (node, neighbors) in entries {
        match serde_json::from_value::<Vec<NodeId>>(neighbors.clone()) {
            Ok(list) => {
                topology.insert(node.clone(), list);
            }
            Err(e) => {
                tracing::warn!("Skipping malformed topology entry for {}: {}", node, e);
            }
        }
    }

    Some(topology)
}
