//! Request handlers for an initialized node.

use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::gossip::topology::parse_topology;
use crate::gossip::{Disseminator, RetryCoordinator, SeenSet, TopologyTable};
use crate::network::{kinds, Body, Message, Outbound};
use crate::types::ids::IdGenerator;
use crate::types::{numeric_node_id, NodeId};

/// Dispatches inbound requests to the gossip engine and builds replies.
///
/// Sub-field problems (a non-integer `message`, a malformed topology) skip
/// the side effect and still produce the `_ok` reply.
pub struct Router {
    /// Our node ID
    node_id: NodeId,

    /// Every node in the cluster, as announced by init
    node_ids: Vec<NodeId>,

    /// Accepted values
    seen: Arc<SeenSet>,

    /// Neighbor table
    topology: Arc<TopologyTable>,

    /// Gossip fan-out
    gossip: Arc<Disseminator>,

    /// `None` when the node id has no numeric part
    ids: Option<IdGenerator>,
}

impl Router {
    pub fn new(
        node_id: NodeId,
        node_ids: Vec<NodeId>,
        config: &NodeConfig,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        let seen = Arc::new(SeenSet::new());
        let topology = Arc::new(TopologyTable::new());
        let retries = RetryCoordinator::new(config.gossip.retry_timeout());
        let gossip = Disseminator::new(
            node_id.clone(),
            config.gossip.clone(),
            Arc::clone(&topology),
            retries,
            outbound,
        );
        let ids = numeric_node_id(&node_id).map(|n| IdGenerator::new(n, config.ids.epoch_ms));

        Self {
            node_id,
            node_ids,
            seen,
            topology,
            gossip,
            ids,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    pub fn seen(&self) -> &Arc<SeenSet> {
        &self.seen
    }

    pub fn topology(&self) -> &Arc<TopologyTable> {
        &self.topology
    }

    pub fn gossip(&self) -> &Arc<Disseminator> {
        &self.gossip
    }

    /// Handle a request and return the reply body.
    pub fn handle(&self, msg: &Message) -> Result<Body> {
        match msg.body.kind.as_str() {
            kinds::ECHO => Ok(self.handle_echo(msg)),
            kinds::GENERATE => self.handle_generate(msg),
            kinds::BROADCAST => Ok(self.handle_broadcast(msg)),
            kinds::TOPOLOGY => Ok(self.handle_topology(msg)),
            kinds::READ => Ok(self.handle_read()),
            other => Err(NodeError::NotSupported(other.to_string())),
        }
    }

    /// Input body with its type swapped for `kind`; `msg_id` and every
    /// payload field are kept.
    fn echoed(msg: &Message, kind: &str) -> Body {
        Body {
            kind: kind.to_string(),
            msg_id: msg.body.msg_id,
            in_reply_to: None,
            fields: msg.body.fields.clone(),
        }
    }

    fn handle_echo(&self, msg: &Message) -> Body {
        Self::echoed(msg, kinds::ECHO_OK)
    }

    fn handle_generate(&self, msg: &Message) -> Result<Body> {
        let ids = self.ids.as_ref().ok_or_else(|| {
            NodeError::Config(format!("Node id {} has no numeric part", self.node_id))
        })?;

        Ok(Self::echoed(msg, kinds::GENERATE_OK).with("id", ids.next_id()))
    }

    fn handle_broadcast(&self, msg: &Message) -> Body {
        match msg.body.field("message").and_then(JsonValue::as_i64) {
            Some(value) => {
                if !self.seen.contains(value) && self.seen.insert(value) {
                    self.gossip.disseminate(&msg.src, value);
                }
            }
            None => {
                tracing::warn!(
                    "Ignoring broadcast from {} without integer message: {:?}",
                    msg.src,
                    msg.body.field("message")
                );
            }
        }

        Body::new(kinds::BROADCAST_OK)
    }

    fn handle_topology(&self, msg: &Message) -> Body {
        match msg.body.field("topology").and_then(parse_topology) {
            Some(topology) => {
                tracing::info!(
                    "Topology updated, neighbors of {}: {:?}",
                    self.node_id,
                    topology.get(&self.node_id)
                );
                self.topology.replace(topology);
            }
            None => tracing::warn!("Ignoring topology from {} without a node map", msg.src),
        }

        Body::new(kinds::TOPOLOGY_OK)
    }

    fn handle_read(&self) -> Body {
        Body::new(kinds::READ_OK).with("messages", self.seen.snapshot())
    }
}
