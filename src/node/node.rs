//! Gossip node runtime.
//!
//! Reads one message per line, answers `init`, routes replies to pending
//! requests, and hands every other request to the router on its own task.

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, warn};

use super::config::NodeConfig;
use super::router::Router;
use crate::error::{NodeError, Result};
use crate::network::{kinds, Body, LineTransport, Message, Outbound};
use crate::types::NodeId;

/// A single node's participation in the cluster.
pub struct GossipNode {
    /// Configuration
    config: NodeConfig,

    /// Message transport
    transport: Arc<LineTransport>,

    /// Request handlers, built on init
    router: RwLock<Option<Arc<Router>>>,
}

impl GossipNode {
    pub fn new(config: NodeConfig) -> Arc<Self> {
        let transport = Arc::new(LineTransport::new(config.transport.clone()));

        Arc::new(Self {
            config,
            transport,
            router: RwLock::new(None),
        })
    }

    pub fn transport(&self) -> &Arc<LineTransport> {
        &self.transport
    }

    /// Router of an initialized node.
    pub fn router(&self) -> Option<Arc<Router>> {
        self.router.read().clone()
    }

    /// Node ID assigned by init.
    pub fn node_id(&self) -> Option<NodeId> {
        self.transport.local_id()
    }

    /// Process input lines until EOF.
    pub async fn run<R>(self: &Arc<Self>, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            self.handle_line(&line);
        }

        info!("Input closed, shutting down");
        Ok(())
    }

    /// Process one input line.
    ///
    /// Replies and `init` are handled inline so that later lines observe
    /// them; requests run on their own task.
    pub fn handle_line(self: &Arc<Self>, line: &str) {
        let msg = match Message::from_line(line) {
            Ok(msg) => msg,
            Err(e) => {
                error!("Dropping unparseable message {:?}: {}", line, e);
                return;
            }
        };

        if msg.is_reply() {
            self.transport.handle_reply(msg);
            return;
        }

        if msg.body.kind == kinds::INIT {
            let result = self.handle_init(&msg);
            self.respond(&msg, result);
            return;
        }

        let node = Arc::clone(self);
        tokio::spawn(async move {
            let result = match node.router() {
                Some(router) => router.handle(&msg),
                None => Err(NodeError::NotInitialized),
            };
            node.respond(&msg, result);
        });
    }

    fn handle_init(&self, msg: &Message) -> Result<Body> {
        let node_id = msg
            .body
            .field("node_id")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| NodeError::Malformed("init without node_id".to_string()))?
            .to_string();

        let node_ids: Vec<NodeId> = match msg.body.field("node_ids") {
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| NodeError::Malformed(format!("init node_ids: {}", e)))?,
            None => Vec::new(),
        };

        if let Some(previous) = self.node_id() {
            warn!("Re-initializing node {} as {}", previous, node_id);
        }

        self.transport.set_local_id(node_id.clone());
        let outbound: Arc<dyn Outbound> = self.transport.clone();
        let router = Router::new(node_id.clone(), node_ids, &self.config, outbound);
        *self.router.write() = Some(Arc::new(router));

        info!("Initialized node {}", node_id);
        Ok(Body::new(kinds::INIT_OK))
    }

    /// Send the reply (or error) for a request.
    fn respond(&self, msg: &Message, result: Result<Body>) {
        let body = result.unwrap_or_else(|e| {
            debug!("Request {:?} from {} failed: {}", msg.body.kind, msg.src, e);
            Body::error(e.code(), e.to_string())
        });

        if let Err(e) = self.transport.send(msg.reply(body)) {
            warn!("Failed to reply to {}: {}", msg.src, e);
        }
    }
}
