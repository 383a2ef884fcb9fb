#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gossip_node::error::Result;
use gossip_node::network::{Body, Message, Outbound, ReplyCallback};
use gossip_node::node::{GossipNode, NodeConfig};
use gossip_node::types::NodeId;

/// Outbound that records every request and lets the test answer them.
#[derive(Default)]
pub struct RecordingOutbound {
    pub sent: Mutex<Vec<(NodeId, Body)>>,
    callbacks: Mutex<Vec<(u64, NodeId, ReplyCallback)>>,
}

impl RecordingOutbound {
    pub fn sends_to(&self, dest: &str) -> usize {
        self.sent.lock().iter().filter(|(d, _)| d == dest).count()
    }

    pub fn destinations(&self) -> HashSet<NodeId> {
        self.sent.lock().iter().map(|(d, _)| d.clone()).collect()
    }

    /// Requests still waiting for a reply.
    pub fn awaiting_reply(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Answer every outstanding request from `peer`.
    pub fn ack_from(&self, peer: &str) {
        let ready: Vec<ReplyCallback> = {
            let mut callbacks = self.callbacks.lock();
            let (matching, rest): (Vec<_>, Vec<_>) =
                callbacks.drain(..).partition(|(_, d, _)| d == peer);
            *callbacks = rest;
            matching.into_iter().map(|(_, _, cb)| cb).collect()
        };

        for cb in ready {
            cb(Message::new(peer, "n1", Body::new("broadcast_ok")));
        }
    }
}

impl Outbound for RecordingOutbound {
    fn rpc(&self, dest: &str, body: Body, on_reply: ReplyCallback) -> Result<u64> {
        let msg_id = {
            let mut sent = self.sent.lock();
            sent.push((dest.to_string(), body));
            sent.len() as u64
        };
        self.callbacks.lock().push((msg_id, dest.to_string(), on_reply));
        Ok(msg_id)
    }

    fn forget(&self, msg_id: u64) {
        self.callbacks.lock().retain(|(id, _, _)| *id != msg_id);
    }

    fn send(&self, _message: Message) -> Result<()> {
        Ok(())
    }
}

/// In-process cluster: every node's output lines are delivered to the
/// destination node, or collected if addressed to a client.
pub struct TestCluster {
    pub nodes: HashMap<NodeId, Arc<GossipNode>>,
    client_inbox: Arc<Mutex<Vec<Message>>>,
    cut_links: Arc<Mutex<HashSet<(NodeId, NodeId)>>>,
    gossiped: Arc<Mutex<HashMap<(NodeId, NodeId), usize>>>,
    next_msg_id: AtomicU64,
}

impl TestCluster {
    pub async fn start(ids: &[&str], config: NodeConfig) -> Self {
        let node_ids: Vec<NodeId> = ids.iter().map(|s| s.to_string()).collect();
        let nodes: HashMap<NodeId, Arc<GossipNode>> = node_ids
            .iter()
            .map(|id| (id.clone(), GossipNode::new(config.clone())))
            .collect();

        let cluster = Self {
            nodes,
            client_inbox: Arc::new(Mutex::new(Vec::new())),
            cut_links: Arc::new(Mutex::new(HashSet::new())),
            gossiped: Arc::new(Mutex::new(HashMap::new())),
            next_msg_id: AtomicU64::new(1),
        };

        for (id, node) in &cluster.nodes {
            let mut rx = node.transport().take_receiver().unwrap();
            let peers = cluster.nodes.clone();
            let inbox = Arc::clone(&cluster.client_inbox);
            let cut = Arc::clone(&cluster.cut_links);
            let gossiped = Arc::clone(&cluster.gossiped);
            let src = id.clone();

            tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    let msg = Message::from_line(&line).unwrap();
                    match peers.get(&msg.dest) {
                        Some(peer) => {
                            if cut.lock().contains(&(src.clone(), msg.dest.clone())) {
                                continue;
                            }
                            if msg.body.kind == "broadcast" {
                                *gossiped
                                    .lock()
                                    .entry((src.clone(), msg.dest.clone()))
                                    .or_default() += 1;
                            }
                            peer.handle_line(&line);
                        }
                        None => inbox.lock().push(msg),
                    }
                }
            });
        }

        for id in &node_ids {
            let reply = cluster
                .request(id, json!({"type": "init", "node_id": id, "node_ids": node_ids}))
                .await;
            assert_eq!(reply.body.kind, "init_ok");
        }

        cluster
    }

    /// Send a client request to `node` and wait for its reply.
    pub async fn request(&self, node: &str, mut body: JsonValue) -> Message {
        let msg_id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
        body["msg_id"] = json!(msg_id);
        let line = json!({"src": "c1", "dest": node, "body": body}).to_string();
        self.nodes[node].handle_line(&line);

        for _ in 0..400 {
            let found = {
                let mut inbox = self.client_inbox.lock();
                inbox
                    .iter()
                    .position(|m| m.body.in_reply_to == Some(msg_id))
                    .map(|i| inbox.remove(i))
            };
            if let Some(reply) = found {
                return reply;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("No reply from {} to msg {}", node, msg_id);
    }

    pub async fn read(&self, node: &str) -> Vec<i64> {
        let reply = self.request(node, json!({"type": "read"})).await;
        assert_eq!(reply.body.kind, "read_ok");
        serde_json::from_value(reply.body.field("messages").unwrap().clone()).unwrap()
    }

    /// Drop all traffic from `a` to `b` and from `b` to `a`.
    pub fn cut(&self, a: &str, b: &str) {
        let mut cut = self.cut_links.lock();
        cut.insert((a.to_string(), b.to_string()));
        cut.insert((b.to_string(), a.to_string()));
    }

    pub fn heal(&self) {
        self.cut_links.lock().clear();
    }

    /// Gossip requests delivered from `src` to `dest` so far. Replies are
    /// not counted.
    pub fn gossiped(&self, src: &str, dest: &str) -> usize {
        self.gossiped
            .lock()
            .get(&(src.to_string(), dest.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Poll until every node reports `expected`, or panic.
    pub async fn wait_for_convergence(&self, expected: &[i64]) {
        for _ in 0..400 {
            let mut converged = true;
            for id in self.nodes.keys() {
                if self.read(id).await != expected {
                    converged = false;
                    break;
                }
            }
            if converged {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Cluster did not converge on {:?}", expected);
    }
}

/// Config with short retry timeouts for real-time cluster tests.
pub fn fast_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.gossip.retry_timeout_ms = 50;
    config
}
