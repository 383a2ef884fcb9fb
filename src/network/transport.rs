//! Line-oriented transport with request/reply correlation.
//!
//! Outbound messages are serialized and queued on a bounded channel that a
//! single writer task drains, so lines never interleave. Requests sent with
//! [`Outbound::rpc`] get a fresh `msg_id`; the matching reply is routed to
//! the registered callback instead of the message router.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::message::{Body, Message};
use crate::error::{NodeError, Result};
use crate::types::NodeId;

/// Invoked with the reply to an earlier request.
pub type ReplyCallback = Box<dyn FnOnce(Message) + Send + Sync + 'static>;

/// Outbound half of the substrate, as seen by the gossip engine.
pub trait Outbound: Send + Sync + 'static {
    /// Send a request to `dest`. `on_reply` runs when a correlated reply
    /// arrives. Returns the request's `msg_id`, or an error if the send
    /// cannot be attempted at all.
    fn rpc(&self, dest: &str, body: Body, on_reply: ReplyCallback) -> Result<u64>;

    /// Stop waiting for a reply to `msg_id`. A reply arriving later is
    /// dropped.
    fn forget(&self, msg_id: u64);

    /// Send a message without expecting a reply.
    fn send(&self, message: Message) -> Result<()>;
}

/// Transport configuration.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TransportConfig {
    /// Lines that may be queued for the writer before sends fail
    pub outbound_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 10_000,
        }
    }
}

/// Newline-delimited JSON transport.
pub struct LineTransport {
    /// Our node ID, known after init
    local_id: RwLock<Option<NodeId>>,

    /// Next outbound msg_id
    next_msg_id: AtomicU64,

    /// Reply callbacks by msg_id
    callbacks: DashMap<u64, ReplyCallback>,

    /// Serialized lines for the writer task
    outgoing_tx: mpsc::Sender<String>,
    outgoing_rx: RwLock<Option<mpsc::Receiver<String>>>,
}

impl LineTransport {
    /// Create a new transport.
    pub fn new(config: TransportConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.outbound_buffer.max(1));

        Self {
            local_id: RwLock::new(None),
            next_msg_id: AtomicU64::new(1),
            callbacks: DashMap::new(),
            outgoing_tx: tx,
            outgoing_rx: RwLock::new(Some(rx)),
        }
    }

    /// Take the outgoing line receiver.
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<String>> {
        self.outgoing_rx.write().take()
    }

    /// Record the node ID assigned by init.
    pub fn set_local_id(&self, id: NodeId) {
        *self.local_id.write() = Some(id);
    }

    pub fn local_id(&self) -> Option<NodeId> {
        self.local_id.read().clone()
    }

    /// Route a reply to its callback. Returns false if no request with that
    /// msg_id is outstanding.
    pub fn handle_reply(&self, message: Message) -> bool {
        let Some(id) = message.body.in_reply_to else {
            return false;
        };

        match self.callbacks.remove(&id) {
            Some((_, on_reply)) => {
                on_reply(message);
                true
            }
            None => {
                tracing::debug!("Dropping reply {} from {} with no pending request", id, message.src);
                false
            }
        }
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        self.callbacks.len()
    }
}

impl Outbound for LineTransport {
    fn rpc(&self, dest: &str, mut body: Body, on_reply: ReplyCallback) -> Result<u64> {
        let src = self.local_id().ok_or(NodeError::NotInitialized)?;
        let msg_id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
        body.msg_id = Some(msg_id);

        self.callbacks.insert(msg_id, on_reply);

        if let Err(e) = self.send(Message::new(src, dest, body)) {
            self.callbacks.remove(&msg_id);
            return Err(e);
        }

        Ok(msg_id)
    }

    fn forget(&self, msg_id: u64) {
        self.callbacks.remove(&msg_id);
    }

    fn send(&self, message: Message) -> Result<()> {
        let line = message.to_line()?;

        self.outgoing_tx.try_send(line).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                NodeError::Transport("Outbound queue full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                NodeError::Transport("Outbound writer closed".to_string())
            }
        })
    }
}

/// Drain queued lines to `writer`, one per line, until the channel closes.
pub async fn write_lines<W>(mut rx: mpsc::Receiver<String>, writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
