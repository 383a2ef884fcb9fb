//! Topology-driven fan-out of newly accepted values.

use parking_lot::Mutex;
use std::sync::Arc;

use super::retry::RetryCoordinator;
use super::topology::TopologyTable;
use super::GossipConfig;
use crate::network::{Body, Outbound};
use crate::types::{NodeId, RetryKey, Value};

/// Pushes accepted values to this node's neighbors until each one
/// acknowledges or the retry budget runs out.
pub struct Disseminator {
    /// Our node ID
    local_id: NodeId,

    /// Configuration
    config: GossipConfig,

    /// Neighbor table
    topology: Arc<TopologyTable>,

    /// Pending deliveries
    retries: Arc<RetryCoordinator>,

    /// Where requests go
    outbound: Arc<dyn Outbound>,
}

impl Disseminator {
    pub fn new(
        local_id: NodeId,
        config: GossipConfig,
        topology: Arc<TopologyTable>,
        retries: Arc<RetryCoordinator>,
        outbound: Arc<dyn Outbound>,
    ) -> Arc<Self> {
        Arc::new(Self {
            local_id,
            config,
            topology,
            retries,
            outbound,
        })
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn retries(&self) -> &Arc<RetryCoordinator> {
        &self.retries
    }

    /// Neighbors that should receive a value delivered to us by `sender`.
    pub fn fan_out(&self, sender: &str) -> Vec<NodeId> {
        self.topology
            .neighbors_of(&self.local_id)
            .into_iter()
            .filter(|n| n != sender)
            .collect()
    }

    /// Start delivering `value` to every neighbor except `sender`.
    ///
    /// Each neighbor is served by its own task; nothing is awaited. Returns
    /// the targets that deliveries were started for.
    pub fn disseminate(self: &Arc<Self>, sender: &str, value: Value) -> Vec<NodeId> {
        let targets = self.fan_out(sender);
        tracing::debug!("Gossiping {} from {} to {:?}", value, sender, targets);

        for target in &targets {
            let this = Arc::clone(self);
            let target = target.clone();
            let budget = self.config.max_retries;
            tokio::spawn(async move {
                this.deliver(target, value, budget);
            });
        }

        targets
    }

    /// One delivery attempt. A timeout or send failure drops the attempt's
    /// reply callback and schedules the next attempt with one fewer left.
    fn deliver(self: &Arc<Self>, target: NodeId, value: Value, attempts_left: u32) {
        if attempts_left == 0 {
            tracing::warn!("Giving up delivering {} to {}", value, target);
            return;
        }

        let key = RetryKey::new(target.clone(), value);

        // msg_id of this attempt once it is on the wire
        let in_flight = Arc::new(Mutex::new(None::<u64>));

        let this = Arc::clone(self);
        let retry_target = target.clone();
        let abandoned = Arc::clone(&in_flight);
        self.retries.start(key.clone(), move || {
            if let Some(msg_id) = abandoned.lock().take() {
                this.outbound.forget(msg_id);
            }
            this.deliver(retry_target, value, attempts_left - 1);
        });

        let retries = Arc::clone(&self.retries);
        let ack_key = key.clone();
        let sent = {
            // Held across the send so an early expiry waits for the msg_id
            let mut slot = in_flight.lock();
            let sent = self.outbound.rpc(
                &target,
                Body::broadcast(value),
                Box::new(move |_reply| {
                    if retries.acknowledge(&ack_key) {
                        tracing::debug!("{} acknowledged", ack_key);
                    }
                }),
            );
            if let Ok(msg_id) = sent {
                *slot = Some(msg_id);
            }
            sent
        };

        if let Err(e) = sent {
            tracing::warn!("Send of {} failed ({} attempts left): {}", key, attempts_left - 1, e);
            self.retries.fail(&key);
        }
    }
}
