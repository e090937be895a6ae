//! Per-graph notification fan-out
//!
//! Subscribers get a bounded channel of JSON-serializable notifications.
//! This is a UI convenience feed: a subscriber that cannot keep up (full
//! queue) or has gone away (closed channel) is dropped silently rather than
//! back-pressuring graph mutations.

use dashmap::DashMap;
use pixelgraph_core::{GraphId, ImageId, NodeId, OutputName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

/// Lifecycle tag on a node update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeUpdateState {
    Added,
    Removed,
    Connected,
    Disconnected,
    Processing,
    Completed,
}

/// One node changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<NodeUpdateState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<OutputName, ImageId>>,
}

/// Payload pushed to subscribers of one graph's topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A node changed; `state`/`outputs` say how
    Node(NodeUpdate),
    /// Layout or viewport changed; clients refetch
    Layout,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Notification>,
}

/// Fan-out registry of per-graph subscribers
#[derive(Default)]
pub struct Notifier {
    subscribers: DashMap<GraphId, Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// Handle returned by [`Notifier::subscribe`]; used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for one graph's updates
    pub fn subscribe(&self, graph_id: GraphId) -> (SubscriptionId, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(graph_id)
            .or_default()
            .push(Subscriber { id, tx });
        (SubscriptionId(id), rx)
    }

    pub fn unsubscribe(&self, graph_id: GraphId, subscription: SubscriptionId) {
        if let Some(mut entry) = self.subscribers.get_mut(&graph_id) {
            entry.retain(|s| s.id != subscription.0);
        }
    }

    pub fn subscriber_count(&self, graph_id: GraphId) -> usize {
        self.subscribers
            .get(&graph_id)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Push a node update to every subscriber of the graph
    pub fn broadcast_node_update(&self, graph_id: GraphId, update: NodeUpdate) {
        self.broadcast(graph_id, Notification::Node(update));
    }

    /// Push the layout-changed signal to every subscriber of the graph
    pub fn broadcast_layout_update(&self, graph_id: GraphId) {
        self.broadcast(graph_id, Notification::Layout);
    }

    fn broadcast(&self, graph_id: GraphId, notification: Notification) {
        let Some(mut entry) = self.subscribers.get_mut(&graph_id) else {
            return;
        };
        // Drop-slowest: a full or closed sink loses its subscription.
        entry.retain(|subscriber| match subscriber.tx.try_send(notification.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(graph_id = %graph_id, "dropping slow notification subscriber");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Terminate all sinks
    pub fn close(&self) {
        self.subscribers.clear();
    }
}
