//! Domain events emitted by the aggregates
//!
//! Events are snapshots: they carry ids, names, versions, and copied config
//! or port data, never references into aggregate state. Write-events carry
//! the node version that was current at emission time - that version is the
//! handshake between user edits and late-arriving generation results.

use crate::config::NodeConfig;
use crate::id::{GraphId, ImageId, NodeId};
use crate::node::{InputName, OutputName};
use crate::node_type::NodeType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the aggregates can emit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    GraphCreated {
        graph_id: GraphId,
        name: String,
    },
    NodeAdded {
        graph_id: GraphId,
        node_id: NodeId,
        node_type: NodeType,
        name: String,
    },
    NodeRenamed {
        graph_id: GraphId,
        node_id: NodeId,
        name: String,
    },
    NodeConfigChanged {
        graph_id: GraphId,
        node_id: NodeId,
        node_version: u64,
        config: NodeConfig,
    },
    NodeRemoved {
        graph_id: GraphId,
        node_id: NodeId,
    },
    NodeInputConnected {
        graph_id: GraphId,
        node_id: NodeId,
        input: InputName,
        from_node: NodeId,
        from_output: OutputName,
    },
    NodeInputDisconnected {
        graph_id: GraphId,
        node_id: NodeId,
        input: InputName,
        from_node: NodeId,
        from_output: OutputName,
    },
    NodeOutputImageSet {
        graph_id: GraphId,
        node_id: NodeId,
        node_version: u64,
        node_type: NodeType,
        output: OutputName,
        image_id: ImageId,
    },
    NodeOutputImageUnset {
        graph_id: GraphId,
        node_id: NodeId,
        output: OutputName,
        /// The image that was removed, for blob cleanup
        image_id: ImageId,
    },
    NodePreviewSet {
        graph_id: GraphId,
        node_id: NodeId,
        node_version: u64,
        image_id: ImageId,
    },
    NodePreviewUnset {
        graph_id: GraphId,
        node_id: NodeId,
        image_id: ImageId,
    },
    /// A node became ready: all inputs present, config in place
    ///
    /// Carries everything the generation layer needs so it never has to read
    /// the aggregate back.
    NodeNeedsOutputs {
        graph_id: GraphId,
        node_id: NodeId,
        node_version: u64,
        node_type: NodeType,
        config: NodeConfig,
        inputs: BTreeMap<InputName, ImageId>,
    },
    LayoutUpdated {
        graph_id: GraphId,
    },
    ViewportUpdated {
        graph_id: GraphId,
    },
}

impl DomainEvent {
    /// The graph this event belongs to
    pub fn graph_id(&self) -> GraphId {
        match self {
            DomainEvent::GraphCreated { graph_id, .. }
            | DomainEvent::NodeAdded { graph_id, .. }
            | DomainEvent::NodeRenamed { graph_id, .. }
            | DomainEvent::NodeConfigChanged { graph_id, .. }
            | DomainEvent::NodeRemoved { graph_id, .. }
            | DomainEvent::NodeInputConnected { graph_id, .. }
            | DomainEvent::NodeInputDisconnected { graph_id, .. }
            | DomainEvent::NodeOutputImageSet { graph_id, .. }
            | DomainEvent::NodeOutputImageUnset { graph_id, .. }
            | DomainEvent::NodePreviewSet { graph_id, .. }
            | DomainEvent::NodePreviewUnset { graph_id, .. }
            | DomainEvent::NodeNeedsOutputs { graph_id, .. }
            | DomainEvent::LayoutUpdated { graph_id }
            | DomainEvent::ViewportUpdated { graph_id } => *graph_id,
        }
    }

    /// The node this event concerns, if it is node-scoped
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            DomainEvent::NodeAdded { node_id, .. }
            | DomainEvent::NodeRenamed { node_id, .. }
            | DomainEvent::NodeConfigChanged { node_id, .. }
            | DomainEvent::NodeRemoved { node_id, .. }
            | DomainEvent::NodeInputConnected { node_id, .. }
            | DomainEvent::NodeInputDisconnected { node_id, .. }
            | DomainEvent::NodeOutputImageSet { node_id, .. }
            | DomainEvent::NodeOutputImageUnset { node_id, .. }
            | DomainEvent::NodePreviewSet { node_id, .. }
            | DomainEvent::NodePreviewUnset { node_id, .. }
            | DomainEvent::NodeNeedsOutputs { node_id, .. } => Some(*node_id),
            DomainEvent::GraphCreated { .. }
            | DomainEvent::LayoutUpdated { .. }
            | DomainEvent::ViewportUpdated { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_serialization() {
        let event = DomainEvent::NodeRemoved {
            graph_id: GraphId::nil(),
            node_id: NodeId::nil(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "node_removed");
    }

    #[test]
    fn test_accessors() {
        let graph_id = GraphId::new();
        let node_id = NodeId::new();
        let event = DomainEvent::NodeAdded {
            graph_id,
            node_id,
            node_type: NodeType::Blur,
            name: "blur".to_string(),
        };
        assert_eq!(event.graph_id(), graph_id);
        assert_eq!(event.node_id(), Some(node_id));

        let event = DomainEvent::LayoutUpdated { graph_id };
        assert_eq!(event.node_id(), None);
    }
}
