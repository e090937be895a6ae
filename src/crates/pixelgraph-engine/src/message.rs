//! Commands and message-kind discriminants
//!
//! A [`Command`] is one external intent against a graph. The bus routes
//! commands by [`CommandKind`] (single handler per kind) and events by
//! [`EventKind`] (any number of handlers per kind).
//!
//! The versioned write-backs ([`Command::SetNodeOutputImage`],
//! [`Command::SetNodePreview`]) carry `expected_version: Option<u64>`. A
//! generator always fills it with the version its work was dispatched for;
//! `None` marks a manual operator call, and the handler fills it from the
//! node's current version.

use pixelgraph_core::{
    DomainEvent, GraphId, ImageId, NodeConfig, NodeId, NodePosition, NodeType,
};
use std::fmt;

/// One external intent against a graph or its UI-state siblings
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateGraph {
        graph_id: GraphId,
        name: String,
    },
    AddNode {
        graph_id: GraphId,
        node_id: NodeId,
        node_type: NodeType,
        name: String,
    },
    SetNodeName {
        graph_id: GraphId,
        node_id: NodeId,
        name: String,
    },
    SetNodeConfig {
        graph_id: GraphId,
        node_id: NodeId,
        config: NodeConfig,
    },
    RemoveNode {
        graph_id: GraphId,
        node_id: NodeId,
    },
    ConnectNodes {
        graph_id: GraphId,
        from: NodeId,
        output: String,
        to: NodeId,
        input: String,
    },
    DisconnectNodes {
        graph_id: GraphId,
        from: NodeId,
        output: String,
        to: NodeId,
        input: String,
    },
    SetNodeOutputImage {
        graph_id: GraphId,
        node_id: NodeId,
        output: String,
        image_id: ImageId,
        expected_version: Option<u64>,
    },
    UnsetNodeOutputImage {
        graph_id: GraphId,
        node_id: NodeId,
        output: String,
    },
    SetNodePreview {
        graph_id: GraphId,
        node_id: NodeId,
        image_id: ImageId,
        expected_version: Option<u64>,
    },
    UnsetNodePreview {
        graph_id: GraphId,
        node_id: NodeId,
    },
    SetLayout {
        graph_id: GraphId,
        positions: Vec<NodePosition>,
    },
    SetViewport {
        graph_id: GraphId,
        zoom: f64,
        pan_x: f64,
        pan_y: f64,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreateGraph { .. } => CommandKind::CreateGraph,
            Command::AddNode { .. } => CommandKind::AddNode,
            Command::SetNodeName { .. } => CommandKind::SetNodeName,
            Command::SetNodeConfig { .. } => CommandKind::SetNodeConfig,
            Command::RemoveNode { .. } => CommandKind::RemoveNode,
            Command::ConnectNodes { .. } => CommandKind::ConnectNodes,
            Command::DisconnectNodes { .. } => CommandKind::DisconnectNodes,
            Command::SetNodeOutputImage { .. } => CommandKind::SetNodeOutputImage,
            Command::UnsetNodeOutputImage { .. } => CommandKind::UnsetNodeOutputImage,
            Command::SetNodePreview { .. } => CommandKind::SetNodePreview,
            Command::UnsetNodePreview { .. } => CommandKind::UnsetNodePreview,
            Command::SetLayout { .. } => CommandKind::SetLayout,
            Command::SetViewport { .. } => CommandKind::SetViewport,
        }
    }

    pub fn graph_id(&self) -> GraphId {
        match self {
            Command::CreateGraph { graph_id, .. }
            | Command::AddNode { graph_id, .. }
            | Command::SetNodeName { graph_id, .. }
            | Command::SetNodeConfig { graph_id, .. }
            | Command::RemoveNode { graph_id, .. }
            | Command::ConnectNodes { graph_id, .. }
            | Command::DisconnectNodes { graph_id, .. }
            | Command::SetNodeOutputImage { graph_id, .. }
            | Command::UnsetNodeOutputImage { graph_id, .. }
            | Command::SetNodePreview { graph_id, .. }
            | Command::UnsetNodePreview { graph_id, .. }
            | Command::SetLayout { graph_id, .. }
            | Command::SetViewport { graph_id, .. } => *graph_id,
        }
    }
}

/// Discriminant used for command handler registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CreateGraph,
    AddNode,
    SetNodeName,
    SetNodeConfig,
    RemoveNode,
    ConnectNodes,
    DisconnectNodes,
    SetNodeOutputImage,
    UnsetNodeOutputImage,
    SetNodePreview,
    UnsetNodePreview,
    SetLayout,
    SetViewport,
}

impl CommandKind {
    pub const ALL: [CommandKind; 13] = [
        CommandKind::CreateGraph,
        CommandKind::AddNode,
        CommandKind::SetNodeName,
        CommandKind::SetNodeConfig,
        CommandKind::RemoveNode,
        CommandKind::ConnectNodes,
        CommandKind::DisconnectNodes,
        CommandKind::SetNodeOutputImage,
        CommandKind::UnsetNodeOutputImage,
        CommandKind::SetNodePreview,
        CommandKind::UnsetNodePreview,
        CommandKind::SetLayout,
        CommandKind::SetViewport,
    ];
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Discriminant used for event handler registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    GraphCreated,
    NodeAdded,
    NodeRenamed,
    NodeConfigChanged,
    NodeRemoved,
    NodeInputConnected,
    NodeInputDisconnected,
    NodeOutputImageSet,
    NodeOutputImageUnset,
    NodePreviewSet,
    NodePreviewUnset,
    NodeNeedsOutputs,
    LayoutUpdated,
    ViewportUpdated,
}

impl EventKind {
    pub fn of(event: &DomainEvent) -> EventKind {
        match event {
            DomainEvent::GraphCreated { .. } => EventKind::GraphCreated,
            DomainEvent::NodeAdded { .. } => EventKind::NodeAdded,
            DomainEvent::NodeRenamed { .. } => EventKind::NodeRenamed,
            DomainEvent::NodeConfigChanged { .. } => EventKind::NodeConfigChanged,
            DomainEvent::NodeRemoved { .. } => EventKind::NodeRemoved,
            DomainEvent::NodeInputConnected { .. } => EventKind::NodeInputConnected,
            DomainEvent::NodeInputDisconnected { .. } => EventKind::NodeInputDisconnected,
            DomainEvent::NodeOutputImageSet { .. } => EventKind::NodeOutputImageSet,
            DomainEvent::NodeOutputImageUnset { .. } => EventKind::NodeOutputImageUnset,
            DomainEvent::NodePreviewSet { .. } => EventKind::NodePreviewSet,
            DomainEvent::NodePreviewUnset { .. } => EventKind::NodePreviewUnset,
            DomainEvent::NodeNeedsOutputs { .. } => EventKind::NodeNeedsOutputs,
            DomainEvent::LayoutUpdated { .. } => EventKind::LayoutUpdated,
            DomainEvent::ViewportUpdated { .. } => EventKind::ViewportUpdated,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_covers_every_command() {
        let command = Command::CreateGraph {
            graph_id: GraphId::new(),
            name: "g".to_string(),
        };
        assert_eq!(command.kind(), CommandKind::CreateGraph);
        assert_eq!(CommandKind::ALL.len(), 13);
    }

    #[test]
    fn test_event_kind_mapping() {
        let event = DomainEvent::LayoutUpdated {
            graph_id: GraphId::new(),
        };
        assert_eq!(EventKind::of(&event), EventKind::LayoutUpdated);
    }
}
