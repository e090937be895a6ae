//! Nodes and their named ports
//!
//! A node owns its port maps by value; connections are `(node id, port name)`
//! pairs rather than references, so the graph can be cloned and serialized
//! without any pointer chasing. Port maps are `BTreeMap`s to keep iteration
//! and serialization order stable.

use crate::config::NodeConfig;
use crate::id::{ImageId, NodeId};
use crate::node_type::NodeType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Name of an input port
pub type InputName = String;

/// Name of an output port
pub type OutputName = String;

/// Processing state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Not all required inputs are present
    Waiting,
    /// Generation work has been dispatched for the current version
    Generating,
    /// Current outputs reflect current inputs and config
    Generated,
}

/// Reference to an upstream node's output, held by a connected input
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpstreamRef {
    pub node_id: NodeId,
    pub output: OutputName,
}

/// Reference to a downstream node's input, held in an output's fan-out set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DownstreamRef {
    pub node_id: NodeId,
    pub input: InputName,
}

/// An input port
///
/// `connection` and `image_id` are independent: an input can be connected
/// while nothing has flowed in yet, and (transiently, between bus
/// iterations) carry an image from a connection that was just severed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub name: InputName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<UpstreamRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<ImageId>,
}

impl Input {
    pub fn new(name: impl Into<InputName>) -> Self {
        Self {
            name: name.into(),
            connection: None,
            image_id: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

/// An output port with its downstream fan-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub name: OutputName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<ImageId>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub connections: BTreeSet<DownstreamRef>,
}

impl Output {
    pub fn new(name: impl Into<OutputName>) -> Self {
        Self {
            name: name.into(),
            image_id: None,
            connections: BTreeSet::new(),
        }
    }
}

/// A node of the image graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    pub name: String,
    pub version: u64,
    pub state: NodeState,
    pub config: NodeConfig,
    pub inputs: BTreeMap<InputName, Input>,
    pub outputs: BTreeMap<OutputName, Output>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<ImageId>,
}

impl Node {
    /// Create a node with the port schema and default config of its type
    pub fn new(id: NodeId, node_type: NodeType, name: impl Into<String>) -> Self {
        let inputs = node_type
            .input_names()
            .iter()
            .map(|&port| (port.to_string(), Input::new(port)))
            .collect();
        let outputs = node_type
            .output_names()
            .iter()
            .map(|&port| (port.to_string(), Output::new(port)))
            .collect();
        Self {
            id,
            node_type,
            name: name.into(),
            version: 1,
            state: NodeState::Waiting,
            config: node_type.default_config(),
            inputs,
            outputs,
            preview: None,
        }
    }

    /// Bump the version, invalidating any in-flight generation
    pub(crate) fn bump(&mut self) {
        self.version += 1;
    }

    /// All inputs carry an image
    pub fn inputs_complete(&self) -> bool {
        self.inputs.values().all(|input| input.image_id.is_some())
    }

    /// All outputs carry an image
    pub fn outputs_complete(&self) -> bool {
        self.outputs.values().all(|output| output.image_id.is_some())
    }

    /// Snapshot of resolved input image ids, for event payloads
    pub fn input_images(&self) -> BTreeMap<InputName, ImageId> {
        self.inputs
            .iter()
            .filter_map(|(name, input)| input.image_id.map(|id| (name.clone(), id)))
            .collect()
    }

    /// Snapshot of set output image ids, for notification payloads
    pub fn output_images(&self) -> BTreeMap<OutputName, ImageId> {
        self.outputs
            .iter()
            .filter_map(|(name, output)| output.image_id.map(|id| (name.clone(), id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_has_schema_ports() {
        let node = Node::new(NodeId::new(), NodeType::ResizeMatch, "match");
        assert_eq!(
            node.inputs.keys().cloned().collect::<Vec<_>>(),
            ["original", "size_match"]
        );
        assert_eq!(node.outputs.keys().cloned().collect::<Vec<_>>(), ["resized"]);
        assert_eq!(node.state, NodeState::Waiting);
        assert_eq!(node.version, 1);
        assert!(node.config.matches(NodeType::ResizeMatch));
    }

    #[test]
    fn test_completeness_checks() {
        let mut node = Node::new(NodeId::new(), NodeType::Blur, "blur");
        assert!(!node.inputs_complete());
        assert!(!node.outputs_complete());

        let image = ImageId::new();
        node.inputs.get_mut("original").unwrap().image_id = Some(image);
        assert!(node.inputs_complete());
        assert_eq!(node.input_images().get("original"), Some(&image));

        node.outputs.get_mut("blurred").unwrap().image_id = Some(ImageId::new());
        assert!(node.outputs_complete());
    }

    #[test]
    fn test_source_nodes_have_complete_inputs() {
        let node = Node::new(NodeId::new(), NodeType::PaletteCreate, "palette");
        assert!(node.inputs_complete());
        assert!(node.inputs.is_empty());
    }
}
