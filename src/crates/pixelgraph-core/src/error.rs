//! Domain error types
//!
//! Every failed aggregate call returns one of these and leaves the aggregate
//! untouched. Stale version-guarded write-backs are deliberately *not*
//! errors - they are silent no-ops at the aggregate boundary.

use crate::id::NodeId;
use crate::node_type::NodeType;
use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Validation failures from aggregate mutations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("graph name cannot be empty")]
    EmptyName,

    #[error("node {0} already exists in the graph")]
    DuplicateNode(NodeId),

    #[error("node {0} does not exist in the graph")]
    UnknownNode(NodeId),

    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("node {node} has no input named '{input}'")]
    UnknownInput { node: NodeId, input: String },

    #[error("node {node} has no output named '{output}'")]
    UnknownOutput { node: NodeId, output: String },

    #[error("input '{input}' of node {node} is already connected")]
    InputAlreadyConnected { node: NodeId, input: String },

    #[error("node {0} cannot be connected to itself")]
    SelfReference(NodeId),

    #[error("connecting node {from} to node {to} would create a cycle")]
    CycleDetected { from: NodeId, to: NodeId },

    #[error("input '{input}' of node {to} is not connected to output '{output}' of node {from}")]
    NotConnected {
        from: NodeId,
        output: String,
        to: NodeId,
        input: String,
    },

    #[error("config variant '{config}' does not match node type '{node_type}'")]
    ConfigMismatch {
        config: NodeType,
        node_type: NodeType,
    },

    #[error("malformed hex color '{0}'")]
    InvalidColor(String),

    #[error("zoom must be positive, got {0}")]
    InvalidZoom(f64),
}
