//! # pixelgraph-core - Image graph aggregate and domain events
//!
//! The domain model of the pixelgraph pipeline editor: users compose a DAG
//! of image-transformation nodes, and the engine reactively regenerates
//! outputs when inputs or configs change.
//!
//! This crate is the consistency boundary. It knows nothing about storage,
//! buses, pixels, or HTTP - it owns the rules:
//!
//! - **[`ImageGraph`]** - the aggregate root: nodes, typed ports, edges,
//!   validation, the per-node state machine, and the pending-event buffer.
//! - **[`Node`]** / **[`NodeType`]** / **[`NodeConfig`]** - the closed node
//!   type set with its fixed port schema and tagged config variants.
//! - **[`DomainEvent`]** - snapshots emitted by successful mutations,
//!   drained at commit time and routed by the engine's message bus.
//! - **[`Layout`]** / **[`Viewport`]** - per-graph UI-state siblings.
//!
//! Aggregate methods are synchronous and never perform I/O; everything
//! async lives in the engine and store crates.
//!
//! ## Example
//!
//! ```rust
//! use pixelgraph_core::{GraphId, ImageGraph, ImageId, NodeId, NodeType};
//!
//! let mut graph = ImageGraph::new(GraphId::new(), "demo").unwrap();
//! let input = NodeId::new();
//! let blur = NodeId::new();
//! graph.add_node(input, NodeType::Input, "source").unwrap();
//! graph.add_node(blur, NodeType::Blur, "soften").unwrap();
//! graph.connect_nodes(input, "original", blur, "original").unwrap();
//!
//! // An upload lands on the input node's output...
//! let version = graph.node(input).unwrap().version;
//! graph
//!     .set_node_output_image(input, "original", ImageId::new(), version)
//!     .unwrap();
//!
//! // ...and the drained events drive propagation and generation.
//! let events = graph.take_events();
//! assert!(!events.is_empty());
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod id;
pub mod layout;
pub mod node;
pub mod node_type;

pub use config::{
    HexColor, Interpolation, NodeConfig, NormalizeMode, PaletteEntry, PaletteMethod,
    parse_palette_spec,
};
pub use error::{GraphError, Result};
pub use events::DomainEvent;
pub use graph::ImageGraph;
pub use id::{GraphId, IdParseError, ImageId, NodeId};
pub use layout::{Layout, NodePosition, Viewport};
pub use node::{DownstreamRef, Input, InputName, Node, NodeState, Output, OutputName, UpstreamRef};
pub use node_type::{ALL_NODE_TYPES, NodeType};
