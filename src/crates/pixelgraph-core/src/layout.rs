//! Layout and viewport sibling aggregates
//!
//! Per-graph UI state stored alongside the graph: node positions and the
//! client's pan/zoom. Both emit update events that only the notifier
//! consumes - clients are told to refetch, the payload is just a signal.

use crate::error::{GraphError, Result};
use crate::events::DomainEvent;
use crate::id::{GraphId, NodeId};
use serde::{Deserialize, Serialize};

/// One node's position on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub node_id: NodeId,
    pub x: i32,
    pub y: i32,
}

/// Node positions for one graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    graph_id: GraphId,
    version: u64,
    positions: Vec<NodePosition>,
    #[serde(skip, default)]
    events: Vec<DomainEvent>,
}

impl Layout {
    pub fn new(graph_id: GraphId) -> Self {
        Self {
            graph_id,
            version: 1,
            positions: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn positions(&self) -> &[NodePosition] {
        &self.positions
    }

    /// Replace the full position list
    pub fn set_positions(&mut self, positions: Vec<NodePosition>) {
        self.positions = positions;
        self.version += 1;
        self.events.push(DomainEvent::LayoutUpdated {
            graph_id: self.graph_id,
        });
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Pan/zoom state for one graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    graph_id: GraphId,
    version: u64,
    zoom: f64,
    pan_x: f64,
    pan_y: f64,
    #[serde(skip, default)]
    events: Vec<DomainEvent>,
}

impl Viewport {
    pub fn new(graph_id: GraphId) -> Self {
        Self {
            graph_id,
            version: 1,
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            events: Vec::new(),
        }
    }

    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan(&self) -> (f64, f64) {
        (self.pan_x, self.pan_y)
    }

    /// Replace the viewport; zoom must be strictly positive
    pub fn set(&mut self, zoom: f64, pan_x: f64, pan_y: f64) -> Result<()> {
        if !(zoom > 0.0) {
            return Err(GraphError::InvalidZoom(zoom));
        }
        self.zoom = zoom;
        self.pan_x = pan_x;
        self.pan_y = pan_y;
        self.version += 1;
        self.events.push(DomainEvent::ViewportUpdated {
            graph_id: self.graph_id,
        });
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_update_emits_signal() {
        let graph_id = GraphId::new();
        let mut layout = Layout::new(graph_id);
        layout.set_positions(vec![NodePosition {
            node_id: NodeId::new(),
            x: 40,
            y: -8,
        }]);
        assert_eq!(layout.version(), 2);
        assert_eq!(
            layout.take_events(),
            vec![DomainEvent::LayoutUpdated { graph_id }]
        );
        assert!(layout.take_events().is_empty());
    }

    #[test]
    fn test_viewport_rejects_non_positive_zoom() {
        let mut viewport = Viewport::new(GraphId::new());
        assert_eq!(viewport.set(0.0, 0.0, 0.0), Err(GraphError::InvalidZoom(0.0)));
        assert_eq!(viewport.set(-1.5, 0.0, 0.0), Err(GraphError::InvalidZoom(-1.5)));
        assert!(viewport.take_events().is_empty());
        assert_eq!(viewport.version(), 1);

        viewport.set(2.0, 10.0, -3.0).unwrap();
        assert_eq!(viewport.zoom(), 2.0);
        assert_eq!(viewport.pan(), (10.0, -3.0));
        assert_eq!(viewport.version(), 2);
    }
}
