//! The unit of work
//!
//! A [`UnitOfWork`] is the transactional envelope around one logical change:
//! command handlers open one, fetch or register aggregates through it, call
//! aggregate methods, and commit. Commit persists every touched aggregate
//! (with the optimistic version observed at load time) and returns the
//! drained domain events in emission order. Dropping an uncommitted unit of
//! work discards both changes and events.
//!
//! Within one unit of work the same aggregate instance is returned for the
//! same id - the identity map - so two mutations through the same handle
//! compose instead of clobbering each other.

use crate::error::{Result, StoreError};
use crate::traits::Backend;
use pixelgraph_core::{DomainEvent, GraphId, ImageGraph, Layout, Viewport};
use std::collections::BTreeMap;
use std::sync::Arc;

struct Tracked<T> {
    aggregate: T,
    /// Persisted version at load time; `None` for aggregates created in
    /// this unit of work
    loaded_version: Option<u64>,
}

/// Transactional envelope over a [`Backend`]
pub struct UnitOfWork {
    backend: Arc<dyn Backend>,
    graphs: BTreeMap<GraphId, Tracked<ImageGraph>>,
    layouts: BTreeMap<GraphId, Tracked<Layout>>,
    viewports: BTreeMap<GraphId, Tracked<Viewport>>,
}

impl UnitOfWork {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            graphs: BTreeMap::new(),
            layouts: BTreeMap::new(),
            viewports: BTreeMap::new(),
        }
    }

    /// Fetch a graph, loading it on first access
    pub async fn graph(&mut self, id: GraphId) -> Result<&mut ImageGraph> {
        if !self.graphs.contains_key(&id) {
            let graph = self
                .backend
                .load_graph(id)
                .await?
                .ok_or(StoreError::GraphNotFound(id))?;
            let loaded_version = graph.version();
            self.graphs.insert(
                id,
                Tracked {
                    aggregate: graph,
                    loaded_version: Some(loaded_version),
                },
            );
        }
        match self.graphs.get_mut(&id) {
            Some(tracked) => Ok(&mut tracked.aggregate),
            None => Err(StoreError::GraphNotFound(id)),
        }
    }

    /// Register a freshly created graph
    pub fn add_graph(&mut self, graph: ImageGraph) {
        self.graphs.insert(
            graph.id(),
            Tracked {
                aggregate: graph,
                loaded_version: None,
            },
        );
    }

    /// Fetch a layout, loading it on first access
    pub async fn layout(&mut self, graph_id: GraphId) -> Result<&mut Layout> {
        if !self.layouts.contains_key(&graph_id) {
            let layout = self
                .backend
                .load_layout(graph_id)
                .await?
                .ok_or(StoreError::LayoutNotFound(graph_id))?;
            let loaded_version = layout.version();
            self.layouts.insert(
                graph_id,
                Tracked {
                    aggregate: layout,
                    loaded_version: Some(loaded_version),
                },
            );
        }
        match self.layouts.get_mut(&graph_id) {
            Some(tracked) => Ok(&mut tracked.aggregate),
            None => Err(StoreError::LayoutNotFound(graph_id)),
        }
    }

    /// Register a freshly created layout
    pub fn add_layout(&mut self, layout: Layout) {
        self.layouts.insert(
            layout.graph_id(),
            Tracked {
                aggregate: layout,
                loaded_version: None,
            },
        );
    }

    /// Fetch a viewport, loading it on first access
    pub async fn viewport(&mut self, graph_id: GraphId) -> Result<&mut Viewport> {
        if !self.viewports.contains_key(&graph_id) {
            let viewport = self
                .backend
                .load_viewport(graph_id)
                .await?
                .ok_or(StoreError::ViewportNotFound(graph_id))?;
            let loaded_version = viewport.version();
            self.viewports.insert(
                graph_id,
                Tracked {
                    aggregate: viewport,
                    loaded_version: Some(loaded_version),
                },
            );
        }
        match self.viewports.get_mut(&graph_id) {
            Some(tracked) => Ok(&mut tracked.aggregate),
            None => Err(StoreError::ViewportNotFound(graph_id)),
        }
    }

    /// Register a freshly created viewport
    pub fn add_viewport(&mut self, viewport: Viewport) {
        self.viewports.insert(
            viewport.graph_id(),
            Tracked {
                aggregate: viewport,
                loaded_version: None,
            },
        );
    }

    /// Persist every touched aggregate and return the drained events
    ///
    /// Events are drained before the write so a backend that stores clones
    /// never captures a pending buffer.
    pub async fn commit(mut self) -> Result<Vec<DomainEvent>> {
        let mut events = Vec::new();
        for tracked in self.graphs.values_mut() {
            events.extend(tracked.aggregate.take_events());
            self.backend
                .store_graph(&tracked.aggregate, tracked.loaded_version)
                .await?;
        }
        for tracked in self.layouts.values_mut() {
            events.extend(tracked.aggregate.take_events());
            self.backend
                .store_layout(&tracked.aggregate, tracked.loaded_version)
                .await?;
        }
        for tracked in self.viewports.values_mut() {
            events.extend(tracked.aggregate.take_events());
            self.backend
                .store_viewport(&tracked.aggregate, tracked.loaded_version)
                .await?;
        }
        Ok(events)
    }
}
