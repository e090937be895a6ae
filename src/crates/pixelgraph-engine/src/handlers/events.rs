//! Event handlers
//!
//! The reactions that keep the DAG coherent: dispatching generation work,
//! propagating fresh outputs downstream, collecting dead blobs, and fanning
//! notifications out to subscribers. Handlers run on the bus worker; events
//! they return cascade through the worker's local queue.

use crate::bus::{EventHandler, Shutdown};
use crate::error::{EngineError, Result};
use crate::generate::{self, GenerationContext, GenerationJob};
use crate::handlers::commands::MAX_COMMIT_ATTEMPTS;
use crate::notifier::{NodeUpdate, NodeUpdateState, Notifier};
use async_trait::async_trait;
use pixelgraph_core::{DomainEvent, GraphError, NodeType};
use pixelgraph_store::{Backend, BlobStore, StoreError, UnitOfWork};
use std::collections::BTreeMap;
use std::sync::Arc;

/// On `NodeNeedsOutputs`: launch the generator as a background task
///
/// Generator errors are logged, never raised back into the bus; the node
/// stays `Generating` until a fresh edit re-triggers it.
pub struct GenerationHandler {
    context: GenerationContext,
}

impl GenerationHandler {
    pub fn new(context: GenerationContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl EventHandler for GenerationHandler {
    async fn handle(&self, event: &DomainEvent, shutdown: &Shutdown) -> Result<Vec<DomainEvent>> {
        let Some(job) = GenerationJob::from_event(event) else {
            return Ok(Vec::new());
        };
        let context = self.context.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let graph_id = job.graph_id;
            let node_id = job.node_id;
            if let Err(err) = generate::run(&context, job, &shutdown).await {
                tracing::error!(
                    graph_id = %graph_id,
                    node_id = %node_id,
                    error = %err,
                    "image generation failed"
                );
            }
        });
        Ok(Vec::new())
    }
}

/// On `NodeOutputImageSet`: broadcast completion, then push the image into
/// every connected downstream input under a new unit of work
///
/// `Input` nodes additionally get a preview-only generation, since their
/// output arrived externally and never passed through a generator.
pub struct PropagationHandler {
    backend: Arc<dyn Backend>,
    context: GenerationContext,
    notifier: Arc<Notifier>,
}

impl PropagationHandler {
    pub fn new(
        backend: Arc<dyn Backend>,
        context: GenerationContext,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            backend,
            context,
            notifier,
        }
    }
}

#[async_trait]
impl EventHandler for PropagationHandler {
    async fn handle(&self, event: &DomainEvent, shutdown: &Shutdown) -> Result<Vec<DomainEvent>> {
        let DomainEvent::NodeOutputImageSet {
            graph_id,
            node_id,
            node_version,
            node_type,
            output,
            image_id,
        } = event
        else {
            return Ok(Vec::new());
        };

        self.notifier.broadcast_node_update(
            *graph_id,
            NodeUpdate {
                node_id: *node_id,
                state: Some(NodeUpdateState::Completed),
                outputs: Some(BTreeMap::from([(output.clone(), *image_id)])),
            },
        );

        if *node_type == NodeType::Input {
            let context = self.context.clone();
            let shutdown = shutdown.clone();
            let (graph_id, node_id, node_version, image_id) =
                (*graph_id, *node_id, *node_version, *image_id);
            tokio::spawn(async move {
                if let Err(err) = generate::run_preview_only(
                    &context, graph_id, node_id, node_version, image_id, &shutdown,
                )
                .await
                {
                    tracing::error!(
                        graph_id = %graph_id,
                        node_id = %node_id,
                        error = %err,
                        "preview generation failed"
                    );
                }
            });
        }

        let mut attempts = 0;
        loop {
            if shutdown.is_cancelled() {
                return Err(EngineError::ShuttingDown);
            }
            let mut uow = UnitOfWork::new(self.backend.clone());
            uow.graph(*graph_id)
                .await?
                .propagate_output_image_to_connections(*node_id, output, *image_id)?;
            match uow.commit().await {
                Err(StoreError::VersionConflict { .. }) if attempts + 1 < MAX_COMMIT_ATTEMPTS => {
                    attempts += 1;
                }
                result => return Ok(result?),
            }
        }
    }
}

/// On `NodeOutputImageUnset` / `NodePreviewUnset`: delete the blob, and for
/// outputs clear what had flowed downstream
pub struct BlobCleanupHandler {
    backend: Arc<dyn Backend>,
    blobs: Arc<dyn BlobStore>,
}

impl BlobCleanupHandler {
    pub fn new(backend: Arc<dyn Backend>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { backend, blobs }
    }
}

#[async_trait]
impl EventHandler for BlobCleanupHandler {
    async fn handle(&self, event: &DomainEvent, shutdown: &Shutdown) -> Result<Vec<DomainEvent>> {
        match event {
            DomainEvent::NodeOutputImageUnset {
                graph_id,
                node_id,
                output,
                image_id,
            } => {
                if shutdown.is_cancelled() {
                    return Err(EngineError::ShuttingDown);
                }
                self.blobs.remove(*image_id).await?;

                let mut attempts = 0;
                loop {
                    let mut uow = UnitOfWork::new(self.backend.clone());
                    let result = match uow.graph(*graph_id).await {
                        Ok(graph) => graph.unset_node_output_connections(*node_id, output),
                        // The whole graph may be gone; nothing downstream then.
                        Err(StoreError::GraphNotFound(_)) => return Ok(Vec::new()),
                        Err(err) => return Err(err.into()),
                    };
                    match result {
                        Ok(()) => match uow.commit().await {
                            Err(StoreError::VersionConflict { .. })
                                if attempts + 1 < MAX_COMMIT_ATTEMPTS =>
                            {
                                attempts += 1;
                            }
                            committed => return Ok(committed?),
                        },
                        // The node was removed in the same mutation that unset
                        // its outputs; its edges are already severed.
                        Err(GraphError::UnknownNode(_)) => return Ok(Vec::new()),
                        Err(err) => return Err(err.into()),
                    }
                }
            }
            DomainEvent::NodePreviewUnset { image_id, .. } => {
                self.blobs.remove(*image_id).await?;
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// Broadcast the typed node notifications clients render live
pub struct NotificationHandler {
    notifier: Arc<Notifier>,
}

impl NotificationHandler {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    async fn handle(&self, event: &DomainEvent, _shutdown: &Shutdown) -> Result<Vec<DomainEvent>> {
        let update = match event {
            DomainEvent::NodeAdded { node_id, .. } => NodeUpdate {
                node_id: *node_id,
                state: Some(NodeUpdateState::Added),
                outputs: None,
            },
            DomainEvent::NodeRemoved { node_id, .. } => NodeUpdate {
                node_id: *node_id,
                state: Some(NodeUpdateState::Removed),
                outputs: None,
            },
            DomainEvent::NodeInputConnected { node_id, .. } => NodeUpdate {
                node_id: *node_id,
                state: Some(NodeUpdateState::Connected),
                outputs: None,
            },
            DomainEvent::NodeInputDisconnected { node_id, .. } => NodeUpdate {
                node_id: *node_id,
                state: Some(NodeUpdateState::Disconnected),
                outputs: None,
            },
            DomainEvent::NodeNeedsOutputs { node_id, .. } => NodeUpdate {
                node_id: *node_id,
                state: Some(NodeUpdateState::Processing),
                outputs: None,
            },
            DomainEvent::NodePreviewSet { node_id, .. } => NodeUpdate {
                node_id: *node_id,
                state: None,
                outputs: None,
            },
            _ => return Ok(Vec::new()),
        };
        self.notifier.broadcast_node_update(event.graph_id(), update);
        Ok(Vec::new())
    }
}

/// Broadcast the layout/viewport refetch signal
pub struct LayoutNotificationHandler {
    notifier: Arc<Notifier>,
}

impl LayoutNotificationHandler {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl EventHandler for LayoutNotificationHandler {
    async fn handle(&self, event: &DomainEvent, _shutdown: &Shutdown) -> Result<Vec<DomainEvent>> {
        if matches!(
            event,
            DomainEvent::LayoutUpdated { .. } | DomainEvent::ViewportUpdated { .. }
        ) {
            self.notifier.broadcast_layout_update(event.graph_id());
        }
        Ok(Vec::new())
    }
}
