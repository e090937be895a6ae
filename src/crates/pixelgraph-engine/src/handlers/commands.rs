//! Command handlers
//!
//! Thin by design: open a unit of work, fetch or create the aggregate,
//! call the matching aggregate method, commit, hand the events back to the
//! bus. All domain rules live in the aggregate.

use crate::bus::{CommandHandler, Shutdown};
use crate::error::{EngineError, Result};
use crate::message::Command;
use async_trait::async_trait;
use pixelgraph_core::{DomainEvent, GraphError, ImageGraph, Layout, Viewport};
use pixelgraph_store::{Backend, StoreError, UnitOfWork};
use std::sync::Arc;

/// Bounded retries for optimistic commit conflicts; writers to the same
/// graph race (command callers, the bus worker, generator write-backs) and
/// a conflict just means "reload and re-apply"
pub(crate) const MAX_COMMIT_ATTEMPTS: usize = 5;

/// The single handler behind every graph command kind
pub struct GraphCommandHandler {
    backend: Arc<dyn Backend>,
}

impl GraphCommandHandler {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    async fn execute(&self, command: Command, shutdown: &Shutdown) -> Result<Vec<DomainEvent>> {
        if shutdown.is_cancelled() {
            return Err(EngineError::ShuttingDown);
        }
        let mut uow = UnitOfWork::new(self.backend.clone());
        match command {
            Command::CreateGraph { graph_id, name } => {
                uow.add_graph(ImageGraph::new(graph_id, name)?);
                uow.add_layout(Layout::new(graph_id));
                uow.add_viewport(Viewport::new(graph_id));
            }
            Command::AddNode {
                graph_id,
                node_id,
                node_type,
                name,
            } => {
                uow.graph(graph_id).await?.add_node(node_id, node_type, name)?;
            }
            Command::SetNodeName {
                graph_id,
                node_id,
                name,
            } => {
                uow.graph(graph_id).await?.set_node_name(node_id, name)?;
            }
            Command::SetNodeConfig {
                graph_id,
                node_id,
                config,
            } => {
                uow.graph(graph_id).await?.set_node_config(node_id, config)?;
            }
            Command::RemoveNode { graph_id, node_id } => {
                uow.graph(graph_id).await?.remove_node(node_id)?;
            }
            Command::ConnectNodes {
                graph_id,
                from,
                output,
                to,
                input,
            } => {
                uow.graph(graph_id)
                    .await?
                    .connect_nodes(from, &output, to, &input)?;
            }
            Command::DisconnectNodes {
                graph_id,
                from,
                output,
                to,
                input,
            } => {
                uow.graph(graph_id)
                    .await?
                    .disconnect_nodes(from, &output, to, &input)?;
            }
            Command::SetNodeOutputImage {
                graph_id,
                node_id,
                output,
                image_id,
                expected_version,
            } => {
                let graph = uow.graph(graph_id).await?;
                // Manual calls omit the version; fill it from the node.
                let version = match expected_version {
                    Some(version) => version,
                    None => {
                        graph
                            .node(node_id)
                            .ok_or(GraphError::UnknownNode(node_id))?
                            .version
                    }
                };
                graph.set_node_output_image(node_id, &output, image_id, version)?;
            }
            Command::UnsetNodeOutputImage {
                graph_id,
                node_id,
                output,
            } => {
                uow.graph(graph_id)
                    .await?
                    .unset_node_output_image(node_id, &output)?;
            }
            Command::SetNodePreview {
                graph_id,
                node_id,
                image_id,
                expected_version,
            } => {
                let graph = uow.graph(graph_id).await?;
                let version = match expected_version {
                    Some(version) => version,
                    None => {
                        graph
                            .node(node_id)
                            .ok_or(GraphError::UnknownNode(node_id))?
                            .version
                    }
                };
                graph.set_node_preview(node_id, image_id, version)?;
            }
            Command::UnsetNodePreview { graph_id, node_id } => {
                uow.graph(graph_id).await?.unset_node_preview(node_id)?;
            }
            Command::SetLayout {
                graph_id,
                positions,
            } => {
                uow.layout(graph_id).await?.set_positions(positions);
            }
            Command::SetViewport {
                graph_id,
                zoom,
                pan_x,
                pan_y,
            } => {
                uow.viewport(graph_id).await?.set(zoom, pan_x, pan_y)?;
            }
        }
        Ok(uow.commit().await?)
    }
}

#[async_trait]
impl CommandHandler for GraphCommandHandler {
    async fn handle(&self, command: Command, shutdown: &Shutdown) -> Result<Vec<DomainEvent>> {
        let mut attempts = 0;
        loop {
            match self.execute(command.clone(), shutdown).await {
                Err(EngineError::Store(StoreError::VersionConflict { id, expected }))
                    if attempts + 1 < MAX_COMMIT_ATTEMPTS =>
                {
                    attempts += 1;
                    tracing::debug!(
                        aggregate = %id,
                        expected,
                        attempt = attempts,
                        "optimistic commit conflict, retrying command"
                    );
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelgraph_core::{GraphId, NodeId, NodeState, NodeType};
    use pixelgraph_store::{MemoryBackend, StoreError};

    fn handler() -> (GraphCommandHandler, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (GraphCommandHandler::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_create_graph_creates_siblings() {
        let (handler, backend) = handler();
        let graph_id = GraphId::new();
        let events = handler
            .handle(
                Command::CreateGraph {
                    graph_id,
                    name: "demo".to_string(),
                },
                &Shutdown::never(),
            )
            .await
            .unwrap();
        assert!(matches!(events[..], [DomainEvent::GraphCreated { .. }]));

        assert!(backend.load_graph(graph_id).await.unwrap().is_some());
        assert!(backend.load_layout(graph_id).await.unwrap().is_some());
        assert!(backend.load_viewport(graph_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_validation_errors_surface_and_commit_nothing() {
        let (handler, backend) = handler();
        let graph_id = GraphId::new();
        handler
            .handle(
                Command::CreateGraph {
                    graph_id,
                    name: "demo".to_string(),
                },
                &Shutdown::never(),
            )
            .await
            .unwrap();

        let node_id = NodeId::new();
        let result = handler
            .handle(
                Command::SetNodeName {
                    graph_id,
                    node_id,
                    name: "ghost".to_string(),
                },
                &Shutdown::never(),
            )
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Domain(GraphError::UnknownNode(_)))
        ));
        assert_eq!(
            backend.load_graph(graph_id).await.unwrap().unwrap().node_count(),
            0
        );
    }

    #[tokio::test]
    async fn test_missing_graph_is_not_found() {
        let (handler, _) = handler();
        let result = handler
            .handle(
                Command::AddNode {
                    graph_id: GraphId::new(),
                    node_id: NodeId::new(),
                    node_type: NodeType::Blur,
                    name: "blur".to_string(),
                },
                &Shutdown::never(),
            )
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Store(StoreError::GraphNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_manual_output_set_fills_current_version() {
        let (handler, backend) = handler();
        let graph_id = GraphId::new();
        let node_id = NodeId::new();
        handler
            .handle(
                Command::CreateGraph {
                    graph_id,
                    name: "demo".to_string(),
                },
                &Shutdown::never(),
            )
            .await
            .unwrap();
        handler
            .handle(
                Command::AddNode {
                    graph_id,
                    node_id,
                    node_type: NodeType::Input,
                    name: "in".to_string(),
                },
                &Shutdown::never(),
            )
            .await
            .unwrap();

        let image_id = pixelgraph_core::ImageId::new();
        let events = handler
            .handle(
                Command::SetNodeOutputImage {
                    graph_id,
                    node_id,
                    output: "original".to_string(),
                    image_id,
                    expected_version: None,
                },
                &Shutdown::never(),
            )
            .await
            .unwrap();
        assert!(matches!(events[..], [DomainEvent::NodeOutputImageSet { .. }]));

        let graph = backend.load_graph(graph_id).await.unwrap().unwrap();
        let node = graph.node(node_id).unwrap();
        assert_eq!(node.outputs["original"].image_id, Some(image_id));
        assert_eq!(node.state, NodeState::Generated);
    }
}
