//! Node-update port
//!
//! The generation layer's only way back into the graph. Every write-back
//! carries the node version the work was dispatched for, so the aggregate's
//! version guard - not the generator - decides whether the result still
//! applies; the returned bool reports that verdict so callers can drop the
//! blob of a rejected write. The port exists so generators can be
//! unit-tested against a recording fake instead of a bus.

use crate::bus::MessageBus;
use crate::error::Result;
use crate::message::Command;
use async_trait::async_trait;
use pixelgraph_core::{DomainEvent, GraphId, ImageId, NodeConfig, NodeId};
use std::sync::Arc;

/// Write-back surface used by generators
///
/// Each setter returns whether the write survived the version guard.
#[async_trait]
pub trait NodeUpdater: Send + Sync {
    async fn set_node_output_image(
        &self,
        graph_id: GraphId,
        node_id: NodeId,
        output: &str,
        image_id: ImageId,
        node_version: u64,
    ) -> Result<bool>;

    async fn set_node_preview_image(
        &self,
        graph_id: GraphId,
        node_id: NodeId,
        image_id: ImageId,
        node_version: u64,
    ) -> Result<bool>;

    async fn set_node_config(
        &self,
        graph_id: GraphId,
        node_id: NodeId,
        config: NodeConfig,
    ) -> Result<bool>;
}

/// Port implementation that issues commands through the bus
pub struct BusNodeUpdater {
    bus: Arc<MessageBus>,
}

impl BusNodeUpdater {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl NodeUpdater for BusNodeUpdater {
    async fn set_node_output_image(
        &self,
        graph_id: GraphId,
        node_id: NodeId,
        output: &str,
        image_id: ImageId,
        node_version: u64,
    ) -> Result<bool> {
        let events = self
            .bus
            .handle_command(Command::SetNodeOutputImage {
                graph_id,
                node_id,
                output: output.to_string(),
                image_id,
                expected_version: Some(node_version),
            })
            .await?;
        // An empty commit means the version guard dropped the write.
        Ok(events
            .iter()
            .any(|event| matches!(event, DomainEvent::NodeOutputImageSet { .. })))
    }

    async fn set_node_preview_image(
        &self,
        graph_id: GraphId,
        node_id: NodeId,
        image_id: ImageId,
        node_version: u64,
    ) -> Result<bool> {
        let events = self
            .bus
            .handle_command(Command::SetNodePreview {
                graph_id,
                node_id,
                image_id,
                expected_version: Some(node_version),
            })
            .await?;
        Ok(events
            .iter()
            .any(|event| matches!(event, DomainEvent::NodePreviewSet { .. })))
    }

    async fn set_node_config(
        &self,
        graph_id: GraphId,
        node_id: NodeId,
        config: NodeConfig,
    ) -> Result<bool> {
        let events = self
            .bus
            .handle_command(Command::SetNodeConfig {
                graph_id,
                node_id,
                config,
            })
            .await?;
        Ok(events
            .iter()
            .any(|event| matches!(event, DomainEvent::NodeConfigChanged { .. })))
    }
}
