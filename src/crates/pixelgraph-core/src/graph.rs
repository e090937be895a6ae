//! The image graph aggregate
//!
//! [`ImageGraph`] is the sole mutator of graph state: a DAG of typed nodes
//! whose edges carry image references from an upstream output to a
//! downstream input. Every method validates first and mutates second, so a
//! failed call leaves the aggregate untouched. Successful mutations append
//! domain events to a per-instance buffer; the unit of work drains the
//! buffer with [`take_events`](ImageGraph::take_events) on commit and hands
//! the events to the bus.
//!
//! # Versions and the stale-write guard
//!
//! Each node carries a monotonically increasing version, bumped by any
//! config change or input-image change. Generation work is dispatched with
//! the version that was current at dispatch time, and the write-back setters
//! ([`set_node_output_image`](ImageGraph::set_node_output_image),
//! [`set_node_preview`](ImageGraph::set_node_preview)) are no-ops when the
//! carried version no longer matches. That single check is what lets user
//! edits race freely against background completions: at most one completion
//! can land per `(node, version)` pair, and only the matching one.
//!
//! # Readiness
//!
//! A node is ready when every input carries an image (its config is always
//! present, the config type is total). On ready it transitions to
//! `Generating` and emits [`DomainEvent::NodeNeedsOutputs`] with a full
//! snapshot of what generation needs. `Input` nodes never generate - their
//! output arrives from outside - so they sit in `Waiting` until it does.

use crate::config::NodeConfig;
use crate::error::{GraphError, Result};
use crate::events::DomainEvent;
use crate::id::{GraphId, ImageId, NodeId};
use crate::node::{DownstreamRef, Node, NodeState, UpstreamRef};
use crate::node_type::NodeType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Aggregate root for one editable image-processing graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGraph {
    id: GraphId,
    name: String,
    version: u64,
    nodes: BTreeMap<NodeId, Node>,
    #[serde(skip, default)]
    events: Vec<DomainEvent>,
}

impl ImageGraph {
    /// Create a graph with the given id and a non-empty name
    pub fn new(id: GraphId, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GraphError::EmptyName);
        }
        let mut graph = Self {
            id,
            name: name.clone(),
            version: 1,
            nodes: BTreeMap::new(),
            events: Vec::new(),
        };
        graph
            .events
            .push(DomainEvent::GraphCreated { graph_id: id, name });
        Ok(graph)
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Aggregate version, bumped once per successful mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Drain the pending-event buffer, in emission order
    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Add a node with the port schema and default config of its type
    ///
    /// Source types with no inputs (`palette_create`) are ready immediately
    /// and dispatch generation as part of this call.
    pub fn add_node(
        &mut self,
        node_id: NodeId,
        node_type: NodeType,
        name: impl Into<String>,
    ) -> Result<()> {
        if self.nodes.contains_key(&node_id) {
            return Err(GraphError::DuplicateNode(node_id));
        }
        let node = Node::new(node_id, node_type, name);
        let name = node.name.clone();
        self.nodes.insert(node_id, node);
        self.events.push(DomainEvent::NodeAdded {
            graph_id: self.id,
            node_id,
            node_type,
            name,
        });
        self.evaluate_readiness(node_id);
        self.touch();
        Ok(())
    }

    /// Rename a node; cosmetic, does not invalidate anything
    pub fn set_node_name(&mut self, node_id: NodeId, name: impl Into<String>) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::UnknownNode(node_id))?;
        node.name = name.into();
        let name = node.name.clone();
        self.events.push(DomainEvent::NodeRenamed {
            graph_id: self.id,
            node_id,
            name,
        });
        self.touch();
        Ok(())
    }

    /// Replace a node's config with a variant of the same type
    ///
    /// Bumps the node version, unsets any computed outputs (their blobs and
    /// downstream copies are invalidated through the emitted unset events),
    /// and re-evaluates readiness at the new version.
    pub fn set_node_config(&mut self, node_id: NodeId, config: NodeConfig) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::UnknownNode(node_id))?;
        if !config.matches(node.node_type) {
            return Err(GraphError::ConfigMismatch {
                config: config.node_type(),
                node_type: node.node_type,
            });
        }
        node.bump();
        node.config = config.clone();
        let node_version = node.version;
        self.events.push(DomainEvent::NodeConfigChanged {
            graph_id: self.id,
            node_id,
            node_version,
            config,
        });
        self.clear_node_outputs(node_id);
        self.evaluate_readiness(node_id);
        self.touch();
        Ok(())
    }

    /// Remove a node, severing every incident edge first
    ///
    /// Emits one `NodeInputDisconnected` per incident edge and one
    /// `NodeOutputImageUnset` per currently-set output (plus a preview unset
    /// when a thumbnail exists), all before the final `NodeRemoved`, so
    /// downstream nodes and the blob GC can react.
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<()> {
        let node = self
            .nodes
            .get(&node_id)
            .ok_or(GraphError::UnknownNode(node_id))?;

        let incoming: Vec<(UpstreamRef, String)> = node
            .inputs
            .values()
            .filter_map(|input| {
                input
                    .connection
                    .clone()
                    .map(|upstream| (upstream, input.name.clone()))
            })
            .collect();
        let outgoing: Vec<(String, DownstreamRef)> = node
            .outputs
            .values()
            .flat_map(|output| {
                output
                    .connections
                    .iter()
                    .cloned()
                    .map(move |downstream| (output.name.clone(), downstream))
            })
            .collect();

        // Sever edges feeding this node.
        for (upstream, input_name) in incoming {
            if let Some(from_node) = self.nodes.get_mut(&upstream.node_id) {
                if let Some(output) = from_node.outputs.get_mut(&upstream.output) {
                    output.connections.remove(&DownstreamRef {
                        node_id,
                        input: input_name.clone(),
                    });
                }
            }
            if let Some(node) = self.nodes.get_mut(&node_id) {
                if let Some(input) = node.inputs.get_mut(&input_name) {
                    input.connection = None;
                }
            }
            self.events.push(DomainEvent::NodeInputDisconnected {
                graph_id: self.id,
                node_id,
                input: input_name,
                from_node: upstream.node_id,
                from_output: upstream.output,
            });
        }

        // Sever edges leaving this node, clearing what has flowed downstream.
        for (output_name, downstream) in outgoing {
            if let Some(down_node) = self.nodes.get_mut(&downstream.node_id) {
                if let Some(input) = down_node.inputs.get_mut(&downstream.input) {
                    input.connection = None;
                }
            }
            self.events.push(DomainEvent::NodeInputDisconnected {
                graph_id: self.id,
                node_id: downstream.node_id,
                input: downstream.input.clone(),
                from_node: node_id,
                from_output: output_name,
            });
            self.clear_input_image(downstream.node_id, &downstream.input);
        }

        // Unset produced blobs so the GC reacts.
        self.clear_node_outputs(node_id);
        if let Some(node) = self.nodes.get_mut(&node_id) {
            if let Some(preview) = node.preview.take() {
                self.events.push(DomainEvent::NodePreviewUnset {
                    graph_id: self.id,
                    node_id,
                    image_id: preview,
                });
            }
        }

        self.nodes.remove(&node_id);
        self.events.push(DomainEvent::NodeRemoved {
            graph_id: self.id,
            node_id,
        });
        self.touch();
        Ok(())
    }

    /// Connect an upstream output to a downstream input
    ///
    /// Rejects self-edges, occupied inputs, and cycle-creating edges. When
    /// the upstream output already carries an image, it is copied into the
    /// new input in the same mutation and readiness is evaluated
    /// immediately.
    pub fn connect_nodes(
        &mut self,
        from: NodeId,
        output: &str,
        to: NodeId,
        input: &str,
    ) -> Result<()> {
        if from == to {
            return Err(GraphError::SelfReference(from));
        }
        let from_node = self.nodes.get(&from).ok_or(GraphError::UnknownNode(from))?;
        let from_output = from_node
            .outputs
            .get(output)
            .ok_or_else(|| GraphError::UnknownOutput {
                node: from,
                output: output.to_string(),
            })?;
        let upstream_image = from_output.image_id;
        let to_node = self.nodes.get(&to).ok_or(GraphError::UnknownNode(to))?;
        let to_input = to_node
            .inputs
            .get(input)
            .ok_or_else(|| GraphError::UnknownInput {
                node: to,
                input: input.to_string(),
            })?;
        // A duplicate edge implies an occupied input: edges are always
        // severed from both sides together, so this one check covers both.
        if to_input.is_connected() {
            return Err(GraphError::InputAlreadyConnected {
                node: to,
                input: input.to_string(),
            });
        }
        if self.reaches(to, from) {
            return Err(GraphError::CycleDetected { from, to });
        }

        if let Some(node) = self.nodes.get_mut(&from) {
            if let Some(out) = node.outputs.get_mut(output) {
                out.connections.insert(DownstreamRef {
                    node_id: to,
                    input: input.to_string(),
                });
            }
        }
        if let Some(node) = self.nodes.get_mut(&to) {
            if let Some(port) = node.inputs.get_mut(input) {
                port.connection = Some(UpstreamRef {
                    node_id: from,
                    output: output.to_string(),
                });
            }
        }
        self.events.push(DomainEvent::NodeInputConnected {
            graph_id: self.id,
            node_id: to,
            input: input.to_string(),
            from_node: from,
            from_output: output.to_string(),
        });

        // The upstream output may already be computed; flow it in now.
        if let Some(image_id) = upstream_image {
            self.set_input_image(to, input, image_id);
        }
        self.touch();
        Ok(())
    }

    /// Sever the exact edge `(from, output) → (to, input)`
    pub fn disconnect_nodes(
        &mut self,
        from: NodeId,
        output: &str,
        to: NodeId,
        input: &str,
    ) -> Result<()> {
        let from_node = self.nodes.get(&from).ok_or(GraphError::UnknownNode(from))?;
        if !from_node.outputs.contains_key(output) {
            return Err(GraphError::UnknownOutput {
                node: from,
                output: output.to_string(),
            });
        }
        let to_node = self.nodes.get(&to).ok_or(GraphError::UnknownNode(to))?;
        let to_input = to_node
            .inputs
            .get(input)
            .ok_or_else(|| GraphError::UnknownInput {
                node: to,
                input: input.to_string(),
            })?;
        let expected = UpstreamRef {
            node_id: from,
            output: output.to_string(),
        };
        if to_input.connection.as_ref() != Some(&expected) {
            return Err(GraphError::NotConnected {
                from,
                output: output.to_string(),
                to,
                input: input.to_string(),
            });
        }

        if let Some(node) = self.nodes.get_mut(&from) {
            if let Some(out) = node.outputs.get_mut(output) {
                out.connections.remove(&DownstreamRef {
                    node_id: to,
                    input: input.to_string(),
                });
            }
        }
        if let Some(node) = self.nodes.get_mut(&to) {
            if let Some(port) = node.inputs.get_mut(input) {
                port.connection = None;
            }
        }
        self.events.push(DomainEvent::NodeInputDisconnected {
            graph_id: self.id,
            node_id: to,
            input: input.to_string(),
            from_node: from,
            from_output: output.to_string(),
        });
        self.clear_input_image(to, input);
        self.touch();
        Ok(())
    }

    /// Version-guarded write-back of a computed output image
    ///
    /// A mismatched `expected_version` means the node was edited while the
    /// result was being computed; the call is then a silent no-op.
    pub fn set_node_output_image(
        &mut self,
        node_id: NodeId,
        output: &str,
        image_id: ImageId,
        expected_version: u64,
    ) -> Result<()> {
        let graph_id = self.id;
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::UnknownNode(node_id))?;
        if !node.outputs.contains_key(output) {
            return Err(GraphError::UnknownOutput {
                node: node_id,
                output: output.to_string(),
            });
        }
        if node.version != expected_version {
            tracing::debug!(
                node_id = %node_id,
                expected = expected_version,
                current = node.version,
                "dropping stale output write-back"
            );
            return Ok(());
        }
        let node_version = node.version;
        let node_type = node.node_type;
        let mut replaced = None;
        if let Some(port) = node.outputs.get_mut(output) {
            let old = port.image_id.replace(image_id);
            if old != Some(image_id) {
                replaced = old;
            }
        }
        if let Some(old_id) = replaced {
            self.events.push(DomainEvent::NodeOutputImageUnset {
                graph_id,
                node_id,
                output: output.to_string(),
                image_id: old_id,
            });
        }
        self.events.push(DomainEvent::NodeOutputImageSet {
            graph_id,
            node_id,
            node_version,
            node_type,
            output: output.to_string(),
            image_id,
        });
        if let Some(node) = self.nodes.get_mut(&node_id) {
            if node.outputs_complete() {
                node.state = NodeState::Generated;
            }
        }
        self.touch();
        Ok(())
    }

    /// Clear a computed output, invalidating it at a fresh version
    pub fn unset_node_output_image(&mut self, node_id: NodeId, output: &str) -> Result<()> {
        let graph_id = self.id;
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::UnknownNode(node_id))?;
        let port = node
            .outputs
            .get_mut(output)
            .ok_or_else(|| GraphError::UnknownOutput {
                node: node_id,
                output: output.to_string(),
            })?;
        if let Some(image_id) = port.image_id.take() {
            node.bump();
            self.events.push(DomainEvent::NodeOutputImageUnset {
                graph_id,
                node_id,
                output: output.to_string(),
                image_id,
            });
            self.evaluate_readiness(node_id);
            self.touch();
        }
        Ok(())
    }

    /// Version-guarded write-back of a preview thumbnail
    pub fn set_node_preview(
        &mut self,
        node_id: NodeId,
        image_id: ImageId,
        expected_version: u64,
    ) -> Result<()> {
        let graph_id = self.id;
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::UnknownNode(node_id))?;
        if node.version != expected_version {
            tracing::debug!(
                node_id = %node_id,
                expected = expected_version,
                current = node.version,
                "dropping stale preview write-back"
            );
            return Ok(());
        }
        let node_version = node.version;
        let old = node.preview.replace(image_id);
        if let Some(old_id) = old {
            if old_id != image_id {
                self.events.push(DomainEvent::NodePreviewUnset {
                    graph_id,
                    node_id,
                    image_id: old_id,
                });
            }
        }
        self.events.push(DomainEvent::NodePreviewSet {
            graph_id,
            node_id,
            node_version,
            image_id,
        });
        self.touch();
        Ok(())
    }

    /// Clear a node's preview thumbnail
    pub fn unset_node_preview(&mut self, node_id: NodeId) -> Result<()> {
        let graph_id = self.id;
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::UnknownNode(node_id))?;
        if let Some(image_id) = node.preview.take() {
            self.events.push(DomainEvent::NodePreviewUnset {
                graph_id,
                node_id,
                image_id,
            });
            self.touch();
        }
        Ok(())
    }

    /// Copy an output's image into every connected downstream input
    ///
    /// Skips silently when the output no longer carries `image_id` - the
    /// propagation raced a later invalidation and must not resurrect stale
    /// data. Downstream nodes whose input actually changes get a version
    /// bump and a readiness evaluation.
    pub fn propagate_output_image_to_connections(
        &mut self,
        node_id: NodeId,
        output: &str,
        image_id: ImageId,
    ) -> Result<()> {
        let node = self.nodes.get(&node_id).ok_or(GraphError::UnknownNode(node_id))?;
        let port = node
            .outputs
            .get(output)
            .ok_or_else(|| GraphError::UnknownOutput {
                node: node_id,
                output: output.to_string(),
            })?;
        if port.image_id != Some(image_id) {
            tracing::debug!(
                node_id = %node_id,
                output,
                "skipping propagation of superseded output image"
            );
            return Ok(());
        }
        let targets: Vec<DownstreamRef> = port.connections.iter().cloned().collect();
        let mut changed = false;
        for target in targets {
            changed |= self.set_input_image(target.node_id, &target.input, image_id);
        }
        if changed {
            self.touch();
        }
        Ok(())
    }

    /// Clear every downstream input fed by this output
    pub fn unset_node_output_connections(&mut self, node_id: NodeId, output: &str) -> Result<()> {
        let node = self.nodes.get(&node_id).ok_or(GraphError::UnknownNode(node_id))?;
        let port = node
            .outputs
            .get(output)
            .ok_or_else(|| GraphError::UnknownOutput {
                node: node_id,
                output: output.to_string(),
            })?;
        let targets: Vec<DownstreamRef> = port.connections.iter().cloned().collect();
        let mut changed = false;
        for target in targets {
            changed |= self.clear_input_image(target.node_id, &target.input);
        }
        if changed {
            self.touch();
        }
        Ok(())
    }

    /// True when a path of connections leads from `start` to `target`
    fn reaches(&self, start: NodeId, target: NodeId) -> bool {
        let mut stack = vec![start];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                for output in node.outputs.values() {
                    stack.extend(output.connections.iter().map(|c| c.node_id));
                }
            }
        }
        false
    }

    /// Set an input image; on change, bump, invalidate computed outputs,
    /// and re-evaluate readiness. Returns whether anything changed.
    fn set_input_image(&mut self, node_id: NodeId, input: &str, image_id: ImageId) -> bool {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return false;
        };
        let Some(port) = node.inputs.get_mut(input) else {
            return false;
        };
        if port.image_id == Some(image_id) {
            return false;
        }
        let had_image = port.image_id.replace(image_id).is_some();
        node.bump();
        if had_image {
            self.clear_node_outputs(node_id);
        }
        self.evaluate_readiness(node_id);
        true
    }

    /// Clear an input image; on change, bump, invalidate computed outputs,
    /// and re-evaluate readiness. Returns whether anything changed.
    fn clear_input_image(&mut self, node_id: NodeId, input: &str) -> bool {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return false;
        };
        let Some(port) = node.inputs.get_mut(input) else {
            return false;
        };
        if port.image_id.take().is_none() {
            return false;
        }
        node.bump();
        self.clear_node_outputs(node_id);
        self.evaluate_readiness(node_id);
        true
    }

    /// Unset every computed output of a node, emitting one unset per blob
    fn clear_node_outputs(&mut self, node_id: NodeId) {
        let graph_id = self.id;
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        let mut unset = Vec::new();
        for output in node.outputs.values_mut() {
            if let Some(image_id) = output.image_id.take() {
                unset.push(DomainEvent::NodeOutputImageUnset {
                    graph_id,
                    node_id,
                    output: output.name.clone(),
                    image_id,
                });
            }
        }
        self.events.extend(unset);
    }

    /// Re-derive a node's state; emits `NodeNeedsOutputs` when it became
    /// ready at the current version
    fn evaluate_readiness(&mut self, node_id: NodeId) {
        let graph_id = self.id;
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        if !node.node_type.generates() {
            node.state = if node.outputs_complete() {
                NodeState::Generated
            } else {
                NodeState::Waiting
            };
            return;
        }
        if node.inputs_complete() {
            node.state = NodeState::Generating;
            let event = DomainEvent::NodeNeedsOutputs {
                graph_id,
                node_id,
                node_version: node.version,
                node_type: node.node_type,
                config: node.config.clone(),
                inputs: node.input_images(),
            };
            self.events.push(event);
        } else {
            node.state = NodeState::Waiting;
        }
    }

    fn touch(&mut self) {
        self.version += 1;
    }
}
