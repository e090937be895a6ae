//! Property tests: the structural invariants hold after every successful
//! mutation, for arbitrary edit sequences.
//!
//! Propagation normally flows through the bus; here each output set is
//! immediately followed by its propagation call, which is the state the
//! system settles into between bus iterations.

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use pixelgraph_core::{
    DownstreamRef, GraphId, ImageGraph, ImageId, NodeConfig, NodeId, NodeType, UpstreamRef,
};

const SLOTS: usize = 6;

const TYPE_POOL: [NodeType; 6] = [
    NodeType::Input,
    NodeType::Blur,
    NodeType::Crop,
    NodeType::ResizeMatch,
    NodeType::PaletteCreate,
    NodeType::Output,
];

#[derive(Debug, Clone)]
enum Op {
    Add { slot: usize, type_idx: usize },
    Connect { from: usize, to: usize, input_idx: usize },
    Disconnect { from: usize, to: usize, input_idx: usize },
    SetConfig { slot: usize, radius: u32 },
    SetOutput { slot: usize },
    StaleSetOutput { slot: usize },
    Remove { slot: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..SLOTS, 0..TYPE_POOL.len()).prop_map(|(slot, type_idx)| Op::Add { slot, type_idx }),
        (0..SLOTS, 0..SLOTS, 0..2usize)
            .prop_map(|(from, to, input_idx)| Op::Connect { from, to, input_idx }),
        (0..SLOTS, 0..SLOTS, 0..2usize)
            .prop_map(|(from, to, input_idx)| Op::Disconnect { from, to, input_idx }),
        (0..SLOTS, 1..16u32).prop_map(|(slot, radius)| Op::SetConfig { slot, radius }),
        (0..SLOTS).prop_map(|slot| Op::SetOutput { slot }),
        (0..SLOTS).prop_map(|slot| Op::StaleSetOutput { slot }),
        (0..SLOTS).prop_map(|slot| Op::Remove { slot }),
    ]
}

fn first_output(graph: &ImageGraph, node_id: NodeId) -> Option<String> {
    graph
        .node(node_id)?
        .outputs
        .keys()
        .next()
        .cloned()
}

fn input_at(graph: &ImageGraph, node_id: NodeId, input_idx: usize) -> Option<String> {
    let node = graph.node(node_id)?;
    let names: Vec<&String> = node.inputs.keys().collect();
    if names.is_empty() {
        return None;
    }
    Some(names[input_idx % names.len()].clone())
}

/// Apply one op; ops against missing nodes or invalid edges simply fail
/// validation, which is part of what the properties cover.
fn apply(graph: &mut ImageGraph, ids: &[NodeId; SLOTS], op: &Op) {
    match op {
        Op::Add { slot, type_idx } => {
            let _ = graph.add_node(ids[*slot], TYPE_POOL[*type_idx], "node");
        }
        Op::Connect { from, to, input_idx } => {
            let (Some(output), Some(input)) = (
                first_output(graph, ids[*from]),
                input_at(graph, ids[*to], *input_idx),
            ) else {
                return;
            };
            let _ = graph.connect_nodes(ids[*from], &output, ids[*to], &input);
        }
        Op::Disconnect { from, to, input_idx } => {
            let (Some(output), Some(input)) = (
                first_output(graph, ids[*from]),
                input_at(graph, ids[*to], *input_idx),
            ) else {
                return;
            };
            let _ = graph.disconnect_nodes(ids[*from], &output, ids[*to], &input);
        }
        Op::SetConfig { slot, radius } => {
            let Some(node) = graph.node(ids[*slot]) else {
                return;
            };
            if node.node_type == NodeType::Blur {
                let _ = graph.set_node_config(ids[*slot], NodeConfig::Blur { radius: *radius });
            }
        }
        Op::SetOutput { slot } => {
            let Some(output) = first_output(graph, ids[*slot]) else {
                return;
            };
            let version = match graph.node(ids[*slot]) {
                Some(node) => node.version,
                None => return,
            };
            let image = ImageId::new();
            let _ = graph.set_node_output_image(ids[*slot], &output, image, version);
            let _ = graph.propagate_output_image_to_connections(ids[*slot], &output, image);
        }
        Op::StaleSetOutput { slot } => {
            let Some(output) = first_output(graph, ids[*slot]) else {
                return;
            };
            let version = match graph.node(ids[*slot]) {
                Some(node) => node.version,
                None => return,
            };
            let _ =
                graph.set_node_output_image(ids[*slot], &output, ImageId::new(), version + 100);
        }
        Op::Remove { slot } => {
            let _ = graph.remove_node(ids[*slot]);
        }
    }
}

fn check_invariants(graph: &ImageGraph, prev_versions: &BTreeMap<NodeId, u64>) {
    for node in graph.nodes() {
        // I1: port key sets equal the type schema.
        let schema_inputs: BTreeSet<String> = node
            .node_type
            .input_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let schema_outputs: BTreeSet<String> = node
            .node_type
            .output_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            node.inputs.keys().cloned().collect::<BTreeSet<_>>(),
            schema_inputs
        );
        assert_eq!(
            node.outputs.keys().cloned().collect::<BTreeSet<_>>(),
            schema_outputs
        );

        // I2 + I3 + I4: symmetric edges, connected flag, total propagation.
        for input in node.inputs.values() {
            assert_eq!(input.is_connected(), input.connection.is_some());
            if let Some(upstream_ref) = &input.connection {
                let upstream = graph
                    .node(upstream_ref.node_id)
                    .expect("connection references a missing upstream node");
                let output = upstream
                    .outputs
                    .get(&upstream_ref.output)
                    .expect("connection references a missing upstream output");
                assert!(output.connections.contains(&DownstreamRef {
                    node_id: node.id,
                    input: input.name.clone(),
                }));
                if let Some(image) = output.image_id {
                    assert_eq!(input.image_id, Some(image), "propagation must be total");
                }
            }
        }
        for output in node.outputs.values() {
            for downstream_ref in &output.connections {
                let downstream = graph
                    .node(downstream_ref.node_id)
                    .expect("fan-out references a missing downstream node");
                let input = downstream
                    .inputs
                    .get(&downstream_ref.input)
                    .expect("fan-out references a missing downstream input");
                assert_eq!(
                    input.connection.as_ref(),
                    Some(&UpstreamRef {
                        node_id: node.id,
                        output: output.name.clone(),
                    })
                );
            }
        }

        // I7: versions never move backwards.
        if let Some(previous) = prev_versions.get(&node.id) {
            assert!(node.version >= *previous);
        }
    }

    // I6: every input has at most one incoming edge.
    let mut incoming: BTreeMap<(NodeId, String), usize> = BTreeMap::new();
    for node in graph.nodes() {
        for output in node.outputs.values() {
            for downstream_ref in &output.connections {
                *incoming
                    .entry((downstream_ref.node_id, downstream_ref.input.clone()))
                    .or_default() += 1;
            }
        }
    }
    for count in incoming.values() {
        assert!(*count <= 1);
    }

    // I5: acyclicity, via Kahn's algorithm.
    let mut indegree: BTreeMap<NodeId, usize> = graph.nodes().map(|n| (n.id, 0)).collect();
    for node in graph.nodes() {
        for output in node.outputs.values() {
            for downstream_ref in &output.connections {
                if let Some(entry) = indegree.get_mut(&downstream_ref.node_id) {
                    *entry += 1;
                }
            }
        }
    }
    let mut queue: VecDeque<NodeId> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut processed = 0;
    while let Some(current) = queue.pop_front() {
        processed += 1;
        if let Some(node) = graph.node(current) {
            for output in node.outputs.values() {
                for downstream_ref in &output.connections {
                    if let Some(entry) = indegree.get_mut(&downstream_ref.node_id) {
                        *entry -= 1;
                        if *entry == 0 {
                            queue.push_back(downstream_ref.node_id);
                        }
                    }
                }
            }
        }
    }
    assert_eq!(processed, graph.node_count(), "connection graph has a cycle");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_after_every_mutation(
        ops in proptest::collection::vec(op_strategy(), 1..60)
    ) {
        let ids: [NodeId; SLOTS] = std::array::from_fn(|_| NodeId::new());
        let mut graph = ImageGraph::new(GraphId::new(), "proptest").unwrap();
        let mut prev_versions = BTreeMap::new();

        for op in &ops {
            apply(&mut graph, &ids, op);
            graph.take_events();
            check_invariants(&graph, &prev_versions);
            prev_versions = graph.nodes().map(|n| (n.id, n.version)).collect();
        }
    }

    #[test]
    fn stale_write_backs_never_mutate(
        slot in 0..SLOTS,
        type_idx in 0..TYPE_POOL.len(),
    ) {
        let ids: [NodeId; SLOTS] = std::array::from_fn(|_| NodeId::new());
        let mut graph = ImageGraph::new(GraphId::new(), "proptest").unwrap();
        graph.add_node(ids[slot], TYPE_POOL[type_idx], "node").unwrap();
        graph.take_events();

        let before = graph.clone();
        let output = graph
            .node(ids[slot])
            .unwrap()
            .outputs
            .keys()
            .next()
            .cloned()
            .unwrap();
        let version = graph.node(ids[slot]).unwrap().version;

        graph
            .set_node_output_image(ids[slot], &output, ImageId::new(), version + 1)
            .unwrap();

        prop_assert_eq!(graph.node(ids[slot]), before.node(ids[slot]));
        prop_assert!(!graph.has_pending_events());
    }
}
