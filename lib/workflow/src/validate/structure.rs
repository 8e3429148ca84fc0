//! DAG invariants.

use crate::error::StructuralError;
use crate::graph::WorkflowGraph;
use crate::node::NodeId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Control, DfsEvent, depth_first_search};
use std::collections::HashMap;

/// Checks that a graph is a non-empty DAG with at least one trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphStructureValidator;

impl GraphStructureValidator {
    /// Validates the graph structure.
    ///
    /// Checks run in order: node ids, emptiness, trigger presence, edge
    /// endpoints, then acyclicity. The cycle check walks from every node, so
    /// a cycle in a component unreachable from any trigger is still found.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(graph: &WorkflowGraph) -> Result<(), StructuralError> {
        let mut dag: DiGraph<&NodeId, ()> = DiGraph::with_capacity(graph.nodes.len(), graph.edges.len());
        let mut indices: HashMap<&NodeId, NodeIndex> = HashMap::with_capacity(graph.nodes.len());

        for (index, node) in graph.nodes.iter().enumerate() {
            if node.id.is_empty() || indices.contains_key(&node.id) {
                return Err(StructuralError::DuplicateOrMissingNodeId {
                    index,
                    node_id: node.id.clone(),
                });
            }
            indices.insert(&node.id, dag.add_node(&node.id));
        }

        if graph.nodes.is_empty() {
            return Err(StructuralError::EmptyGraph);
        }

        if !graph.nodes.iter().any(|node| node.is_trigger()) {
            return Err(StructuralError::NoTriggerNode);
        }

        for edge in &graph.edges {
            let endpoints = edge
                .source_id()
                .zip(edge.target_id())
                .and_then(|(source, target)| Some((*indices.get(&source)?, *indices.get(&target)?)));
            let Some((source, target)) = endpoints else {
                return Err(StructuralError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                });
            };
            dag.add_edge(source, target, ());
        }

        let cycle = depth_first_search(&dag, dag.node_indices(), |event| match event {
            DfsEvent::BackEdge(_, target) => Control::Break(target),
            _ => Control::Continue,
        });

        if let Some(index) = cycle.break_value() {
            return Err(StructuralError::CycleDetected {
                node_id: dag[index].clone(),
            });
        }

        Ok(())
    }
}
