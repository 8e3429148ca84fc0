//! Workflow graph encoding and lookup indexes.
//!
//! The graph is stored exactly as the editor produced it: a version number,
//! ordered node and edge lists, and an opaque viewport. Node and edge order is
//! meaningful: trigger matches run in node-list order and children run in
//! edge-list order.

use crate::edge::Edge;
use crate::error::GraphError;
use crate::node::{Node, NodeId, NodeKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

fn default_version() -> i64 {
    1
}

/// Decodes a list, replacing elements that are not objects with defaults.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let JsonValue::Array(items) = JsonValue::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .map(|item| {
            if item.is_object() {
                serde_json::from_value(item).unwrap_or_default()
            } else {
                T::default()
            }
        })
        .collect())
}

/// A workflow graph in its persisted encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default = "default_version")]
    pub version: i64,
    #[serde(default, deserialize_with = "lenient_list")]
    pub nodes: Vec<Node>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub viewport: JsonValue,
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self {
            version: default_version(),
            nodes: Vec::new(),
            edges: Vec::new(),
            viewport: JsonValue::Null,
        }
    }
}

impl WorkflowGraph {
    /// Creates a graph from nodes and edges.
    #[must_use]
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            nodes,
            edges,
            ..Self::default()
        }
    }

    /// Decodes a stored graph document.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Malformed`] when the document is not a mapping.
    pub fn from_json(document: &JsonValue) -> Result<Self, GraphError> {
        if !document.is_object() {
            return Err(GraphError::Malformed {
                reason: "graph must be a mapping".to_string(),
            });
        }
        serde_json::from_value(document.clone()).map_err(|e| GraphError::Malformed {
            reason: e.to_string(),
        })
    }

    /// Returns the first node with the given id.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.id == node_id)
    }

    /// Returns telemetry trigger nodes in node-list order.
    pub fn telemetry_triggers(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|node| node.kind() == Some(NodeKind::TelemetryTrigger))
    }

    /// Builds the lookup indexes used during execution.
    #[must_use]
    pub fn index(&self) -> GraphIndex<'_> {
        GraphIndex::new(self)
    }
}

/// Node and adjacency lookups over a [`WorkflowGraph`].
///
/// Nodes without an id are left out, and a later node with a repeated id
/// replaces the earlier one. Edges whose endpoints are not indexed nodes are
/// dropped, so stale data never points traversal at a missing node.
#[derive(Debug)]
pub struct GraphIndex<'g> {
    nodes_by_id: HashMap<&'g NodeId, &'g Node>,
    edges_by_source: HashMap<NodeId, Vec<NodeId>>,
}

impl<'g> GraphIndex<'g> {
    fn new(graph: &'g WorkflowGraph) -> Self {
        let nodes_by_id: HashMap<_, _> = graph
            .nodes
            .iter()
            .filter(|node| !node.id.is_empty())
            .map(|node| (&node.id, node))
            .collect();

        let mut edges_by_source: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for edge in &graph.edges {
            let (Some(source), Some(target)) = (edge.source_id(), edge.target_id()) else {
                continue;
            };
            if !nodes_by_id.contains_key(&source) || !nodes_by_id.contains_key(&target) {
                continue;
            }
            edges_by_source.entry(source).or_default().push(target);
        }

        Self {
            nodes_by_id,
            edges_by_source,
        }
    }

    /// Returns the node with the given id.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&'g Node> {
        self.nodes_by_id.get(node_id).copied()
    }

    /// Returns the targets of `node_id`'s outgoing edges in edge-list order.
    #[must_use]
    pub fn children(&self, node_id: &NodeId) -> &[NodeId] {
        self.edges_by_source
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the number of indexed nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes_by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph() -> WorkflowGraph {
        WorkflowGraph::from_json(&json!({
            "version": 1,
            "nodes": [
                {"id": "trigger", "type": "telemetry-trigger", "data": {"config": {}}},
                {"id": "a", "type": "condition"},
                {"id": "b", "type": "command"},
                "garbage"
            ],
            "edges": [
                {"id": "e1", "source": "trigger", "target": "b"},
                {"id": "e2", "source": "trigger", "target": "a"},
                {"id": "e3", "source": "a", "target": "missing"},
                {"id": "e4", "target": "a"}
            ],
            "viewport": {"x": 0, "y": 0, "zoom": 1}
        }))
        .expect("graph")
    }

    #[test]
    fn non_object_document_is_malformed() {
        let err = WorkflowGraph::from_json(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, GraphError::Malformed { .. }));
    }

    #[test]
    fn missing_lists_decode_empty() {
        let graph = WorkflowGraph::from_json(&json!({"nodes": "oops"})).expect("graph");
        assert_eq!(graph.version, 1);
        assert!(graph.nodes.is_empty());
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn non_object_nodes_decode_as_blank() {
        let graph = graph();
        assert_eq!(graph.nodes.len(), 4);
        assert!(graph.nodes[3].id.is_empty());
        assert_eq!(graph.telemetry_triggers().count(), 1);
    }

    #[test]
    fn children_keep_edge_order_and_skip_stale_edges() {
        let graph = graph();
        let index = graph.index();
        assert_eq!(index.node_count(), 3);
        assert_eq!(
            index.children(&NodeId::from("trigger")),
            &[NodeId::from("b"), NodeId::from("a")]
        );
        assert!(index.children(&NodeId::from("a")).is_empty());
        assert!(index.node(&NodeId::from("missing")).is_none());
    }

    #[test]
    fn viewport_is_preserved() {
        let graph = graph();
        let encoded = serde_json::to_value(&graph).expect("encode");
        assert_eq!(encoded["viewport"]["zoom"], json!(1));
    }
}
