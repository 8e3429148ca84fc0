//! Edge types for workflow graphs.
//!
//! An edge is pure control flow: once `source` finishes, `target` runs.

use crate::node::{NodeId, lenient_string};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// An edge between two nodes in the graph encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    /// Id of the node that runs first.
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: String,
    /// Id of the node that runs after `source`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub target: String,
    /// Editor metadata carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Edge {
    /// Creates an edge from `source` to `target`.
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            extra: Map::new(),
        }
    }

    /// Returns the source node id, if non-empty.
    #[must_use]
    pub fn source_id(&self) -> Option<NodeId> {
        (!self.source.is_empty()).then(|| NodeId::from(self.source.as_str()))
    }

    /// Returns the target node id, if non-empty.
    #[must_use]
    pub fn target_id(&self) -> Option<NodeId> {
        (!self.target.is_empty()).then(|| NodeId::from(self.target.as_str()))
    }
}
