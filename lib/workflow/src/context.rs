//! Execution context threaded along a branch.

use crate::logic;
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

/// What a node sees of the run so far.
///
/// A trigger match starts a fresh context. Query nodes derive a new context
/// for their descendants; every other node passes its context on unchanged,
/// so sibling branches never observe each other's query results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Output of the matched trigger node.
    pub trigger: JsonValue,
    /// Transformed values of the telemetry record.
    pub payload: Map<String, JsonValue>,
    /// Result of the nearest query node above this one, or `{}`.
    pub query: JsonValue,
    /// Results of every query node above this one, keyed by node id.
    pub queries: Map<String, JsonValue>,
}

impl ExecutionContext {
    /// Creates the context for one matched trigger.
    #[must_use]
    pub fn new(trigger: JsonValue, payload: Map<String, JsonValue>) -> Self {
        Self {
            trigger,
            payload,
            query: json!({}),
            queries: Map::new(),
        }
    }

    /// Returns the context descendants of query node `node_id` see.
    #[must_use]
    pub fn with_query_result(&self, node_id: &NodeId, result: JsonValue) -> Self {
        let mut queries = self.queries.clone();
        queries.insert(node_id.to_string(), result.clone());
        Self {
            trigger: self.trigger.clone(),
            payload: self.payload.clone(),
            query: result,
            queries,
        }
    }

    /// Returns the document condition expressions are evaluated against.
    ///
    /// Payload keys are available at the top level, but `trigger`, `payload`,
    /// `query` and `queries` always refer to the context.
    #[must_use]
    pub fn evaluation_data(&self) -> JsonValue {
        logic::merge_data(&self.payload, self.fields())
    }

    /// Returns the context as a JSON document.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(self.fields())
    }

    fn fields(&self) -> Map<String, JsonValue> {
        let mut fields = Map::new();
        fields.insert("trigger".to_string(), self.trigger.clone());
        fields.insert("payload".to_string(), JsonValue::Object(self.payload.clone()));
        fields.insert("query".to_string(), self.query.clone());
        fields.insert("queries".to_string(), JsonValue::Object(self.queries.clone()));
        fields
    }
}
