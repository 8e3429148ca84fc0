//! Telemetry trigger index for sensorflow workflows.
//!
//! Publishing a workflow version compiles its telemetry triggers into index
//! rows. Each incoming telemetry record is matched against those rows to find
//! the workflow versions it should run.

pub mod compiler;
pub mod error;
pub mod matcher;
pub mod store;

pub use compiler::{CompileResult, TriggerCompiler};
pub use error::TriggerIndexError;
pub use matcher::TriggerMatcher;
pub use store::{InMemoryTriggerIndexStore, TelemetryScope, TriggerIndexRow, TriggerIndexStore};

#[cfg(test)]
pub(crate) mod tests {
    use sensorflow_core::{DeviceId, OrganizationId, TelemetryRecordId, TopicId, WorkflowId, WorkflowVersionId};
    use sensorflow_device::{CatalogSnapshot, InMemoryCatalog, TelemetryRecord};
    use sensorflow_workflow::{Node, Workflow, WorkflowGraph, WorkflowVersion};
    use serde_json::json;

    /// Energy meter (device 1, type 10) publishing on topic 5, an RGB strip
    /// (device 2, type 20) with a command topic 6 and a state topic 7, and a
    /// meter owned by another organization.
    pub(crate) fn catalog() -> InMemoryCatalog {
        let snapshot: CatalogSnapshot = serde_json::from_value(json!({
            "devices": [
                {"id": 1, "organization_id": 1, "device_type_id": 10, "schema_version_id": 1, "name": "Energy Meter"},
                {"id": 2, "organization_id": 1, "device_type_id": 20, "schema_version_id": 2, "name": "RGB Strip"},
                {"id": 3, "organization_id": 2, "device_type_id": 10, "schema_version_id": 3, "name": "Foreign Meter"}
            ],
            "topics": [
                {"id": 5, "schema_version_id": 1, "key": "telemetry", "direction": "publish"},
                {"id": 6, "schema_version_id": 2, "key": "control", "direction": "subscribe"},
                {"id": 7, "schema_version_id": 2, "key": "state", "direction": "publish"},
                {"id": 8, "schema_version_id": 3, "key": "telemetry", "direction": "publish"}
            ],
            "parameters": [
                {"id": 9, "topic_id": 5, "key": "V1", "json_path": "voltages.V1", "data_type": "decimal"},
                {"id": 12, "topic_id": 5, "key": "V2", "json_path": "voltages.V2", "data_type": "decimal"},
                {"id": 10, "topic_id": 6, "key": "power", "json_path": "power", "data_type": "boolean"},
                {"id": 14, "topic_id": 7, "key": "power", "json_path": "power", "data_type": "boolean"},
                {"id": 13, "topic_id": 8, "key": "V1", "json_path": "voltages.V1", "data_type": "decimal"}
            ]
        }))
        .expect("snapshot");
        InMemoryCatalog::from_snapshot(snapshot)
    }

    pub(crate) fn workflow() -> Workflow {
        Workflow::new(
            WorkflowId::new(1).expect("positive"),
            OrganizationId::new(1).expect("positive"),
            "Voltage guard",
        )
    }

    pub(crate) fn version(graph: &WorkflowGraph) -> WorkflowVersion {
        WorkflowVersion::new(
            WorkflowVersionId::new(1).expect("positive"),
            WorkflowId::new(1).expect("positive"),
            1,
            graph,
        )
        .expect("encodable graph")
    }

    pub(crate) fn trigger(id: &str, device_id: i64, topic_id: i64, parameter_definition_id: i64) -> Node {
        Node::new(
            id,
            "telemetry-trigger",
            json!({
                "mode": "event",
                "source": {
                    "device_id": device_id,
                    "topic_id": topic_id,
                    "parameter_definition_id": parameter_definition_id,
                },
            }),
        )
    }

    pub(crate) fn graph(nodes: Vec<Node>) -> WorkflowGraph {
        WorkflowGraph::new(nodes, Vec::new())
    }

    /// A reading with `voltages.V1 = 50`.
    pub(crate) fn record(device_id: i64, topic_id: i64) -> TelemetryRecord {
        TelemetryRecord::new(
            TelemetryRecordId::new(1).expect("positive"),
            DeviceId::new(device_id).expect("positive"),
            TopicId::new(topic_id).expect("positive"),
            json!({"voltages": {"V1": 50}}).as_object().cloned().expect("object"),
        )
    }
}
