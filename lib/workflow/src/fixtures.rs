//! Shared builders for workflow tests.

use crate::definition::{Workflow, WorkflowVersion};
use crate::edge::Edge;
use crate::graph::WorkflowGraph;
use crate::node::Node;
use crate::run::Run;
use sensorflow_core::{
    DeviceId, OrganizationId, RunId, TelemetryRecordId, TopicId, WorkflowId, WorkflowVersionId,
};
use sensorflow_device::{CatalogSnapshot, InMemoryCatalog, TelemetryRecord};
use serde_json::{Value as JsonValue, json};

pub(crate) fn org() -> OrganizationId {
    OrganizationId::new(1).expect("positive")
}

/// Energy meter (device 1) publishing voltages on topic 5, an RGB strip
/// (device 2) accepting commands on topic 6 and publishing state on topic 7,
/// and a device of another organization.
pub(crate) fn catalog() -> InMemoryCatalog {
    let snapshot: CatalogSnapshot = serde_json::from_value(json!({
        "devices": [
            {"id": 1, "organization_id": 1, "device_type_id": 1, "schema_version_id": 1, "name": "Energy Meter"},
            {"id": 2, "organization_id": 1, "device_type_id": 2, "schema_version_id": 2, "name": "RGB Strip"},
            {"id": 3, "organization_id": 2, "device_type_id": 1, "schema_version_id": 3, "name": "Foreign Meter"}
        ],
        "topics": [
            {"id": 5, "schema_version_id": 1, "key": "telemetry", "direction": "publish"},
            {"id": 6, "schema_version_id": 2, "key": "control", "direction": "subscribe"},
            {"id": 7, "schema_version_id": 2, "key": "state", "direction": "publish"},
            {"id": 8, "schema_version_id": 3, "key": "telemetry", "direction": "publish"}
        ],
        "parameters": [
            {"id": 9, "topic_id": 5, "key": "V1", "json_path": "voltages.V1", "data_type": "decimal", "required": true},
            {"id": 12, "topic_id": 5, "key": "V2", "json_path": "voltages.V2", "data_type": "decimal"},
            {"id": 10, "topic_id": 6, "key": "power", "json_path": "power", "data_type": "boolean", "required": true, "default_value": false},
            {"id": 11, "topic_id": 6, "key": "color", "json_path": "color", "data_type": "string", "required": true,
             "default_value": "RED", "validation_rules": {"enum": ["RED", "GREEN", "BLUE"]}},
            {"id": 13, "topic_id": 8, "key": "V1", "json_path": "voltages.V1", "data_type": "decimal"}
        ]
    }))
    .expect("snapshot");
    InMemoryCatalog::from_snapshot(snapshot)
}

pub(crate) fn workflow() -> Workflow {
    Workflow::new(WorkflowId::new(1).expect("positive"), org(), "Voltage guard")
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

pub(crate) fn run() -> Run {
    Run::start(
        RunId::new(1).expect("positive"),
        org(),
        WorkflowId::new(1).expect("positive"),
        WorkflowVersionId::new(1).expect("positive"),
        "telemetry",
        json!({"telemetry_record_id": 1}),
    )
}

pub(crate) fn trigger_node(id: &str, device_id: i64, topic_id: i64, parameter_definition_id: i64) -> Node {
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

pub(crate) fn condition_node(id: &str, operator: &str, right: JsonValue) -> Node {
    Node::new(
        id,
        "condition",
        json!({
            "mode": "guided",
            "guided": {"left": "trigger.value", "operator": operator, "right": right},
        }),
    )
}

pub(crate) fn command_node(id: &str, device_id: i64, topic_id: i64, payload: JsonValue) -> Node {
    Node::new(
        id,
        "command",
        json!({
            "payload_mode": "schema_form",
            "target": {"device_id": device_id, "topic_id": topic_id},
            "payload": payload,
        }),
    )
}

pub(crate) fn edge(source: &str, target: &str) -> Edge {
    Edge::new(format!("{source}->{target}"), source, target)
}

/// Meter voltage above 40 turns the strip on and green.
pub(crate) fn scenario_graph() -> WorkflowGraph {
    WorkflowGraph::new(
        vec![
            trigger_node("trigger", 1, 5, 9),
            condition_node("condition", ">", json!(40)),
            command_node("command", 2, 6, json!({"power": true, "color": "GREEN"})),
        ],
        vec![edge("trigger", "condition"), edge("condition", "command")],
    )
}

/// A meter reading on topic 5 with `voltages.V1 = value`.
pub(crate) fn record(value: JsonValue) -> TelemetryRecord {
    TelemetryRecord::new(
        TelemetryRecordId::new(1).expect("positive"),
        DeviceId::new(1).expect("positive"),
        TopicId::new(5).expect("positive"),
        json!({"voltages": {"V1": value}})
            .as_object()
            .cloned()
            .expect("object"),
    )
}
