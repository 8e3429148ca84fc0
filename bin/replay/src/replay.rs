//! Fixture loading and replay.

use rootcause::prelude::*;
use sensorflow_core::Result;
use sensorflow_automation::{
    AutomationConfig, AutomationPipeline, Collaborators, InMemoryRunRepository,
    InMemoryWorkflowRepository, PublishOutcome, RunOutcome,
};
use sensorflow_core::WorkflowVersionId;
use sensorflow_device::{
    CatalogSnapshot, CommandLog, InMemoryCatalog, RecordingDispatcher, SchemaPayloadResolver,
    TelemetryRecord,
};
use sensorflow_trigger_index::InMemoryTriggerIndexStore;
use sensorflow_workflow::{
    AlertMessage, InMemoryCooldownStore, RecordingAlertDispatcher, Workflow, WorkflowGraph,
    WorkflowVersion,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Errors from the replay binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// No fixture path was given.
    Usage,
    /// Environment configuration is invalid.
    Config { reason: String },
    /// The fixture could not be read or decoded.
    Fixture { reason: String },
    /// Publishing or handling telemetry failed.
    Pipeline,
    /// The summary could not be written.
    Output { reason: String },
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage => write!(f, "usage: sensorflow-replay <fixture.json>"),
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::Fixture { reason } => write!(f, "invalid fixture: {reason}"),
            Self::Pipeline => write!(f, "automation pipeline failed"),
            Self::Output { reason } => write!(f, "cannot write summary: {reason}"),
        }
    }
}

impl std::error::Error for ReplayError {}

/// A recorded scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub catalog: CatalogSnapshot,
    #[serde(default)]
    pub workflows: Vec<WorkflowFixture>,
    #[serde(default)]
    pub telemetry: Vec<TelemetryRecord>,
}

/// A workflow and the versions to publish for it, in order.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowFixture {
    pub workflow: Workflow,
    pub versions: Vec<VersionFixture>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionFixture {
    pub id: WorkflowVersionId,
    #[serde(default = "first_version")]
    pub version: u32,
    pub graph: WorkflowGraph,
}

fn first_version() -> u32 {
    1
}

/// Everything the replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub published: Vec<PublishOutcome>,
    pub runs: Vec<RunOutcome>,
    pub commands: Vec<CommandLog>,
    pub alerts: Vec<AlertMessage>,
}

/// Reads and decodes a fixture file.
///
/// # Errors
///
/// Returns [`ReplayError::Fixture`] if the file is unreadable or malformed.
pub fn load_fixture(path: &Path) -> Result<Fixture, ReplayError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ReplayError::Fixture {
        reason: format!("{}: {e}", path.display()),
    })?;
    let fixture = serde_json::from_str(&contents).map_err(|e| ReplayError::Fixture {
        reason: format!("{}: {e}", path.display()),
    })?;
    Ok(fixture)
}

/// Publishes every workflow version, then feeds the telemetry through the
/// pipeline in fixture order.
///
/// # Errors
///
/// Returns an error if a version fails to publish or telemetry handling fails.
pub async fn replay(config: AutomationConfig, fixture: Fixture) -> Result<ReplaySummary, ReplayError> {
    let catalog = Arc::new(InMemoryCatalog::from_snapshot(fixture.catalog));
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let alerts = Arc::new(RecordingAlertDispatcher::new());

    let pipeline = AutomationPipeline::new(
        config,
        Collaborators {
            catalog: catalog.clone(),
            payload_resolver: Arc::new(SchemaPayloadResolver::new(catalog)),
            dispatcher: dispatcher.clone(),
            trigger_index: Arc::new(InMemoryTriggerIndexStore::new()),
            workflows: Arc::new(InMemoryWorkflowRepository::new()),
            runs: Arc::new(InMemoryRunRepository::new()),
        },
    )
    .with_alerts(alerts.clone(), Arc::new(InMemoryCooldownStore::new()));

    let mut published = Vec::new();
    for entry in &fixture.workflows {
        for version in &entry.versions {
            let version = WorkflowVersion::new(version.id, entry.workflow.id, version.version, &version.graph)
                .map_err(|e| ReplayError::Fixture { reason: e.to_string() })?;
            let outcome = pipeline
                .publish_version(&entry.workflow, version)
                .await
                .context(ReplayError::Pipeline)?;
            published.push(outcome);
        }
    }

    let mut runs = Vec::new();
    for record in &fixture.telemetry {
        runs.extend(
            pipeline
                .handle_telemetry(record)
                .await
                .context(ReplayError::Pipeline)?,
        );
    }

    tracing::info!(
        published = published.len(),
        telemetry = fixture.telemetry.len(),
        runs = runs.len(),
        "Replay finished"
    );

    Ok(ReplaySummary {
        published,
        runs,
        commands: dispatcher.dispatched(),
        alerts: alerts.sent().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorflow_workflow::RunStatus;
    use serde_json::json;
    use std::io::Write;

    fn fixture_json() -> serde_json::Value {
        json!({
            "catalog": {
                "devices": [
                    {"id": 1, "organization_id": 1, "device_type_id": 1, "schema_version_id": 1, "name": "Energy Meter"},
                    {"id": 2, "organization_id": 1, "device_type_id": 2, "schema_version_id": 2, "name": "RGB Strip"}
                ],
                "topics": [
                    {"id": 5, "schema_version_id": 1, "key": "telemetry", "direction": "publish"},
                    {"id": 6, "schema_version_id": 2, "key": "control", "direction": "subscribe"}
                ],
                "parameters": [
                    {"id": 9, "topic_id": 5, "key": "V1", "json_path": "voltages.V1", "data_type": "decimal"},
                    {"id": 10, "topic_id": 6, "key": "power", "json_path": "power", "data_type": "boolean"}
                ]
            },
            "workflows": [{
                "workflow": {"id": 1, "organization_id": 1, "name": "Voltage guard"},
                "versions": [{
                    "id": 1,
                    "graph": {
                        "version": 1,
                        "nodes": [
                            {"id": "trigger", "type": "telemetry-trigger", "data": {"config": {
                                "mode": "event",
                                "source": {"device_id": 1, "topic_id": 5, "parameter_definition_id": 9}
                            }}},
                            {"id": "condition", "type": "condition", "data": {"config": {
                                "mode": "guided",
                                "guided": {"left": "trigger.value", "operator": ">", "right": 40}
                            }}},
                            {"id": "command", "type": "command", "data": {"config": {
                                "payload_mode": "schema_form",
                                "target": {"device_id": 2, "topic_id": 6},
                                "payload": {"power": true}
                            }}}
                        ],
                        "edges": [
                            {"id": "e1", "source": "trigger", "target": "condition"},
                            {"id": "e2", "source": "condition", "target": "command"}
                        ]
                    }
                }]
            }],
            "telemetry": [
                {"id": 1, "device_id": 1, "schema_version_topic_id": 5,
                 "transformed_values": {"voltages": {"V1": 50}}, "recorded_at": "2024-05-01T12:00:00Z"},
                {"id": 2, "device_id": 1, "schema_version_topic_id": 5,
                 "transformed_values": {"voltages": {"V1": 10}}, "recorded_at": "2024-05-01T12:01:00Z"}
            ]
        })
    }

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write fixture");
        file
    }

    #[tokio::test]
    async fn replays_fixture_from_disk() {
        let file = write_fixture(&fixture_json().to_string());
        let fixture = load_fixture(file.path()).expect("fixture");

        let summary = replay(AutomationConfig::default(), fixture).await.expect("replay");

        assert_eq!(summary.published.len(), 1);
        assert_eq!(summary.published[0].compile.inserted, 1);
        assert_eq!(summary.runs.len(), 2);
        assert!(summary.runs.iter().all(|outcome| outcome.run.status == RunStatus::Completed));
        assert_eq!(summary.runs[0].steps.len(), 3);
        assert_eq!(summary.runs[1].steps.len(), 2);
        assert_eq!(summary.commands.len(), 1);
        assert!(summary.alerts.is_empty());

        let output = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(output["runs"][0]["run"]["status"], "completed");
    }

    #[test]
    fn malformed_fixture_is_reported() {
        let file = write_fixture("{ not json");
        let err = load_fixture(file.path()).expect_err("malformed");
        assert!(err.to_string().contains("invalid fixture"));
    }

    #[test]
    fn missing_fixture_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = load_fixture(&dir.path().join("absent.json")).expect_err("missing");
        assert!(err.to_string().contains("absent.json"));
    }
}
