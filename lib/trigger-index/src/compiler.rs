//! Compiles a workflow version's telemetry triggers into index rows.

use crate::error::TriggerIndexError;
use crate::store::{TriggerIndexRow, TriggerIndexStore};
use sensorflow_core::Result;
use sensorflow_device::resolution::{self, ResolutionFailure};
use sensorflow_device::DeviceCatalog;
use sensorflow_workflow::node::NodeConfig;
use sensorflow_workflow::{Node, Workflow, WorkflowGraph, WorkflowVersion};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

/// Row counts from one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompileResult {
    pub deleted: usize,
    pub inserted: usize,
}

/// Rebuilds the trigger index rows of a workflow version.
pub struct TriggerCompiler {
    catalog: Arc<dyn DeviceCatalog>,
    store: Arc<dyn TriggerIndexStore>,
}

impl TriggerCompiler {
    #[must_use]
    pub fn new(catalog: Arc<dyn DeviceCatalog>, store: Arc<dyn TriggerIndexStore>) -> Self {
        Self { catalog, store }
    }

    /// Replaces the version's rows with one row per distinct device and topic
    /// referenced by its telemetry triggers.
    ///
    /// Triggers that are not in `event` mode, or whose device, topic or
    /// parameter no longer resolve, are skipped. Compiling an unchanged graph
    /// again yields the same rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot answer or the store fails. A
    /// catalog failure leaves the existing rows in place.
    #[instrument(skip(self, workflow, version, graph), fields(workflow_version_id = %version.id))]
    pub async fn compile(
        &self,
        workflow: &Workflow,
        version: &WorkflowVersion,
        graph: &WorkflowGraph,
    ) -> Result<CompileResult, TriggerIndexError> {
        let mut rows = Vec::new();
        let mut seen = HashSet::new();

        for node in graph.telemetry_triggers() {
            let Some(row) = self.row_for(workflow, version, node).await? else {
                continue;
            };
            if seen.insert((row.device_id, row.schema_version_topic_id)) {
                rows.push(row);
            }
        }

        let deleted = self.store.delete_version(version.id).await?;
        let inserted = self.store.insert(rows).await?;

        tracing::info!(deleted, inserted, "Compiled workflow trigger index");

        Ok(CompileResult { deleted, inserted })
    }

    /// Resolves one trigger node, or `None` when its references are stale.
    async fn row_for(
        &self,
        workflow: &Workflow,
        version: &WorkflowVersion,
        node: &Node,
    ) -> Result<Option<TriggerIndexRow>, TriggerIndexError> {
        let Some(NodeConfig::TelemetryTrigger(config)) = node.config() else {
            return Ok(None);
        };
        if config.mode.as_deref() != Some("event") {
            tracing::debug!(node_id = %node.id, mode = ?config.mode, "Skipping trigger outside event mode");
            return Ok(None);
        }
        let Some((device_id, topic_id, parameter_definition_id)) =
            config.source.and_then(|source| source.complete())
        else {
            tracing::debug!(node_id = %node.id, "Skipping trigger without a complete source");
            return Ok(None);
        };

        match resolution::resolve_trigger_source(
            self.catalog.as_ref(),
            workflow.organization_id,
            device_id,
            topic_id,
            parameter_definition_id,
        )
        .await
        {
            Ok(source) => Ok(Some(TriggerIndexRow {
                organization_id: workflow.organization_id,
                workflow_version_id: version.id,
                device_id: Some(source.device.id),
                device_type_id: Some(source.device.device_type_id),
                schema_version_topic_id: Some(source.topic.id),
                filter_expression: None,
            })),
            Err(ResolutionFailure::Catalog(e)) => Err(TriggerIndexError::from(e).into()),
            Err(failure) => {
                tracing::info!(node_id = %node.id, %failure, "Skipping stale trigger");
                Ok(None)
            }
        }
    }
}
