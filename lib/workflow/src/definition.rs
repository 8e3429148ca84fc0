//! Workflow definition types.
//!
//! A workflow belongs to one organization and owns a series of immutable
//! versions. Each version stores its graph in the raw encoding; it is decoded
//! on demand so that a corrupt stored document surfaces as an error at the
//! point of use instead of failing the whole version load.

use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use chrono::{DateTime, Utc};
use sensorflow_core::{OrganizationId, WorkflowId, WorkflowVersionId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A named automation owned by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub organization_id: OrganizationId,
    pub name: String,
    /// Version that is currently live, if any has been published.
    #[serde(default)]
    pub active_version_id: Option<WorkflowVersionId>,
}

impl Workflow {
    /// Creates a workflow with no published version.
    #[must_use]
    pub fn new(id: WorkflowId, organization_id: OrganizationId, name: impl Into<String>) -> Self {
        Self {
            id,
            organization_id,
            name: name.into(),
            active_version_id: None,
        }
    }
}

/// One immutable snapshot of a workflow's graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub id: WorkflowVersionId,
    pub workflow_id: WorkflowId,
    /// Sequence number within the workflow, starting at 1.
    pub version: u32,
    /// Graph in its stored encoding.
    pub graph: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl WorkflowVersion {
    /// Creates a version holding the encoding of `graph`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Malformed`] if the graph cannot be encoded.
    pub fn new(
        id: WorkflowVersionId,
        workflow_id: WorkflowId,
        version: u32,
        graph: &WorkflowGraph,
    ) -> Result<Self, GraphError> {
        let graph = serde_json::to_value(graph).map_err(|e| GraphError::Malformed {
            reason: e.to_string(),
        })?;
        Ok(Self {
            id,
            workflow_id,
            version,
            graph,
            created_at: Utc::now(),
        })
    }

    /// Decodes the stored graph.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Malformed`] when the stored document is not a graph.
    pub fn parse_graph(&self) -> Result<WorkflowGraph, GraphError> {
        WorkflowGraph::from_json(&self.graph)
    }
}
