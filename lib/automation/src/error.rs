//! Error types for the automation pipelines.
//!
//! Errors are designed for layered context using rootcause:
//! - Repository failures and trigger index failures are wrapped with a
//!   pipeline context via `.context()`
//! - Validation failures surface as their own variants so callers can show
//!   the offending node

use sensorflow_core::{RunId, WorkflowId};
use sensorflow_workflow::{ConfigError, GraphError, RunError, StructuralError};
use std::fmt;

/// Errors from workflow and run storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The backing store failed.
    Storage { reason: String },
    /// A run being finalized was never created.
    RunNotFound { run_id: RunId },
    /// A version refers to a workflow the store does not hold.
    WorkflowNotFound { workflow_id: WorkflowId },
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { reason } => write!(f, "repository failure: {reason}"),
            Self::RunNotFound { run_id } => write!(f, "run {run_id} not found"),
            Self::WorkflowNotFound { workflow_id } => write!(f, "workflow {workflow_id} not found"),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Errors from publishing a version or handling telemetry.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The version's stored graph could not be decoded.
    MalformedGraph(GraphError),
    /// The graph is not a valid DAG.
    Structure(StructuralError),
    /// A node configuration is invalid.
    Config(ConfigError),
    /// Trigger compilation or matching failed.
    TriggerIndex,
    /// Workflow or run storage failed.
    Repository,
    /// A run could not be finalized.
    Run(RunError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedGraph(e) => write!(f, "cannot publish version: {e}"),
            Self::Structure(e) => write!(f, "invalid workflow graph: {e}"),
            Self::Config(e) => write!(f, "invalid node configuration: {e}"),
            Self::TriggerIndex => write!(f, "trigger index operation failed"),
            Self::Repository => write!(f, "repository operation failed"),
            Self::Run(e) => write!(f, "cannot finalize run: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<GraphError> for PipelineError {
    fn from(e: GraphError) -> Self {
        Self::MalformedGraph(e)
    }
}

impl From<StructuralError> for PipelineError {
    fn from(e: StructuralError) -> Self {
        Self::Structure(e)
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<RunError> for PipelineError {
    fn from(e: RunError) -> Self {
        Self::Run(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorflow_workflow::NodeId;

    #[test]
    fn structural_errors_keep_their_detail() {
        let err = PipelineError::from(StructuralError::CycleDetected {
            node_id: NodeId::from("a"),
        });
        assert!(err.to_string().starts_with("invalid workflow graph"));
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn repository_error_display() {
        let err = RepositoryError::RunNotFound {
            run_id: RunId::new(4).expect("positive"),
        };
        assert_eq!(err.to_string(), "run run_4 not found");
    }
}
