//! Run and step records.
//!
//! A run is one execution of a workflow version for one triggering event. It
//! starts `Running` and moves exactly once to `Completed` or `Failed`. Each
//! visited node appends one [`RunStep`]; steps are never updated.

use crate::error::RunError;
use crate::node::NodeId;
use chrono::{DateTime, Utc};
use sensorflow_core::{OrganizationId, RunId, WorkflowId, WorkflowVersionId};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// The overall state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Outcome of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    /// The node failed; the run will end `Failed` but siblings keep running.
    Failed,
    /// The node had nothing to do; traversal continues to its children.
    Skipped,
}

impl StepStatus {
    /// Returns the wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// One execution of a workflow version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub organization_id: OrganizationId,
    pub workflow_id: WorkflowId,
    pub workflow_version_id: WorkflowVersionId,
    /// What started the run, e.g. `telemetry`.
    pub trigger_type: String,
    pub trigger_payload: JsonValue,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_summary: Option<JsonValue>,
}

impl Run {
    /// Creates a run in the `Running` state.
    #[must_use]
    pub fn start(
        id: RunId,
        organization_id: OrganizationId,
        workflow_id: WorkflowId,
        workflow_version_id: WorkflowVersionId,
        trigger_type: impl Into<String>,
        trigger_payload: JsonValue,
    ) -> Self {
        Self {
            id,
            organization_id,
            workflow_id,
            workflow_version_id,
            trigger_type: trigger_type.into(),
            trigger_payload,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error_summary: None,
        }
    }

    /// Moves the run to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::InvalidStateTransition`] if the run is already
    /// finished or `status` is `Running`.
    pub fn finish(
        &mut self,
        status: RunStatus,
        error_summary: Option<JsonValue>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), RunError> {
        if self.status != RunStatus::Running || !status.is_terminal() {
            return Err(RunError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }
        self.status = status;
        self.error_summary = error_summary;
        self.finished_at = Some(finished_at);
        Ok(())
    }
}

/// Audit record of one visited node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStep {
    pub run_id: RunId,
    /// Position within the run, starting at 1.
    pub sequence: u32,
    pub step_correlation_id: String,
    pub node_id: NodeId,
    pub node_type: String,
    pub status: StepStatus,
    pub input_snapshot: JsonValue,
    pub output_snapshot: JsonValue,
    #[serde(default)]
    pub error: Option<JsonValue>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl RunStep {
    /// Returns `error.reason`, if any.
    #[must_use]
    pub fn error_reason(&self) -> Option<&str> {
        self.error
            .as_ref()
            .and_then(|error| error.get("reason"))
            .and_then(JsonValue::as_str)
    }

    /// Returns the compact summary of this step.
    #[must_use]
    pub fn summary(&self) -> StepSummary {
        StepSummary {
            node_id: self.node_id.clone(),
            node_type: self.node_type.clone(),
            status: self.status,
            step_correlation_id: self.step_correlation_id.clone(),
        }
    }
}

/// Identifying fields of a step, for logs and results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    pub node_id: NodeId,
    pub node_type: String,
    pub status: StepStatus,
    pub step_correlation_id: String,
}

/// The result of executing one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// `Completed` or `Failed`.
    pub status: RunStatus,
    /// Steps in the order they were recorded.
    pub steps: Vec<RunStep>,
    /// `{reason}` when no trigger matched or any step failed.
    pub error: Option<JsonValue>,
}

impl ExecutionResult {
    pub(crate) fn no_matching_triggers() -> Self {
        Self {
            status: RunStatus::Completed,
            steps: Vec::new(),
            error: Some(json!({ "reason": "no_matching_trigger_nodes" })),
        }
    }

    pub(crate) fn from_steps(steps: Vec<RunStep>) -> Self {
        let failed = steps.iter().any(|step| step.status == StepStatus::Failed);
        Self {
            status: if failed {
                RunStatus::Failed
            } else {
                RunStatus::Completed
            },
            steps,
            error: failed.then(|| json!({ "reason": "node_execution_failed" })),
        }
    }

    /// Returns the step summaries in order.
    #[must_use]
    pub fn summaries(&self) -> Vec<StepSummary> {
        self.steps.iter().map(RunStep::summary).collect()
    }

    /// Returns `error.reason`, if any.
    #[must_use]
    pub fn error_reason(&self) -> Option<&str> {
        self.error
            .as_ref()
            .and_then(|error| error.get("reason"))
            .and_then(JsonValue::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> Run {
        Run::start(
            RunId::new(1).expect("positive"),
            OrganizationId::new(1).expect("positive"),
            WorkflowId::new(2).expect("positive"),
            WorkflowVersionId::new(3).expect("positive"),
            "telemetry",
            json!({}),
        )
    }

    fn step(status: StepStatus) -> RunStep {
        RunStep {
            run_id: RunId::new(1).expect("positive"),
            sequence: 1,
            step_correlation_id: "run:1:a".to_string(),
            node_id: NodeId::from("a"),
            node_type: "command".to_string(),
            status,
            input_snapshot: json!({}),
            output_snapshot: json!({}),
            error: (status == StepStatus::Failed)
                .then(|| json!({"reason": "command_dispatch_failed"})),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 1,
        }
    }

    #[test]
    fn run_finishes_once() {
        let mut run = run();
        run.finish(RunStatus::Completed, None, Utc::now())
            .expect("first finish");
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());

        let err = run
            .finish(RunStatus::Failed, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, RunError::InvalidStateTransition { .. }));
    }

    #[test]
    fn run_cannot_finish_as_running() {
        let mut run = run();
        assert!(run.finish(RunStatus::Running, None, Utc::now()).is_err());
        assert_eq!(run.status, RunStatus::Running);
    }

    #[test]
    fn any_failed_step_fails_the_result() {
        let result = ExecutionResult::from_steps(vec![
            step(StepStatus::Completed),
            step(StepStatus::Failed),
            step(StepStatus::Skipped),
        ]);
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.error_reason(), Some("node_execution_failed"));
        assert_eq!(result.steps[1].error_reason(), Some("command_dispatch_failed"));
    }

    #[test]
    fn skipped_steps_do_not_fail_the_result() {
        let result =
            ExecutionResult::from_steps(vec![step(StepStatus::Completed), step(StepStatus::Skipped)]);
        assert_eq!(result.status, RunStatus::Completed);
        assert!(result.error.is_none());
    }

    #[test]
    fn no_match_is_a_completion() {
        let result = ExecutionResult::no_matching_triggers();
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.error_reason(), Some("no_matching_trigger_nodes"));
    }
}
