//! Storage seams for workflows and runs.

use crate::error::RepositoryError;
use async_trait::async_trait;
use sensorflow_core::Result;
use sensorflow_core::{OrganizationId, RunId, WorkflowId, WorkflowVersionId};
use sensorflow_workflow::{Run, RunStep, Workflow, WorkflowVersion};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Workflows and their published versions.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Inserts or replaces a workflow.
    async fn save_workflow(&self, workflow: Workflow) -> Result<(), RepositoryError>;

    async fn workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, RepositoryError>;

    /// Inserts or replaces a version.
    async fn save_version(&self, version: WorkflowVersion) -> Result<(), RepositoryError>;

    async fn version(&self, id: WorkflowVersionId) -> Result<Option<WorkflowVersion>, RepositoryError>;
}

/// Everything needed to open a run except its id.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDraft {
    pub organization_id: OrganizationId,
    pub workflow_id: WorkflowId,
    pub workflow_version_id: WorkflowVersionId,
    pub trigger_type: String,
    pub trigger_payload: JsonValue,
}

/// Runs and their step trail.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Stores a new `running` run and returns it with its assigned id.
    async fn create_run(&self, draft: RunDraft) -> Result<Run, RepositoryError>;

    /// Stores the run's final state and appends its steps.
    async fn finish_run(&self, run: &Run, steps: &[RunStep]) -> Result<(), RepositoryError>;

    async fn run(&self, id: RunId) -> Result<Option<Run>, RepositoryError>;

    /// Returns the run's steps in recording order.
    async fn steps(&self, id: RunId) -> Result<Vec<RunStep>, RepositoryError>;
}

#[derive(Debug, Default)]
struct WorkflowTables {
    workflows: BTreeMap<WorkflowId, Workflow>,
    versions: BTreeMap<WorkflowVersionId, WorkflowVersion>,
}

/// Workflow repository held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    tables: Mutex<WorkflowTables>,
}

impl InMemoryWorkflowRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save_workflow(&self, workflow: Workflow) -> Result<(), RepositoryError> {
        self.tables.lock().await.workflows.insert(workflow.id, workflow);
        Ok(())
    }

    async fn workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.tables.lock().await.workflows.get(&id).cloned())
    }

    async fn save_version(&self, version: WorkflowVersion) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        if !tables.workflows.contains_key(&version.workflow_id) {
            return Err(RepositoryError::WorkflowNotFound {
                workflow_id: version.workflow_id,
            }
            .into());
        }
        tables.versions.insert(version.id, version);
        Ok(())
    }

    async fn version(&self, id: WorkflowVersionId) -> Result<Option<WorkflowVersion>, RepositoryError> {
        Ok(self.tables.lock().await.versions.get(&id).cloned())
    }
}

#[derive(Debug)]
struct RunTables {
    next_id: i64,
    runs: BTreeMap<RunId, Run>,
    steps: BTreeMap<RunId, Vec<RunStep>>,
}

impl Default for RunTables {
    fn default() -> Self {
        Self {
            next_id: 1,
            runs: BTreeMap::new(),
            steps: BTreeMap::new(),
        }
    }
}

/// Run repository held in process memory; ids are assigned sequentially.
#[derive(Debug, Default)]
pub struct InMemoryRunRepository {
    tables: Mutex<RunTables>,
}

impl InMemoryRunRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every run in id order.
    pub async fn runs(&self) -> Vec<Run> {
        self.tables.lock().await.runs.values().cloned().collect()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn create_run(&self, draft: RunDraft) -> Result<Run, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let id = RunId::new(tables.next_id).ok_or_else(|| RepositoryError::Storage {
            reason: format!("invalid run id {}", tables.next_id),
        })?;
        tables.next_id += 1;

        let run = Run::start(
            id,
            draft.organization_id,
            draft.workflow_id,
            draft.workflow_version_id,
            draft.trigger_type,
            draft.trigger_payload,
        );
        tables.runs.insert(id, run.clone());
        Ok(run)
    }

    async fn finish_run(&self, run: &Run, steps: &[RunStep]) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Some(stored) = tables.runs.get_mut(&run.id) else {
            return Err(RepositoryError::RunNotFound { run_id: run.id }.into());
        };
        *stored = run.clone();
        tables.steps.entry(run.id).or_default().extend_from_slice(steps);
        Ok(())
    }

    async fn run(&self, id: RunId) -> Result<Option<Run>, RepositoryError> {
        Ok(self.tables.lock().await.runs.get(&id).cloned())
    }

    async fn steps(&self, id: RunId) -> Result<Vec<RunStep>, RepositoryError> {
        Ok(self.tables.lock().await.steps.get(&id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorflow_workflow::{RunStatus, WorkflowGraph};
    use serde_json::json;

    fn draft() -> RunDraft {
        RunDraft {
            organization_id: OrganizationId::new(1).expect("positive"),
            workflow_id: WorkflowId::new(1).expect("positive"),
            workflow_version_id: WorkflowVersionId::new(1).expect("positive"),
            trigger_type: "telemetry".to_string(),
            trigger_payload: json!({"telemetry_record_id": 7}),
        }
    }

    #[tokio::test]
    async fn runs_get_sequential_ids() {
        let repo = InMemoryRunRepository::new();
        let first = repo.create_run(draft()).await.expect("create");
        let second = repo.create_run(draft()).await.expect("create");

        assert_eq!(first.id.get(), 1);
        assert_eq!(second.id.get(), 2);
        assert_eq!(first.status, RunStatus::Running);
        assert_eq!(first.trigger_payload["telemetry_record_id"], 7);
    }

    #[tokio::test]
    async fn finishing_an_unknown_run_fails() {
        let repo = InMemoryRunRepository::new();
        let other = InMemoryRunRepository::new();
        let run = other.create_run(draft()).await.expect("create");

        assert!(repo.finish_run(&run, &[]).await.is_err());
    }

    #[tokio::test]
    async fn finishing_stores_final_state() {
        let repo = InMemoryRunRepository::new();
        let mut run = repo.create_run(draft()).await.expect("create");
        run.finish(RunStatus::Completed, None, chrono::Utc::now()).expect("finish");

        repo.finish_run(&run, &[]).await.expect("finish");

        let stored = repo.run(run.id).await.expect("load").expect("present");
        assert_eq!(stored.status, RunStatus::Completed);
        assert!(stored.finished_at.is_some());
        assert!(repo.steps(run.id).await.expect("steps").is_empty());
    }

    #[tokio::test]
    async fn versions_require_their_workflow() {
        let repo = InMemoryWorkflowRepository::new();
        let version = WorkflowVersion::new(
            WorkflowVersionId::new(1).expect("positive"),
            WorkflowId::new(1).expect("positive"),
            1,
            &WorkflowGraph::new(Vec::new(), Vec::new()),
        )
        .expect("version");

        assert!(repo.save_version(version.clone()).await.is_err());

        repo.save_workflow(Workflow::new(
            WorkflowId::new(1).expect("positive"),
            OrganizationId::new(1).expect("positive"),
            "Voltage guard",
        ))
        .await
        .expect("save workflow");
        repo.save_version(version.clone()).await.expect("save version");

        assert_eq!(repo.version(version.id).await.expect("load"), Some(version));
    }
}
