//! Publish and telemetry pipelines.

use crate::config::AutomationConfig;
use crate::error::PipelineError;
use crate::repository::{RunDraft, RunRepository, WorkflowRepository};
use chrono::Utc;
use rootcause::prelude::*;
use sensorflow_core::Result;
use sensorflow_core::{CorrelationId, WorkflowVersionId};
use sensorflow_device::{
    CommandPayloadResolver, DeviceCatalog, DeviceCommandDispatcher, TelemetryRecord,
};
use sensorflow_trigger_index::{CompileResult, TriggerCompiler, TriggerIndexStore, TriggerMatcher};
use sensorflow_workflow::{
    AlertDispatcher, CooldownStore, GraphStructureValidator, NodeConfigValidator, QueryExecutor, Run,
    RunExecutor, RunStatus, RunStep, StepSummary, Workflow, WorkflowVersion,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

/// `trigger_type` of runs started by telemetry.
pub const TELEMETRY_TRIGGER: &str = "telemetry";

/// External systems the pipelines read from and write to.
pub struct Collaborators {
    pub catalog: Arc<dyn DeviceCatalog>,
    pub payload_resolver: Arc<dyn CommandPayloadResolver>,
    pub dispatcher: Arc<dyn DeviceCommandDispatcher>,
    pub trigger_index: Arc<dyn TriggerIndexStore>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub runs: Arc<dyn RunRepository>,
}

/// What publishing a version did to the trigger index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub workflow_version_id: WorkflowVersionId,
    pub compile: CompileResult,
}

/// A finished run and its step trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub run: Run,
    pub steps: Vec<StepSummary>,
}

/// Runs workflow publishing and telemetry handling end to end.
pub struct AutomationPipeline {
    config: AutomationConfig,
    workflows: Arc<dyn WorkflowRepository>,
    runs: Arc<dyn RunRepository>,
    trigger_index: Arc<dyn TriggerIndexStore>,
    validator: NodeConfigValidator,
    compiler: TriggerCompiler,
    matcher: TriggerMatcher,
    executor: RunExecutor,
}

impl AutomationPipeline {
    #[must_use]
    pub fn new(config: AutomationConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            catalog,
            payload_resolver,
            dispatcher,
            trigger_index,
            workflows,
            runs,
        } = collaborators;

        let executor = RunExecutor::new(catalog.clone(), dispatcher)
            .with_max_depth(config.max_traversal_depth)
            .with_default_cooldown(config.alert.default_cooldown());

        Self {
            validator: NodeConfigValidator::new(catalog.clone(), payload_resolver),
            compiler: TriggerCompiler::new(catalog.clone(), trigger_index.clone()),
            matcher: TriggerMatcher::new(catalog, trigger_index.clone()),
            trigger_index,
            executor,
            workflows,
            runs,
            config,
        }
    }

    /// Validates and executes query nodes with `executor`.
    #[must_use]
    pub fn with_query_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.validator = self.validator.with_query_executor(executor.clone());
        self.executor = self.executor.with_query_executor(executor);
        self
    }

    /// Sends alert node messages through `dispatcher`.
    #[must_use]
    pub fn with_alerts(mut self, dispatcher: Arc<dyn AlertDispatcher>, cooldowns: Arc<dyn CooldownStore>) -> Self {
        self.executor = self.executor.with_alerts(dispatcher, cooldowns);
        self
    }

    #[must_use]
    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Validates `version`, stores it as the workflow's live version and
    /// rebuilds its trigger index rows. Rows of the version it replaces are
    /// removed once the new rows are in place.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Structure`] or [`PipelineError::Config`] when
    /// the graph is invalid; nothing is stored or compiled in that case.
    /// Storage and trigger index failures are wrapped with their own context.
    #[instrument(
        skip(self, workflow, version),
        fields(workflow_id = %workflow.id, workflow_version_id = %version.id)
    )]
    pub async fn publish_version(
        &self,
        workflow: &Workflow,
        version: WorkflowVersion,
    ) -> Result<PublishOutcome, PipelineError> {
        let graph = version.parse_graph().map_err(PipelineError::from)?;
        GraphStructureValidator::validate(&graph).map_err(PipelineError::from)?;
        self.validator
            .validate(workflow, &graph)
            .await
            .map_err(PipelineError::from)?;

        let superseded = self
            .workflows
            .workflow(workflow.id)
            .await
            .context(PipelineError::Repository)?
            .and_then(|stored| stored.active_version_id)
            .filter(|previous| *previous != version.id);

        let mut live = workflow.clone();
        live.active_version_id = Some(version.id);
        self.workflows
            .save_workflow(live)
            .await
            .context(PipelineError::Repository)?;
        self.workflows
            .save_version(version.clone())
            .await
            .context(PipelineError::Repository)?;

        let compile = self
            .compiler
            .compile(workflow, &version, &graph)
            .await
            .context(PipelineError::TriggerIndex)?;

        if let Some(previous) = superseded {
            let retired = self
                .trigger_index
                .delete_version(previous)
                .await
                .context(PipelineError::TriggerIndex)?;
            tracing::info!(superseded_version_id = %previous, retired, "Retired superseded version triggers");
        }

        tracing::info!(
            node_count = graph.nodes.len(),
            rows_inserted = compile.inserted,
            rows_deleted = compile.deleted,
            "Published workflow version"
        );

        Ok(PublishOutcome {
            workflow_version_id: version.id,
            compile,
        })
    }

    /// Runs every workflow version the record triggers, in ascending version
    /// id order.
    ///
    /// Returns nothing when automation is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if matching or storage fails. Node failures and
    /// executor errors are recorded on the run instead.
    #[instrument(
        skip(self, record),
        fields(telemetry_record_id = %record.id, event_correlation_id)
    )]
    pub async fn handle_telemetry(&self, record: &TelemetryRecord) -> Result<Vec<RunOutcome>, PipelineError> {
        if !self.config.enabled {
            tracing::debug!("Automation disabled, ignoring telemetry");
            return Ok(Vec::new());
        }

        let event_correlation_id = CorrelationId::new();
        tracing::Span::current().record("event_correlation_id", tracing::field::display(&event_correlation_id));

        let versions = self
            .matcher
            .match_telemetry_triggers(record)
            .await
            .context(PipelineError::TriggerIndex)?;

        let mut outcomes = Vec::with_capacity(versions.len());
        for workflow_version_id in versions {
            if let Some(outcome) = self
                .run_version(workflow_version_id, record, &event_correlation_id)
                .await?
            {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    async fn run_version(
        &self,
        workflow_version_id: WorkflowVersionId,
        record: &TelemetryRecord,
        event_correlation_id: &CorrelationId,
    ) -> Result<Option<RunOutcome>, PipelineError> {
        let Some(version) = self
            .workflows
            .version(workflow_version_id)
            .await
            .context(PipelineError::Repository)?
        else {
            tracing::warn!(%workflow_version_id, "Matched workflow version no longer exists");
            return Ok(None);
        };
        let Some(workflow) = self
            .workflows
            .workflow(version.workflow_id)
            .await
            .context(PipelineError::Repository)?
        else {
            tracing::warn!(%workflow_version_id, "Matched workflow no longer exists");
            return Ok(None);
        };
        if workflow.active_version_id != Some(workflow_version_id) {
            tracing::info!(
                %workflow_version_id,
                active_version_id = ?workflow.active_version_id,
                "Matched workflow version is not active"
            );
            return Ok(None);
        }

        let run_correlation_id = CorrelationId::new();
        let mut run = self
            .runs
            .create_run(RunDraft {
                organization_id: workflow.organization_id,
                workflow_id: workflow.id,
                workflow_version_id,
                trigger_type: TELEMETRY_TRIGGER.to_string(),
                trigger_payload: json!({
                    "telemetry_record_id": record.id,
                    "device_id": record.device_id,
                    "schema_version_topic_id": record.schema_version_topic_id,
                    "event_correlation_id": event_correlation_id.to_string(),
                    "run_correlation_id": run_correlation_id.to_string(),
                }),
            })
            .await
            .context(PipelineError::Repository)?;

        let (status, error, steps) = match self
            .executor
            .execute_telemetry_run(&run, &version, record, &run_correlation_id)
            .await
        {
            Ok(result) => (result.status, result.error, result.steps),
            Err(e) => {
                tracing::error!(
                    run_id = %run.id,
                    %run_correlation_id,
                    error = %e,
                    "Workflow execution raised"
                );
                (
                    RunStatus::Failed,
                    Some(json!({
                        "reason": "workflow_execution_exception",
                        "message": e.to_string(),
                        "event_correlation_id": event_correlation_id.to_string(),
                        "run_correlation_id": run_correlation_id.to_string(),
                    })),
                    Vec::new(),
                )
            }
        };

        run.finish(status, error, Utc::now()).map_err(PipelineError::from)?;
        self.runs
            .finish_run(&run, &steps)
            .await
            .context(PipelineError::Repository)?;

        tracing::info!(
            run_id = %run.id,
            %workflow_version_id,
            %run_correlation_id,
            status = run.status.as_str(),
            step_count = steps.len(),
            "Workflow run finished"
        );

        Ok(Some(RunOutcome {
            run,
            steps: steps.iter().map(RunStep::summary).collect(),
        }))
    }
}
