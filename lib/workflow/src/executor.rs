//! Run executor.
//!
//! A telemetry run walks the graph once per matched trigger node, depth
//! first and in pre-order, recording one [`RunStep`] per visited node.
//!
//! Node failures never abort the run. They are recorded on the step, stop
//! traversal below the failed node and turn the final status into
//! [`RunStatus::Failed`](crate::run::RunStatus::Failed), while sibling
//! branches keep executing.

use crate::alert::{self, AlertDispatcher, AlertMessage, Cooldown, CooldownStore};
use crate::context::ExecutionContext;
use crate::definition::WorkflowVersion;
use crate::error::ExecutionError;
use crate::graph::{GraphIndex, WorkflowGraph};
use crate::logic::{self, ExpressionEvaluator, JsonLogic};
use crate::node::{CommandConfig, ConditionConfig, Node, NodeConfig, NodeId, NodeKind};
use crate::query::QueryExecutor;
use crate::run::{ExecutionResult, Run, RunStep, StepStatus};
use chrono::{SecondsFormat, TimeDelta, Utc};
use sensorflow_core::{CorrelationId, path};
use sensorflow_device::resolution::{self, ResolutionFailure};
use sensorflow_device::{
    CatalogError, CommandStatus, DeviceCatalog, DeviceCommandDispatcher, TelemetryRecord,
};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Default bound on how deep below a trigger a branch may go.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Executes workflow versions against telemetry records.
pub struct RunExecutor {
    catalog: Arc<dyn DeviceCatalog>,
    dispatcher: Arc<dyn DeviceCommandDispatcher>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    query_executor: Option<Arc<dyn QueryExecutor>>,
    alerts: Option<(Arc<dyn AlertDispatcher>, Arc<dyn CooldownStore>)>,
    default_cooldown: Cooldown,
    max_depth: usize,
}

impl RunExecutor {
    /// Creates an executor that evaluates conditions with [`JsonLogic`].
    ///
    /// Query and alert nodes are skipped until their collaborators are set.
    #[must_use]
    pub fn new(catalog: Arc<dyn DeviceCatalog>, dispatcher: Arc<dyn DeviceCommandDispatcher>) -> Self {
        Self {
            catalog,
            dispatcher,
            evaluator: Arc::new(JsonLogic),
            query_executor: None,
            alerts: None,
            default_cooldown: Cooldown::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    #[must_use]
    pub fn with_query_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.query_executor = Some(executor);
        self
    }

    #[must_use]
    pub fn with_alerts(mut self, dispatcher: Arc<dyn AlertDispatcher>, cooldowns: Arc<dyn CooldownStore>) -> Self {
        self.alerts = Some((dispatcher, cooldowns));
        self
    }

    /// Sets the cooldown used by alert nodes that do not configure one.
    #[must_use]
    pub fn with_default_cooldown(mut self, cooldown: Cooldown) -> Self {
        self.default_cooldown = cooldown;
        self
    }

    /// Bounds branch depth; a node below the bound fails with
    /// `max_traversal_depth_exceeded` instead of running.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Executes `version` for one telemetry record.
    ///
    /// A record that matches no trigger node completes with
    /// `no_matching_trigger_nodes` and no steps.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] only when the run cannot start: the stored
    /// graph does not decode, or the catalog fails while resolving triggers.
    #[instrument(
        skip(self, run, version, record, correlation_id),
        fields(
            run_id = %run.id,
            workflow_version_id = %version.id,
            run_correlation_id = %correlation_id,
        )
    )]
    pub async fn execute_telemetry_run(
        &self,
        run: &Run,
        version: &WorkflowVersion,
        record: &TelemetryRecord,
        correlation_id: &CorrelationId,
    ) -> Result<ExecutionResult, ExecutionError> {
        let graph = version.parse_graph()?;
        let index = graph.index();
        let triggers = self.resolve_trigger_contexts(&graph, record).await?;

        tracing::info!(
            telemetry_record_id = %record.id,
            trigger_node_matches = triggers.len(),
            graph_node_count = graph.nodes.len(),
            graph_edge_count = graph.edges.len(),
            "Workflow execution started"
        );

        if triggers.is_empty() {
            tracing::warn!(
                telemetry_record_id = %record.id,
                "Workflow execution found no matching trigger nodes"
            );
            return Ok(ExecutionResult::no_matching_triggers());
        }

        let mut steps = StepRecorder::new(run, correlation_id);
        let trigger_input = json!({
            "telemetry_record_id": record.id,
            "device_id": record.device_id,
            "schema_version_topic_id": record.schema_version_topic_id,
        });

        for trigger in triggers {
            steps.record(
                trigger.node,
                StepStatus::Completed,
                trigger_input.clone(),
                trigger.output.clone(),
                None,
                Instant::now(),
            );

            let context = Arc::new(ExecutionContext::new(
                trigger.output,
                record.transformed_values.clone(),
            ));
            self.walk(run, &index, &trigger.node.id, context, &mut steps).await;
        }

        let result = ExecutionResult::from_steps(steps.finish());
        tracing::info!(
            status = result.status.as_str(),
            step_count = result.steps.len(),
            "Workflow execution finished"
        );
        Ok(result)
    }

    /// Finds trigger nodes listening to the record's device and topic, in
    /// node-list order.
    async fn resolve_trigger_contexts<'g>(
        &self,
        graph: &'g WorkflowGraph,
        record: &TelemetryRecord,
    ) -> Result<Vec<TriggerContext<'g>>, CatalogError> {
        let mut contexts = Vec::new();

        for node in graph.telemetry_triggers() {
            if node.id.is_empty() {
                continue;
            }
            let Some(NodeConfig::TelemetryTrigger(config)) = node.config() else {
                continue;
            };
            let Some((device_id, topic_id, parameter_definition_id)) =
                config.source.and_then(|source| source.complete())
            else {
                continue;
            };
            if device_id != record.device_id || topic_id != record.schema_version_topic_id {
                continue;
            }

            let Some(parameter) = self.catalog.parameter(parameter_definition_id).await? else {
                continue;
            };
            if parameter.topic_id != topic_id {
                continue;
            }

            let payload = &record.transformed_values;
            let value = parameter
                .extract_value(payload)
                .or_else(|| path::lookup_in(payload, &parameter.key))
                .cloned()
                .unwrap_or(JsonValue::Null);

            contexts.push(TriggerContext {
                node,
                output: json!({
                    "value": value,
                    "parameter_definition_id": parameter.id,
                    "parameter_key": parameter.key,
                    "device_id": record.device_id,
                    "schema_version_topic_id": record.schema_version_topic_id,
                    "recorded_at": record.recorded_at.to_rfc3339_opts(SecondsFormat::Secs, false),
                }),
            });
        }

        Ok(contexts)
    }

    /// Executes every node reachable from `root`, depth first, children in
    /// edge-list order.
    async fn walk(
        &self,
        run: &Run,
        index: &GraphIndex<'_>,
        root: &NodeId,
        context: Arc<ExecutionContext>,
        steps: &mut StepRecorder<'_>,
    ) {
        let mut stack: Vec<Frame> = Vec::new();
        push_children(&mut stack, index, root, &context, 1);

        while let Some(frame) = stack.pop() {
            let Some(node) = index.node(&frame.node_id) else {
                continue;
            };
            let Some(kind) = node.kind() else {
                continue;
            };

            let started = Instant::now();
            let input = json!({ "context": frame.context.to_json() });

            if frame.depth > self.max_depth {
                tracing::warn!(
                    node_id = %node.id,
                    depth = frame.depth,
                    max_depth = self.max_depth,
                    "Workflow branch exceeded traversal depth"
                );
                steps.record(
                    node,
                    StepStatus::Failed,
                    input,
                    json!({}),
                    Some(json!({ "reason": "max_traversal_depth_exceeded" })),
                    started,
                );
                continue;
            }

            let outcome = self.run_node(run, node, &kind, &frame.context).await;
            steps.record(node, outcome.status, input, outcome.output, outcome.error, started);

            if let Some(next) = outcome.next {
                push_children(&mut stack, index, &node.id, &next, frame.depth + 1);
            }
        }
    }

    async fn run_node(&self, run: &Run, node: &Node, kind: &NodeKind, context: &Arc<ExecutionContext>) -> NodeOutcome {
        match kind {
            NodeKind::Condition => {
                let config = match node.config() {
                    Some(NodeConfig::Condition(config)) => config,
                    _ => ConditionConfig::default(),
                };
                self.run_condition(node, &config, context)
            }
            NodeKind::Command => {
                let config = match node.config() {
                    Some(NodeConfig::Command(config)) => config,
                    _ => CommandConfig::default(),
                };
                self.run_command(run, node, &config, context).await
            }
            NodeKind::Query => match &self.query_executor {
                Some(executor) => self.run_query(run, node, executor.as_ref(), context).await,
                None => NodeOutcome::not_implemented(context),
            },
            NodeKind::Alert => match &self.alerts {
                Some((dispatcher, cooldowns)) => {
                    self.run_alert(run, node, dispatcher.as_ref(), cooldowns.as_ref(), context)
                        .await
                }
                None => NodeOutcome::not_implemented(context),
            },
            NodeKind::TelemetryTrigger | NodeKind::ScheduleTrigger | NodeKind::Other(_) => {
                NodeOutcome::not_implemented(context)
            }
        }
    }

    fn run_condition(&self, node: &Node, config: &ConditionConfig, context: &Arc<ExecutionContext>) -> NodeOutcome {
        let Some(expression) = config.expression() else {
            tracing::warn!(node_id = %node.id, "Condition node has no expression");
            return NodeOutcome::failed("condition_config_missing_json_logic");
        };

        let result = self.evaluator.evaluate(&expression, &context.evaluation_data());
        let passed = logic::coerce_bool(&result);

        tracing::info!(
            node_id = %node.id,
            passed,
            trigger_value = %context.trigger.get("value").unwrap_or(&JsonValue::Null),
            query_value = %context.query.get("value").unwrap_or(&JsonValue::Null),
            "Condition node evaluated"
        );

        NodeOutcome {
            status: StepStatus::Completed,
            output: json!({ "passed": passed, "evaluation_result": result }),
            error: None,
            next: passed.then(|| Arc::clone(context)),
        }
    }

    async fn run_command(
        &self,
        run: &Run,
        node: &Node,
        config: &CommandConfig,
        context: &Arc<ExecutionContext>,
    ) -> NodeOutcome {
        let target = config.target.and_then(|target| target.complete());
        let (Some((device_id, topic_id)), Some(payload)) = (target, &config.payload) else {
            tracing::warn!(node_id = %node.id, "Command node configuration is incomplete");
            return NodeOutcome::failed("command_config_incomplete");
        };

        let target = match resolution::resolve_command_target(
            self.catalog.as_ref(),
            run.organization_id,
            device_id,
            topic_id,
        )
        .await
        {
            Ok(target) => target,
            Err(ResolutionFailure::InvalidDevice { .. }) => {
                tracing::warn!(node_id = %node.id, target_device_id = %device_id, "Command target device is invalid");
                return NodeOutcome::failed("command_target_device_invalid");
            }
            Err(ResolutionFailure::InvalidTopic { .. } | ResolutionFailure::InvalidParameter { .. }) => {
                tracing::warn!(
                    node_id = %node.id,
                    target_device_id = %device_id,
                    target_topic_id = %topic_id,
                    "Command target topic is invalid"
                );
                return NodeOutcome::failed("command_target_topic_invalid");
            }
            Err(ResolutionFailure::Catalog(e)) => {
                return NodeOutcome::failed_with(
                    json!({}),
                    json!({ "reason": "catalog_lookup_failed", "message": e.to_string() }),
                );
            }
        };

        tracing::info!(
            node_id = %node.id,
            target_device_id = %target.device.id,
            target_topic_id = %target.topic.id,
            payload_keys = ?payload.keys().collect::<Vec<_>>(),
            "Dispatching device command"
        );

        let log = match self
            .dispatcher
            .dispatch(&target.device, &target.topic, payload, None)
            .await
        {
            Ok(log) => log,
            Err(e) => {
                return NodeOutcome::failed_with(
                    json!({}),
                    json!({ "reason": "command_dispatch_failed", "message": e.to_string() }),
                );
            }
        };

        if log.status == CommandStatus::Failed {
            return NodeOutcome::failed_with(
                json!({ "command_log_id": log.id, "command_status": log.status.as_str() }),
                json!({ "reason": "command_dispatch_failed", "message": log.error_message }),
            );
        }

        tracing::info!(
            node_id = %node.id,
            command_log_id = %log.id,
            command_status = log.status.as_str(),
            "Device command dispatched"
        );

        NodeOutcome::completed(
            json!({
                "command_log_id": log.id,
                "command_status": log.status.as_str(),
                "target_device_id": target.device.id,
                "target_topic_id": target.topic.id,
            }),
            Arc::clone(context),
        )
    }

    async fn run_query(
        &self,
        run: &Run,
        node: &Node,
        executor: &dyn QueryExecutor,
        context: &Arc<ExecutionContext>,
    ) -> NodeOutcome {
        let Some(config) = node.config_object() else {
            tracing::warn!(node_id = %node.id, "Query node has no configuration");
            return NodeOutcome::failed("query_config_missing");
        };

        match executor.execute(run, config, context).await {
            Ok(result) => {
                tracing::info!(
                    node_id = %node.id,
                    query_value = %result.get("value").unwrap_or(&JsonValue::Null),
                    "Query node executed"
                );
                let next = context.with_query_result(&node.id, result.clone());
                NodeOutcome::completed(result, Arc::new(next))
            }
            Err(e) => {
                tracing::warn!(node_id = %node.id, error = %e, "Query node failed");
                NodeOutcome::failed_with(
                    json!({}),
                    json!({ "reason": "query_execution_failed", "message": e.to_string() }),
                )
            }
        }
    }

    async fn run_alert(
        &self,
        run: &Run,
        node: &Node,
        dispatcher: &dyn AlertDispatcher,
        cooldowns: &dyn CooldownStore,
        context: &Arc<ExecutionContext>,
    ) -> NodeOutcome {
        let Some(config) = node.config_object().filter(|config| !config.is_empty()) else {
            return NodeOutcome::skipped("alert_config_missing", context);
        };
        if !alert::has_runtime_fields(config) {
            return NodeOutcome::skipped("alert_config_legacy_placeholder", context);
        }

        let channel = config.get("channel").and_then(JsonValue::as_str);
        let subject = config.get("subject").and_then(JsonValue::as_str);
        let body = config.get("body").and_then(JsonValue::as_str);
        let (Some(alert::EMAIL_CHANNEL), Some(subject), Some(body)) = (channel, subject, body) else {
            tracing::warn!(node_id = %node.id, channel = ?channel, "Alert node configuration is incomplete");
            return NodeOutcome::failed("alert_config_incomplete");
        };

        let recipients = match alert::resolve_recipients(config.get("recipients")) {
            Ok(recipients) if recipients.is_empty() => {
                return NodeOutcome::failed("alert_recipients_missing");
            }
            Ok(recipients) => recipients,
            Err(e) => {
                return NodeOutcome::failed_with(
                    json!({}),
                    json!({ "reason": "alert_recipients_invalid", "message": e.to_string() }),
                );
            }
        };

        let cooldown = Cooldown::parse(config.get("cooldown")).unwrap_or(self.default_cooldown);
        let template = alert::template_context(run, context, node.id.as_str(), &cooldown);
        let message = AlertMessage {
            channel: alert::EMAIL_CHANNEL.to_string(),
            recipients,
            subject: alert::interpolate(subject, &template).trim().to_string(),
            body: alert::interpolate(body, &template).trim().to_string(),
        };
        if message.subject.is_empty() || message.body.is_empty() {
            return NodeOutcome::failed("alert_rendered_content_empty");
        }

        let cooldown_key = alert::cooldown_key(run.workflow_version_id, node.id.as_str(), &context.trigger);
        if !cooldowns.acquire(&cooldown_key, cooldown.duration()).await {
            return NodeOutcome {
                status: StepStatus::Skipped,
                output: json!({
                    "reason": "alert_cooldown_active",
                    "cooldown_key": cooldown_key,
                    "cooldown": cooldown.to_json(),
                }),
                error: None,
                next: Some(Arc::clone(context)),
            };
        }

        let receipt = match dispatcher.dispatch(&message, &template).await {
            Ok(receipt) => receipt,
            Err(e) => {
                cooldowns.release(&cooldown_key).await;
                tracing::warn!(node_id = %node.id, error = %e, "Alert node failed to dispatch");
                return NodeOutcome::failed_with(
                    json!({}),
                    json!({ "reason": "alert_dispatch_failed", "message": e.to_string() }),
                );
            }
        };

        tracing::info!(
            node_id = %node.id,
            recipient_count = message.recipients.len(),
            channel = %message.channel,
            "Alert node dispatched"
        );

        NodeOutcome::completed(
            json!({
                "channel": message.channel,
                "subject": message.subject,
                "body": message.body,
                "recipients": message.recipients,
                "cooldown": cooldown.to_json(),
                "cooldown_key": cooldown_key,
                "dispatch": receipt,
            }),
            Arc::clone(context),
        )
    }
}

struct TriggerContext<'g> {
    node: &'g Node,
    output: JsonValue,
}

struct Frame {
    node_id: NodeId,
    context: Arc<ExecutionContext>,
    depth: usize,
}

/// Pushes children in reverse so they pop in edge-list order.
fn push_children(
    stack: &mut Vec<Frame>,
    index: &GraphIndex<'_>,
    parent: &NodeId,
    context: &Arc<ExecutionContext>,
    depth: usize,
) {
    stack.extend(index.children(parent).iter().rev().map(|child| Frame {
        node_id: child.clone(),
        context: Arc::clone(context),
        depth,
    }));
}

/// Result of running one node. `next` is the context handed to the node's
/// children, or `None` when traversal stops here.
struct NodeOutcome {
    status: StepStatus,
    output: JsonValue,
    error: Option<JsonValue>,
    next: Option<Arc<ExecutionContext>>,
}

impl NodeOutcome {
    fn completed(output: JsonValue, next: Arc<ExecutionContext>) -> Self {
        Self {
            status: StepStatus::Completed,
            output,
            error: None,
            next: Some(next),
        }
    }

    fn failed(reason: &str) -> Self {
        Self::failed_with(json!({}), json!({ "reason": reason }))
    }

    fn failed_with(output: JsonValue, error: JsonValue) -> Self {
        Self {
            status: StepStatus::Failed,
            output,
            error: Some(error),
            next: None,
        }
    }

    fn skipped(reason: &str, context: &Arc<ExecutionContext>) -> Self {
        Self {
            status: StepStatus::Skipped,
            output: json!({ "reason": reason }),
            error: None,
            next: Some(Arc::clone(context)),
        }
    }

    fn not_implemented(context: &Arc<ExecutionContext>) -> Self {
        Self::skipped("node_type_not_implemented", context)
    }
}

/// Numbers steps and derives their correlation ids.
struct StepRecorder<'r> {
    run: &'r Run,
    correlation_id: &'r CorrelationId,
    steps: Vec<RunStep>,
}

impl<'r> StepRecorder<'r> {
    fn new(run: &'r Run, correlation_id: &'r CorrelationId) -> Self {
        Self {
            run,
            correlation_id,
            steps: Vec::new(),
        }
    }

    fn record(
        &mut self,
        node: &Node,
        status: StepStatus,
        input: JsonValue,
        output: JsonValue,
        error: Option<JsonValue>,
        started: Instant,
    ) {
        let sequence = u32::try_from(self.steps.len() + 1).unwrap_or(u32::MAX);
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX).max(1);
        let finished_at = Utc::now();
        let step_correlation_id = format!("{}:{sequence}:{}", self.correlation_id, node.id.sanitized());

        let step = RunStep {
            run_id: self.run.id,
            sequence,
            step_correlation_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            status,
            input_snapshot: input,
            output_snapshot: output,
            error,
            started_at: TimeDelta::try_milliseconds(duration_ms).map_or(finished_at, |elapsed| finished_at - elapsed),
            finished_at,
            duration_ms,
        };

        tracing::info!(
            run_correlation_id = %self.correlation_id,
            step_correlation_id = %step.step_correlation_id,
            run_id = %self.run.id,
            workflow_version_id = %self.run.workflow_version_id,
            node_id = %step.node_id,
            node_type = %step.node_type,
            status = step.status.as_str(),
            duration_ms,
            error_reason = ?step.error_reason(),
            "Recorded workflow step"
        );

        self.steps.push(step);
    }

    fn finish(self) -> Vec<RunStep> {
        self.steps
    }
}
