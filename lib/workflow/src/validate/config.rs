//! Node configuration checks against the device catalog.

use crate::alert;
use crate::definition::Workflow;
use crate::error::ConfigError;
use crate::graph::WorkflowGraph;
use crate::node::{CommandConfig, ConditionConfig, Node, NodeConfig, NodeId, NodeKind, TelemetryTriggerConfig};
use crate::query::QueryExecutor;
use sensorflow_core::OrganizationId;
use sensorflow_device::resolution::{self, ResolutionFailure};
use sensorflow_device::{CommandPayloadResolver, DeviceCatalog};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// Validates every node's configuration for its type.
///
/// Trigger sources and command targets are resolved through the same
/// device → topic → parameter chain the compiler and executor use.
pub struct NodeConfigValidator {
    catalog: Arc<dyn DeviceCatalog>,
    payload_resolver: Arc<dyn CommandPayloadResolver>,
    query_executor: Option<Arc<dyn QueryExecutor>>,
}

impl NodeConfigValidator {
    /// Creates a validator; query nodes only need a configuration object.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn DeviceCatalog>,
        payload_resolver: Arc<dyn CommandPayloadResolver>,
    ) -> Self {
        Self {
            catalog,
            payload_resolver,
            query_executor: None,
        }
    }

    /// Delegates query node checks to `executor`.
    #[must_use]
    pub fn with_query_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.query_executor = Some(executor);
        self
    }

    /// Validates every node in node-list order.
    ///
    /// # Errors
    ///
    /// Returns the first invalid node, or [`ConfigError::CatalogUnavailable`]
    /// if the catalog cannot answer.
    pub async fn validate(&self, workflow: &Workflow, graph: &WorkflowGraph) -> Result<(), ConfigError> {
        for node in &graph.nodes {
            self.validate_node(workflow.organization_id, node).await?;
        }
        Ok(())
    }

    async fn validate_node(&self, organization_id: OrganizationId, node: &Node) -> Result<(), ConfigError> {
        let node_id = if node.id.is_empty() {
            NodeId::from("unknown-node")
        } else {
            node.id.clone()
        };

        let Some(kind) = node.kind() else {
            return Err(ConfigError::InvalidNodeType {
                node_id,
                reason: "type is blank".to_string(),
            });
        };

        match &kind {
            NodeKind::Other(other) => {
                return Err(ConfigError::InvalidNodeType {
                    node_id,
                    reason: format!("unknown type '{other}'"),
                });
            }
            NodeKind::ScheduleTrigger => return Ok(()),
            NodeKind::Alert => {
                return alert::validate_config(node.config_object())
                    .map_err(|reason| ConfigError::InvalidAlertConfig { node_id, reason });
            }
            _ => {}
        }

        let Some(config) = node.config() else {
            return Err(missing_config(&kind, node_id));
        };

        match config {
            NodeConfig::TelemetryTrigger(config) => {
                self.validate_trigger(organization_id, node_id, &config).await
            }
            NodeConfig::Condition(config) => validate_condition(node_id, &config),
            NodeConfig::Command(config) => {
                self.validate_command(organization_id, node_id, &config).await
            }
            NodeConfig::Query(config) => self.validate_query(organization_id, node_id, &config).await,
            NodeConfig::ScheduleTrigger(_) | NodeConfig::Alert(_) | NodeConfig::Unsupported => Ok(()),
        }
    }

    async fn validate_trigger(
        &self,
        organization_id: OrganizationId,
        node_id: NodeId,
        config: &TelemetryTriggerConfig,
    ) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidTriggerSource {
            node_id: node_id.clone(),
            reason: reason.to_string(),
        };

        if config.mode.as_deref() != Some("event") {
            return Err(invalid("must use event mode"));
        }
        let Some(source) = config.source else {
            return Err(invalid("must define a source"));
        };
        let Some((device_id, topic_id, parameter_definition_id)) = source.complete() else {
            return Err(invalid("is missing source device, topic, or parameter"));
        };

        resolution::resolve_trigger_source(
            self.catalog.as_ref(),
            organization_id,
            device_id,
            topic_id,
            parameter_definition_id,
        )
        .await
        .map(|_| ())
        .map_err(|failure| match failure {
            ResolutionFailure::InvalidDevice { .. } => invalid("references an invalid source device"),
            ResolutionFailure::InvalidTopic { .. } => invalid("references an invalid publish topic"),
            ResolutionFailure::InvalidParameter { .. } => {
                invalid("references an invalid telemetry parameter")
            }
            ResolutionFailure::Catalog(e) => ConfigError::from(e),
        })
    }

    async fn validate_command(
        &self,
        organization_id: OrganizationId,
        node_id: NodeId,
        config: &CommandConfig,
    ) -> Result<(), ConfigError> {
        let invalid_target = |reason: &str| ConfigError::InvalidCommandTarget {
            node_id: node_id.clone(),
            reason: reason.to_string(),
        };
        let invalid_payload = |reason: &str, parameter_keys: Vec<String>| {
            ConfigError::InvalidCommandPayload {
                node_id: node_id.clone(),
                reason: reason.to_string(),
                parameter_keys,
            }
        };

        if config.payload_mode.as_deref() != Some("schema_form") {
            return Err(invalid_payload("must use schema_form payload mode", Vec::new()));
        }
        let Some(target) = config.target else {
            return Err(invalid_target("must define a target"));
        };
        let Some((device_id, topic_id)) = target.complete() else {
            return Err(invalid_target("is missing target device or topic"));
        };
        let Some(payload) = &config.payload else {
            return Err(invalid_payload("must define a payload object", Vec::new()));
        };

        let target = resolution::resolve_command_target(
            self.catalog.as_ref(),
            organization_id,
            device_id,
            topic_id,
        )
        .await
        .map_err(|failure| match failure {
            ResolutionFailure::InvalidDevice { .. } => {
                invalid_target("references an invalid target device")
            }
            ResolutionFailure::InvalidTopic { .. } | ResolutionFailure::InvalidParameter { .. } => {
                invalid_target("references an invalid subscribe topic")
            }
            ResolutionFailure::Catalog(e) => ConfigError::from(e),
        })?;

        let errors = self
            .payload_resolver
            .validate_payload(&target.topic, payload)
            .await?;
        if !errors.is_empty() {
            return Err(invalid_payload(
                "has invalid payload values",
                errors.into_keys().collect(),
            ));
        }
        Ok(())
    }

    async fn validate_query(
        &self,
        organization_id: OrganizationId,
        node_id: NodeId,
        config: &Map<String, JsonValue>,
    ) -> Result<(), ConfigError> {
        let Some(executor) = &self.query_executor else {
            return Ok(());
        };
        executor
            .validate_config(organization_id, config)
            .await
            .map_err(|e| ConfigError::InvalidQueryConfig {
                node_id,
                reason: e.to_string(),
            })
    }
}

fn missing_config(kind: &NodeKind, node_id: NodeId) -> ConfigError {
    let reason = "requires a configuration".to_string();
    match kind {
        NodeKind::TelemetryTrigger => ConfigError::InvalidTriggerSource { node_id, reason },
        NodeKind::Condition => ConfigError::InvalidConditionExpression { node_id, reason },
        NodeKind::Command => ConfigError::InvalidCommandTarget { node_id, reason },
        NodeKind::Query => ConfigError::InvalidQueryConfig { node_id, reason },
        NodeKind::Alert => ConfigError::InvalidAlertConfig { node_id, reason },
        NodeKind::ScheduleTrigger | NodeKind::Other(_) => ConfigError::InvalidNodeType { node_id, reason },
    }
}

fn validate_condition(node_id: NodeId, config: &ConditionConfig) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidConditionExpression {
        node_id: node_id.clone(),
        reason,
    };

    match config.mode.as_deref() {
        Some("guided") => {
            let Some(guided) = &config.guided else {
                return Err(invalid("guided mode requires guided settings".to_string()));
            };
            guided.compile().map(|_| ()).map_err(|e| invalid(e.to_string()))
        }
        Some("json_logic") => {
            let single_root = config
                .json_logic
                .as_ref()
                .and_then(JsonValue::as_object)
                .is_some_and(|logic| logic.len() == 1);
            if single_root {
                Ok(())
            } else {
                Err(invalid("must define valid JSON logic".to_string()))
            }
        }
        _ => Err(invalid("has an invalid mode".to_string())),
    }
}
