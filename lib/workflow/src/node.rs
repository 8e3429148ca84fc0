//! Workflow node types and configurations.
//!
//! Nodes arrive in the editor's graph encoding: an `id`, a `type` string and a
//! free-form `data` object whose `config` key holds the type-specific
//! settings. The encoding is decoded leniently so that stale or half-edited
//! graphs still load; [`Node::config`] projects the raw settings into the
//! typed [`NodeConfig`] sum type that validators and the executor match on.

use sensorflow_core::path;
use sensorflow_core::{DeviceId, ParameterDefinitionId, TopicId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::fmt;

/// Identifier of a node within one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the node had no usable id.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the id with every character outside `[A-Za-z0-9_-]` replaced
    /// by `_`, or `node` when the id is empty.
    #[must_use]
    pub fn sanitized(&self) -> String {
        if self.0.is_empty() {
            return "node".to_string();
        }
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Decodes a string field, treating any non-string value as empty.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_node_id<'de, D>(deserializer: D) -> Result<NodeId, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer).map(NodeId)
}

/// The type of a workflow node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    TelemetryTrigger,
    ScheduleTrigger,
    Condition,
    Command,
    Query,
    Alert,
    /// A type this engine does not know.
    Other(String),
}

impl NodeKind {
    /// Parses a node type string; blank types yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let kind = match value.trim() {
            "" => return None,
            "telemetry-trigger" => Self::TelemetryTrigger,
            "schedule-trigger" => Self::ScheduleTrigger,
            "condition" => Self::Condition,
            "command" => Self::Command,
            "query" => Self::Query,
            "alert" => Self::Alert,
            other => Self::Other(other.to_string()),
        };
        Some(kind)
    }

    /// Returns the wire name of the type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TelemetryTrigger => "telemetry-trigger",
            Self::ScheduleTrigger => "schedule-trigger",
            Self::Condition => "condition",
            Self::Command => "command",
            Self::Query => "query",
            Self::Alert => "alert",
            Self::Other(other) => other,
        }
    }

    /// Returns true for node types that start a run.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        matches!(self, Self::TelemetryTrigger | Self::ScheduleTrigger)
    }
}

/// A node in the graph encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default, deserialize_with = "lenient_node_id")]
    pub id: NodeId,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub data: JsonValue,
    /// Editor metadata (position, selection state) carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Node {
    /// Creates a node with the given type and `data.config`.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, node_type: &str, config: JsonValue) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.to_string(),
            data: json!({ "config": config }),
            extra: Map::new(),
        }
    }

    /// Returns the parsed node type, or `None` for a blank type.
    #[must_use]
    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::parse(&self.node_type)
    }

    /// Returns true if this is a telemetry or schedule trigger.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.kind().is_some_and(|kind| kind.is_trigger())
    }

    /// Returns `data.config` when it is an object.
    #[must_use]
    pub fn config_object(&self) -> Option<&Map<String, JsonValue>> {
        self.data.get("config").and_then(JsonValue::as_object)
    }

    /// Projects `data.config` into the typed configuration for this node's type.
    ///
    /// Returns `None` when the type is blank or the node carries no config object.
    #[must_use]
    pub fn config(&self) -> Option<NodeConfig> {
        let kind = self.kind()?;
        let config = self.config_object()?;
        Some(NodeConfig::parse(&kind, config))
    }
}

/// Typed node configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    TelemetryTrigger(TelemetryTriggerConfig),
    ScheduleTrigger(Map<String, JsonValue>),
    Condition(ConditionConfig),
    Command(CommandConfig),
    /// Settings are interpreted by the query collaborator.
    Query(Map<String, JsonValue>),
    /// Settings are interpreted by [`crate::alert`].
    Alert(Map<String, JsonValue>),
    Unsupported,
}

impl NodeConfig {
    /// Parses a config object for the given node type.
    #[must_use]
    pub fn parse(kind: &NodeKind, config: &Map<String, JsonValue>) -> Self {
        match kind {
            NodeKind::TelemetryTrigger => Self::TelemetryTrigger(TelemetryTriggerConfig::parse(config)),
            NodeKind::ScheduleTrigger => Self::ScheduleTrigger(config.clone()),
            NodeKind::Condition => Self::Condition(ConditionConfig::parse(config)),
            NodeKind::Command => Self::Command(CommandConfig::parse(config)),
            NodeKind::Query => Self::Query(config.clone()),
            NodeKind::Alert => Self::Alert(config.clone()),
            NodeKind::Other(_) => Self::Unsupported,
        }
    }
}

fn string_field(config: &Map<String, JsonValue>, key: &str) -> Option<String> {
    config.get(key).and_then(JsonValue::as_str).map(str::to_string)
}

/// Device, topic and parameter a telemetry trigger listens to.
///
/// Each id is `None` when absent or not a positive integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceRef {
    pub device_id: Option<DeviceId>,
    pub topic_id: Option<TopicId>,
    pub parameter_definition_id: Option<ParameterDefinitionId>,
}

impl SourceRef {
    fn parse(source: &Map<String, JsonValue>) -> Self {
        Self {
            device_id: path::positive_int(source.get("device_id")).and_then(DeviceId::new),
            topic_id: path::positive_int(source.get("topic_id")).and_then(TopicId::new),
            parameter_definition_id: path::positive_int(source.get("parameter_definition_id"))
                .and_then(ParameterDefinitionId::new),
        }
    }

    /// Returns all three ids when every one is present.
    #[must_use]
    pub fn complete(&self) -> Option<(DeviceId, TopicId, ParameterDefinitionId)> {
        Some((self.device_id?, self.topic_id?, self.parameter_definition_id?))
    }
}

/// Configuration of a `telemetry-trigger` node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryTriggerConfig {
    pub mode: Option<String>,
    pub source: Option<SourceRef>,
}

impl TelemetryTriggerConfig {
    fn parse(config: &Map<String, JsonValue>) -> Self {
        Self {
            mode: string_field(config, "mode"),
            source: config
                .get("source")
                .and_then(JsonValue::as_object)
                .map(SourceRef::parse),
        }
    }
}

/// Left operands a guided condition may compare.
pub const GUIDED_LEFT_OPERANDS: [&str; 2] = ["trigger.value", "query.value"];

/// Operators a guided condition may use.
pub const GUIDED_OPERATORS: [&str; 6] = [">", ">=", "<", "<=", "==", "!="];

/// Why guided settings could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuidedError {
    InvalidLeftOperand,
    InvalidOperator,
    NonNumericThreshold,
}

impl fmt::Display for GuidedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLeftOperand => {
                write!(f, "guided left operand must be trigger.value or query.value")
            }
            Self::InvalidOperator => write!(f, "guided operator is invalid"),
            Self::NonNumericThreshold => write!(f, "guided threshold must be numeric"),
        }
    }
}

/// The simplified `left operator right` condition form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuidedCondition {
    pub left: Option<String>,
    pub operator: Option<String>,
    pub right: Option<JsonValue>,
}

impl GuidedCondition {
    fn parse(guided: &Map<String, JsonValue>) -> Self {
        Self {
            left: string_field(guided, "left"),
            operator: string_field(guided, "operator"),
            right: guided.get("right").cloned(),
        }
    }

    /// Compiles to the equivalent expression `{op: [{"var": left}, right]}`.
    ///
    /// # Errors
    ///
    /// Returns the first invalid part.
    pub fn compile(&self) -> Result<JsonValue, GuidedError> {
        let left = self
            .left
            .as_deref()
            .filter(|left| GUIDED_LEFT_OPERANDS.contains(left))
            .ok_or(GuidedError::InvalidLeftOperand)?;
        let operator = self
            .operator
            .as_deref()
            .filter(|operator| GUIDED_OPERATORS.contains(operator))
            .ok_or(GuidedError::InvalidOperator)?;
        let right = self
            .right
            .as_ref()
            .and_then(path::as_number)
            .ok_or(GuidedError::NonNumericThreshold)?;

        let mut expression = Map::new();
        expression.insert(operator.to_string(), json!([{ "var": left }, right]));
        Ok(JsonValue::Object(expression))
    }
}

/// Configuration of a `condition` node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionConfig {
    pub mode: Option<String>,
    pub guided: Option<GuidedCondition>,
    pub json_logic: Option<JsonValue>,
}

impl ConditionConfig {
    fn parse(config: &Map<String, JsonValue>) -> Self {
        Self {
            mode: string_field(config, "mode"),
            guided: config
                .get("guided")
                .and_then(JsonValue::as_object)
                .map(GuidedCondition::parse),
            json_logic: config.get("json_logic").cloned(),
        }
    }

    /// Returns true when the node is in guided mode.
    #[must_use]
    pub fn is_guided(&self) -> bool {
        self.mode.as_deref() == Some("guided")
    }

    /// Returns the expression to evaluate at run time.
    ///
    /// Guided settings win when they compile; otherwise the stored
    /// `json_logic` is used if it is a non-empty object.
    #[must_use]
    pub fn expression(&self) -> Option<JsonValue> {
        if self.is_guided() {
            if let Some(compiled) = self.guided.as_ref().and_then(|g| g.compile().ok()) {
                return Some(compiled);
            }
        }
        self.json_logic
            .as_ref()
            .filter(|logic| logic.as_object().is_some_and(|map| !map.is_empty()))
            .cloned()
    }
}

/// Device and topic a command node writes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetRef {
    pub device_id: Option<DeviceId>,
    pub topic_id: Option<TopicId>,
}

impl TargetRef {
    /// Returns both ids when both are present.
    #[must_use]
    pub fn complete(&self) -> Option<(DeviceId, TopicId)> {
        Some((self.device_id?, self.topic_id?))
    }
}

/// Configuration of a `command` node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandConfig {
    pub payload_mode: Option<String>,
    pub target: Option<TargetRef>,
    pub payload: Option<Map<String, JsonValue>>,
}

impl CommandConfig {
    fn parse(config: &Map<String, JsonValue>) -> Self {
        Self {
            payload_mode: string_field(config, "payload_mode"),
            target: config
                .get("target")
                .and_then(JsonValue::as_object)
                .map(|target| TargetRef {
                    device_id: path::positive_int(target.get("device_id")).and_then(DeviceId::new),
                    topic_id: path::positive_int(target.get("topic_id")).and_then(TopicId::new),
                }),
            payload: config.get("payload").and_then(JsonValue::as_object).cloned(),
        }
    }
}
