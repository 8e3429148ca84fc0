//! Error types for the workflow crate.
//!
//! Errors are split by the stage that raises them:
//! - `GraphError`: the graph encoding could not be decoded at all
//! - `StructuralError`: the decoded graph is not a well-formed DAG
//! - `ConfigError`: a node's configuration is invalid for its type
//! - `ExecutionError`: a run could not be executed at all (node-level
//!   failures are recorded as steps, never raised)
//! - `RunError`: an invalid run state transition

use crate::node::NodeId;
use sensorflow_device::CatalogError;
use std::fmt;

/// Errors decoding a graph encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The document is not a graph mapping.
    Malformed { reason: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed workflow graph: {reason}"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Violations of the DAG invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    /// A node has an empty id, or two nodes share an id.
    DuplicateOrMissingNodeId {
        /// Position of the offending node in the node list.
        index: usize,
        node_id: NodeId,
    },
    /// The graph has no nodes.
    EmptyGraph,
    /// No node is a telemetry or schedule trigger.
    NoTriggerNode,
    /// An edge references a node id that does not exist.
    DanglingEdge {
        edge_id: String,
        source: String,
        target: String,
    },
    /// Following edges from `node_id` leads back to it.
    CycleDetected { node_id: NodeId },
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateOrMissingNodeId { index, node_id } => {
                if node_id.is_empty() {
                    write!(f, "node at position {index} has no id")
                } else {
                    write!(f, "node id '{node_id}' is used more than once")
                }
            }
            Self::EmptyGraph => write!(f, "workflow graph has no nodes"),
            Self::NoTriggerNode => write!(f, "workflow graph has no trigger node"),
            Self::DanglingEdge {
                edge_id,
                source,
                target,
            } => write!(
                f,
                "edge '{edge_id}' references unknown nodes ({source} -> {target})"
            ),
            Self::CycleDetected { node_id } => {
                write!(f, "workflow graph contains a cycle through node '{node_id}'")
            }
        }
    }
}

impl std::error::Error for StructuralError {}

/// Node configuration errors. All but `CatalogUnavailable` name the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNodeType { node_id: NodeId, reason: String },
    InvalidTriggerSource { node_id: NodeId, reason: String },
    InvalidConditionExpression { node_id: NodeId, reason: String },
    InvalidCommandTarget { node_id: NodeId, reason: String },
    InvalidCommandPayload {
        node_id: NodeId,
        reason: String,
        /// Parameter keys that failed validation, if any.
        parameter_keys: Vec<String>,
    },
    InvalidAlertConfig { node_id: NodeId, reason: String },
    InvalidQueryConfig { node_id: NodeId, reason: String },
    /// The device catalog could not answer; the graph itself may be fine.
    CatalogUnavailable { reason: String },
}

impl ConfigError {
    /// Returns the offending node, if the error is node-scoped.
    #[must_use]
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::InvalidNodeType { node_id, .. }
            | Self::InvalidTriggerSource { node_id, .. }
            | Self::InvalidConditionExpression { node_id, .. }
            | Self::InvalidCommandTarget { node_id, .. }
            | Self::InvalidCommandPayload { node_id, .. }
            | Self::InvalidAlertConfig { node_id, .. }
            | Self::InvalidQueryConfig { node_id, .. } => Some(node_id),
            Self::CatalogUnavailable { .. } => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNodeType { node_id, reason } => {
                write!(f, "node [{node_id}] has an invalid type: {reason}")
            }
            Self::InvalidTriggerSource { node_id, reason } => {
                write!(f, "telemetry trigger node [{node_id}] {reason}")
            }
            Self::InvalidConditionExpression { node_id, reason } => {
                write!(f, "condition node [{node_id}] {reason}")
            }
            Self::InvalidCommandTarget { node_id, reason } => {
                write!(f, "command node [{node_id}] {reason}")
            }
            Self::InvalidCommandPayload {
                node_id,
                reason,
                parameter_keys,
            } => {
                if parameter_keys.is_empty() {
                    write!(f, "command node [{node_id}] {reason}")
                } else {
                    write!(
                        f,
                        "command node [{node_id}] {reason}: {}",
                        parameter_keys.join(", ")
                    )
                }
            }
            Self::InvalidAlertConfig { node_id, reason } => {
                write!(f, "alert node [{node_id}] {reason}")
            }
            Self::InvalidQueryConfig { node_id, reason } => {
                write!(f, "query node [{node_id}] {reason}")
            }
            Self::CatalogUnavailable { reason } => {
                write!(f, "device catalog unavailable during validation: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<CatalogError> for ConfigError {
    fn from(e: CatalogError) -> Self {
        Self::CatalogUnavailable {
            reason: e.to_string(),
        }
    }
}

/// A run that could not be executed at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The version's stored graph could not be decoded.
    MalformedGraph(GraphError),
    /// Trigger contexts could not be resolved because the catalog failed.
    Catalog(CatalogError),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedGraph(e) => write!(f, "cannot execute run: {e}"),
            Self::Catalog(e) => write!(f, "cannot resolve trigger contexts: {e}"),
        }
    }
}

impl std::error::Error for ExecutionError {}

impl From<GraphError> for ExecutionError {
    fn from(e: GraphError) -> Self {
        Self::MalformedGraph(e)
    }
}

impl From<CatalogError> for ExecutionError {
    fn from(e: CatalogError) -> Self {
        Self::Catalog(e)
    }
}

/// Errors from run state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The run cannot move between these states.
    InvalidStateTransition { from: String, to: String },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStateTransition { from, to } => {
                write!(f, "invalid run state transition from {from} to {to}")
            }
        }
    }
}

impl std::error::Error for RunError {}
