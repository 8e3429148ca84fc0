//! Workflow engine for sensorflow automations.
//!
//! This crate provides:
//!
//! - **Graph Model**: nodes, edges and the typed per-node configuration
//! - **Validation**: DAG structure checks and catalog-backed node config checks
//! - **Conditions**: JSON-logic evaluation, boolean coercion and guided conditions
//! - **Runs**: the run/step model and the executor that walks a graph for one
//!   telemetry record
//! - **Collaborators**: query and alert seams with in-memory implementations

pub mod alert;
pub mod context;
pub mod definition;
pub mod edge;
pub mod error;
pub mod executor;
pub mod graph;
pub mod logic;
pub mod node;
pub mod query;
pub mod run;
pub mod validate;

#[cfg(test)]
mod fixtures;

pub use alert::{
    AlertDispatcher, AlertMessage, Cooldown, CooldownStore, CooldownUnit, InMemoryCooldownStore,
    RecordingAlertDispatcher,
};
pub use context::ExecutionContext;
pub use definition::{Workflow, WorkflowVersion};
pub use edge::Edge;
pub use error::{ConfigError, ExecutionError, GraphError, RunError, StructuralError};
pub use executor::RunExecutor;
pub use graph::{GraphIndex, WorkflowGraph};
pub use logic::{ExpressionEvaluator, JsonLogic};
pub use node::{Node, NodeConfig, NodeId, NodeKind};
pub use query::{QueryError, QueryExecutor};
pub use run::{ExecutionResult, Run, RunStatus, RunStep, StepStatus, StepSummary};
pub use validate::{GraphStructureValidator, NodeConfigValidator};
