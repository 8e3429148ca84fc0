//! Automation pipelines for sensorflow.
//!
//! Ties the workflow engine and the trigger index together:
//!
//! - **Publish**: structure validation, node configuration validation, then
//!   trigger compilation
//! - **Telemetry**: trigger matching, run creation, execution and run
//!   finalization for every matched workflow version
//!
//! Configuration is loaded from `SENSORFLOW_*` environment variables.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod repository;

pub use config::{AlertConfig, AutomationConfig};
pub use error::{PipelineError, RepositoryError};
pub use pipeline::{AutomationPipeline, Collaborators, PublishOutcome, RunOutcome};
pub use repository::{
    InMemoryRunRepository, InMemoryWorkflowRepository, RunDraft, RunRepository, WorkflowRepository,
};
