//! Device catalog and device-facing collaborators for sensorflow.
//!
//! This crate provides:
//!
//! - **Catalog model**: devices, schema-version topics with their direction,
//!   and parameter definitions with value extraction and validation
//! - **Telemetry records**: normalized readings the automation engine reacts to
//! - **Resolution**: the org-scoped device → topic → parameter chain shared by
//!   validation, trigger compilation and execution
//! - **Commands**: dispatcher and payload resolver seams, plus in-memory
//!   implementations for tests and replay

pub mod catalog;
pub mod command;
pub mod error;
pub mod memory;
pub mod model;
pub mod resolution;
pub mod telemetry;

pub use catalog::DeviceCatalog;
pub use command::{
    CommandLog, CommandPayloadResolver, CommandStatus, DeviceCommandDispatcher,
    SchemaPayloadResolver,
};
pub use error::{CatalogError, DispatchError};
pub use memory::{CatalogSnapshot, InMemoryCatalog, RecordingDispatcher};
pub use model::{
    Device, ParameterDataType, ParameterDefinition, ParameterViolation, SchemaVersionTopic,
    TopicDirection, ValidationRules,
};
pub use resolution::{CommandTarget, ResolutionFailure, TriggerSource};
pub use telemetry::TelemetryRecord;
