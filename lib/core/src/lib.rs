//! Core domain types and utilities for the sensorflow automation engine.
//!
//! This crate provides the foundational types, error handling, and shared
//! utilities used by the device, workflow, trigger-index and automation crates.

pub mod error;
pub mod id;
pub mod path;

pub use error::Result;
pub use id::{
    CommandLogId, CorrelationId, DeviceId, DeviceTypeId, OrganizationId, ParameterDefinitionId,
    RunId, SchemaVersionId, TelemetryRecordId, TopicId, UserId, WorkflowId, WorkflowVersionId,
};
