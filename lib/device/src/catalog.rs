//! Read access to the device catalog.

use crate::error::CatalogError;
use crate::model::{Device, ParameterDefinition, SchemaVersionTopic};
use async_trait::async_trait;
use sensorflow_core::{DeviceId, ParameterDefinitionId, TopicId};

/// Lookup seam over the device registry and schema store.
///
/// Lookups are unscoped; organization and schema-version scoping is applied by
/// [`crate::resolution`] so every caller enforces the same chain.
#[async_trait]
pub trait DeviceCatalog: Send + Sync {
    /// Finds a device by id.
    async fn device(&self, id: DeviceId) -> Result<Option<Device>, CatalogError>;

    /// Finds a schema-version topic by id.
    async fn topic(&self, id: TopicId) -> Result<Option<SchemaVersionTopic>, CatalogError>;

    /// Finds a parameter definition by id.
    async fn parameter(
        &self,
        id: ParameterDefinitionId,
    ) -> Result<Option<ParameterDefinition>, CatalogError>;

    /// Lists the parameters declared on a topic, in declaration order.
    async fn topic_parameters(
        &self,
        topic_id: TopicId,
    ) -> Result<Vec<ParameterDefinition>, CatalogError>;
}
