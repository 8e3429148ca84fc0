//! The device → schema version → topic → parameter resolution chain.
//!
//! Publish-time validation, trigger compilation and run execution all resolve
//! node references through these functions, so a reference that is valid for
//! one of them is valid for all of them.

use crate::catalog::DeviceCatalog;
use crate::error::CatalogError;
use crate::model::{Device, ParameterDefinition, SchemaVersionTopic, TopicDirection};
use sensorflow_core::{DeviceId, OrganizationId, ParameterDefinitionId, SchemaVersionId, TopicId};
use std::fmt;

/// A fully resolved telemetry trigger source.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSource {
    pub device: Device,
    pub topic: SchemaVersionTopic,
    pub parameter: ParameterDefinition,
}

/// A fully resolved command target.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTarget {
    pub device: Device,
    pub topic: SchemaVersionTopic,
}

/// The first broken link found while resolving a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionFailure {
    /// Device is unknown, belongs to another organization, or has no schema version.
    InvalidDevice { device_id: DeviceId },
    /// Topic is unknown, belongs to another schema version, or has the wrong direction.
    InvalidTopic {
        topic_id: TopicId,
        expected: TopicDirection,
    },
    /// Parameter is unknown, belongs to another topic, or is inactive.
    InvalidParameter {
        parameter_definition_id: ParameterDefinitionId,
    },
    /// The catalog could not answer.
    Catalog(CatalogError),
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDevice { device_id } => write!(f, "invalid device {device_id}"),
            Self::InvalidTopic { topic_id, expected } => {
                write!(f, "invalid {} topic {topic_id}", expected.as_str())
            }
            Self::InvalidParameter {
                parameter_definition_id,
            } => write!(f, "invalid parameter {parameter_definition_id}"),
            Self::Catalog(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ResolutionFailure {}

impl From<CatalogError> for ResolutionFailure {
    fn from(e: CatalogError) -> Self {
        Self::Catalog(e)
    }
}

/// Resolves a device that belongs to `organization_id` and has a schema version.
///
/// # Errors
///
/// Returns [`ResolutionFailure::InvalidDevice`] for any broken link.
pub async fn resolve_device<C>(
    catalog: &C,
    organization_id: OrganizationId,
    device_id: DeviceId,
) -> Result<(Device, SchemaVersionId), ResolutionFailure>
where
    C: DeviceCatalog + ?Sized,
{
    let device = catalog
        .device(device_id)
        .await?
        .filter(|device| device.organization_id == organization_id)
        .ok_or(ResolutionFailure::InvalidDevice { device_id })?;

    let schema_version_id = device
        .schema_version_id
        .ok_or(ResolutionFailure::InvalidDevice { device_id })?;

    Ok((device, schema_version_id))
}

async fn resolve_topic<C>(
    catalog: &C,
    schema_version_id: SchemaVersionId,
    topic_id: TopicId,
    direction: TopicDirection,
) -> Result<SchemaVersionTopic, ResolutionFailure>
where
    C: DeviceCatalog + ?Sized,
{
    catalog
        .topic(topic_id)
        .await?
        .filter(|topic| topic.schema_version_id == schema_version_id)
        .filter(|topic| topic.direction == direction)
        .ok_or(ResolutionFailure::InvalidTopic {
            topic_id,
            expected: direction,
        })
}

/// Resolves a telemetry trigger source: an org-scoped device, a publish topic
/// of the device's schema version, and an active parameter on that topic.
///
/// # Errors
///
/// Returns the first broken link.
pub async fn resolve_trigger_source<C>(
    catalog: &C,
    organization_id: OrganizationId,
    device_id: DeviceId,
    topic_id: TopicId,
    parameter_definition_id: ParameterDefinitionId,
) -> Result<TriggerSource, ResolutionFailure>
where
    C: DeviceCatalog + ?Sized,
{
    let (device, schema_version_id) = resolve_device(catalog, organization_id, device_id).await?;
    let topic = resolve_topic(catalog, schema_version_id, topic_id, TopicDirection::Publish).await?;

    let parameter = catalog
        .parameter(parameter_definition_id)
        .await?
        .filter(|parameter| parameter.topic_id == topic.id && parameter.is_active)
        .ok_or(ResolutionFailure::InvalidParameter {
            parameter_definition_id,
        })?;

    Ok(TriggerSource {
        device,
        topic,
        parameter,
    })
}

/// Resolves a command target: an org-scoped device and a subscribe topic of
/// the device's schema version.
///
/// # Errors
///
/// Returns the first broken link.
pub async fn resolve_command_target<C>(
    catalog: &C,
    organization_id: OrganizationId,
    device_id: DeviceId,
    topic_id: TopicId,
) -> Result<CommandTarget, ResolutionFailure>
where
    C: DeviceCatalog + ?Sized,
{
    let (device, schema_version_id) = resolve_device(catalog, organization_id, device_id).await?;
    let topic =
        resolve_topic(catalog, schema_version_id, topic_id, TopicDirection::Subscribe).await?;

    Ok(CommandTarget { device, topic })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCatalog;
    use crate::memory::tests::{fixture_catalog, ids};

    #[tokio::test]
    async fn resolves_valid_trigger_source() {
        let catalog = fixture_catalog();
        let source = resolve_trigger_source(
            &catalog,
            ids::org(),
            ids::meter(),
            ids::telemetry_topic(),
            ids::voltage(),
        )
        .await
        .expect("valid source");
        assert_eq!(source.parameter.key, "V1");
    }

    #[tokio::test]
    async fn other_organization_device_is_invalid() {
        let catalog = fixture_catalog();
        let other_org = OrganizationId::new(99).expect("positive");
        let err = resolve_trigger_source(
            &catalog,
            other_org,
            ids::meter(),
            ids::telemetry_topic(),
            ids::voltage(),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            ResolutionFailure::InvalidDevice {
                device_id: ids::meter()
            }
        );
    }

    #[tokio::test]
    async fn subscribe_topic_is_not_a_trigger_source() {
        let catalog = fixture_catalog();
        let err = resolve_trigger_source(
            &catalog,
            ids::org(),
            ids::strip(),
            ids::control_topic(),
            ids::power(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            ResolutionFailure::InvalidTopic {
                expected: TopicDirection::Publish,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn inactive_parameter_is_invalid() {
        let mut catalog = fixture_catalog();
        catalog.deactivate_parameter(ids::voltage());
        let err = resolve_trigger_source(
            &catalog,
            ids::org(),
            ids::meter(),
            ids::telemetry_topic(),
            ids::voltage(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ResolutionFailure::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn publish_topic_is_not_a_command_target() {
        let catalog = fixture_catalog();
        let err = resolve_command_target(&catalog, ids::org(), ids::meter(), ids::telemetry_topic())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResolutionFailure::InvalidTopic {
                expected: TopicDirection::Subscribe,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn topic_of_another_schema_version_is_invalid() {
        let catalog = fixture_catalog();
        // the strip's control topic belongs to the strip's schema, not the meter's
        let err = resolve_command_target(&catalog, ids::org(), ids::meter(), ids::control_topic())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionFailure::InvalidTopic { .. }));
    }

    #[tokio::test]
    async fn device_without_schema_is_invalid() {
        let mut catalog = InMemoryCatalog::new();
        catalog.insert_device(Device {
            id: ids::meter(),
            organization_id: ids::org(),
            device_type_id: sensorflow_core::DeviceTypeId::new(1).expect("positive"),
            schema_version_id: None,
            name: "bare".to_string(),
        });
        let err = resolve_device(&catalog, ids::org(), ids::meter())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionFailure::InvalidDevice { .. }));
    }
}
