//! Device command collaborators.
//!
//! The automation engine never talks to a broker itself. It validates command
//! payloads through a [`CommandPayloadResolver`] and hands resolved commands
//! to a [`DeviceCommandDispatcher`], which reports back a [`CommandLog`].

use crate::catalog::DeviceCatalog;
use crate::error::{CatalogError, DispatchError};
use crate::model::{Device, SchemaVersionTopic};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sensorflow_core::{CommandLogId, DeviceId, TopicId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Lifecycle status of a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Sent,
    Acknowledged,
    Completed,
    Failed,
    Timeout,
}

impl CommandStatus {
    /// Returns the wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Acknowledged => "acknowledged",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

/// Record of one command handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandLog {
    pub id: CommandLogId,
    pub device_id: DeviceId,
    pub topic_id: TopicId,
    pub payload: Map<String, JsonValue>,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Sends commands to devices.
#[async_trait]
pub trait DeviceCommandDispatcher: Send + Sync {
    /// Dispatches `payload` to `device` on `topic`.
    ///
    /// A command the transport accepted but that failed downstream comes back
    /// as `Ok` with [`CommandStatus::Failed`]; `Err` means it never left.
    async fn dispatch(
        &self,
        device: &Device,
        topic: &SchemaVersionTopic,
        payload: &Map<String, JsonValue>,
        user_id: Option<UserId>,
    ) -> Result<CommandLog, DispatchError>;
}

/// Validates command payloads against a subscribe topic's parameters.
#[async_trait]
pub trait CommandPayloadResolver: Send + Sync {
    /// Returns a map of parameter key to error message; empty means valid.
    async fn validate_payload(
        &self,
        topic: &SchemaVersionTopic,
        payload: &Map<String, JsonValue>,
    ) -> Result<BTreeMap<String, String>, CatalogError>;
}

/// Payload resolver backed by the topic's parameter definitions.
///
/// Each active parameter is checked against the payload value under its key,
/// falling back to the parameter's default when the key is absent.
pub struct SchemaPayloadResolver<C: ?Sized> {
    catalog: Arc<C>,
}

impl<C: DeviceCatalog + ?Sized> SchemaPayloadResolver<C> {
    /// Creates a resolver reading parameters from `catalog`.
    pub fn new(catalog: Arc<C>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl<C: DeviceCatalog + ?Sized> CommandPayloadResolver for SchemaPayloadResolver<C> {
    async fn validate_payload(
        &self,
        topic: &SchemaVersionTopic,
        payload: &Map<String, JsonValue>,
    ) -> Result<BTreeMap<String, String>, CatalogError> {
        let parameters = self.catalog.topic_parameters(topic.id).await?;

        let errors = parameters
            .iter()
            .filter(|parameter| parameter.is_active)
            .filter_map(|parameter| {
                let value = payload
                    .get(&parameter.key)
                    .or(parameter.default_value.as_ref());
                parameter
                    .validate_value(value)
                    .err()
                    .map(|violation| (parameter.key.clone(), violation.to_string()))
            })
            .collect();

        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::{fixture_catalog, ids};
    use serde_json::json;

    fn object(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(CommandStatus::Failed.as_str(), "failed");
        let json = serde_json::to_string(&CommandStatus::Acknowledged).expect("serialize");
        assert_eq!(json, "\"acknowledged\"");
    }

    #[tokio::test]
    async fn valid_payload_has_no_errors() {
        let catalog = Arc::new(fixture_catalog());
        let topic = catalog
            .topic(ids::control_topic())
            .await
            .expect("lookup")
            .expect("topic");
        let resolver = SchemaPayloadResolver::new(catalog);

        let errors = resolver
            .validate_payload(&topic, &object(json!({"power": true, "color": "RED"})))
            .await
            .expect("validate");
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn invalid_values_are_reported_by_key() {
        let catalog = Arc::new(fixture_catalog());
        let topic = catalog
            .topic(ids::control_topic())
            .await
            .expect("lookup")
            .expect("topic");
        let resolver = SchemaPayloadResolver::new(catalog);

        let errors = resolver
            .validate_payload(&topic, &object(json!({"power": "maybe", "color": "PINK"})))
            .await
            .expect("validate");
        assert_eq!(
            errors.keys().cloned().collect::<Vec<_>>(),
            vec!["color".to_string(), "power".to_string()]
        );
    }

    #[tokio::test]
    async fn defaults_fill_missing_keys() {
        let catalog = Arc::new(fixture_catalog());
        let topic = catalog
            .topic(ids::control_topic())
            .await
            .expect("lookup")
            .expect("topic");
        let resolver = SchemaPayloadResolver::new(catalog);

        // color defaults to RED
        let errors = resolver
            .validate_payload(&topic, &object(json!({"power": false})))
            .await
            .expect("validate");
        assert!(errors.is_empty());
    }
}
