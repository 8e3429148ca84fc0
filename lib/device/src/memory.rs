//! In-memory catalog and dispatcher.
//!
//! Used by tests across the workspace and by the replay binary, which loads a
//! [`CatalogSnapshot`] from a fixture file.

use crate::catalog::DeviceCatalog;
use crate::command::{CommandLog, CommandStatus, DeviceCommandDispatcher};
use crate::error::{CatalogError, DispatchError};
use crate::model::{Device, ParameterDefinition, SchemaVersionTopic};
use async_trait::async_trait;
use chrono::Utc;
use sensorflow_core::{CommandLogId, DeviceId, ParameterDefinitionId, TopicId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

/// Serializable contents of a catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub topics: Vec<SchemaVersionTopic>,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

/// Catalog held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    devices: HashMap<DeviceId, Device>,
    topics: HashMap<TopicId, SchemaVersionTopic>,
    parameters: BTreeMap<ParameterDefinitionId, ParameterDefinition>,
    unavailable: Option<String>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let mut catalog = Self::new();
        for device in snapshot.devices {
            catalog.insert_device(device);
        }
        for topic in snapshot.topics {
            catalog.insert_topic(topic);
        }
        for parameter in snapshot.parameters {
            catalog.insert_parameter(parameter);
        }
        catalog
    }

    pub fn insert_device(&mut self, device: Device) {
        self.devices.insert(device.id, device);
    }

    pub fn insert_topic(&mut self, topic: SchemaVersionTopic) {
        self.topics.insert(topic.id, topic);
    }

    pub fn insert_parameter(&mut self, parameter: ParameterDefinition) {
        self.parameters.insert(parameter.id, parameter);
    }

    /// Marks a parameter inactive, as an operator retiring it would.
    pub fn deactivate_parameter(&mut self, id: ParameterDefinitionId) {
        if let Some(parameter) = self.parameters.get_mut(&id) {
            parameter.is_active = false;
        }
    }

    /// Removes a device, leaving references to it dangling.
    pub fn remove_device(&mut self, id: DeviceId) -> Option<Device> {
        self.devices.remove(&id)
    }

    /// Makes every subsequent lookup fail with [`CatalogError::Unavailable`].
    pub fn set_unavailable(&mut self, reason: impl Into<String>) {
        self.unavailable = Some(reason.into());
    }

    fn check_available(&self) -> Result<(), CatalogError> {
        match &self.unavailable {
            Some(reason) => Err(CatalogError::Unavailable {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceCatalog for InMemoryCatalog {
    async fn device(&self, id: DeviceId) -> Result<Option<Device>, CatalogError> {
        self.check_available()?;
        Ok(self.devices.get(&id).cloned())
    }

    async fn topic(&self, id: TopicId) -> Result<Option<SchemaVersionTopic>, CatalogError> {
        self.check_available()?;
        Ok(self.topics.get(&id).cloned())
    }

    async fn parameter(
        &self,
        id: ParameterDefinitionId,
    ) -> Result<Option<ParameterDefinition>, CatalogError> {
        self.check_available()?;
        Ok(self.parameters.get(&id).cloned())
    }

    async fn topic_parameters(
        &self,
        topic_id: TopicId,
    ) -> Result<Vec<ParameterDefinition>, CatalogError> {
        self.check_available()?;
        Ok(self
            .parameters
            .values()
            .filter(|parameter| parameter.topic_id == topic_id)
            .cloned()
            .collect())
    }
}

/// Dispatcher that records commands instead of sending them.
pub struct RecordingDispatcher {
    status: CommandStatus,
    transport_failure: Option<String>,
    next_id: AtomicI64,
    dispatched: Mutex<Vec<CommandLog>>,
}

impl RecordingDispatcher {
    /// Creates a dispatcher that reports every command as sent.
    #[must_use]
    pub fn new() -> Self {
        Self::with_status(CommandStatus::Sent)
    }

    /// Creates a dispatcher that reports every command with `status`.
    #[must_use]
    pub fn with_status(status: CommandStatus) -> Self {
        Self {
            status,
            transport_failure: None,
            next_id: AtomicI64::new(1),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    /// Creates a dispatcher whose transport rejects every command.
    #[must_use]
    pub fn failing_transport(reason: impl Into<String>) -> Self {
        Self {
            transport_failure: Some(reason.into()),
            ..Self::new()
        }
    }

    /// Returns every command recorded so far.
    #[must_use]
    pub fn dispatched(&self) -> Vec<CommandLog> {
        self.dispatched
            .lock()
            .map(|logs| logs.clone())
            .unwrap_or_default()
    }
}

impl Default for RecordingDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceCommandDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        device: &Device,
        topic: &SchemaVersionTopic,
        payload: &Map<String, JsonValue>,
        user_id: Option<UserId>,
    ) -> Result<CommandLog, DispatchError> {
        if let Some(reason) = &self.transport_failure {
            return Err(DispatchError::Transport {
                reason: reason.clone(),
            });
        }

        let raw_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = CommandLogId::new(raw_id).ok_or_else(|| DispatchError::Transport {
            reason: format!("command id sequence exhausted at {raw_id}"),
        })?;

        let log = CommandLog {
            id,
            device_id: device.id,
            topic_id: topic.id,
            payload: payload.clone(),
            status: self.status,
            error_message: (self.status == CommandStatus::Failed)
                .then(|| "device rejected command".to_string()),
            user_id,
            created_at: Utc::now(),
        };

        tracing::debug!(
            command_log_id = %log.id,
            device_id = %device.id,
            topic_id = %topic.id,
            status = log.status.as_str(),
            "Recorded device command"
        );

        let mut dispatched = self.dispatched.lock().map_err(|e| DispatchError::Transport {
            reason: e.to_string(),
        })?;
        dispatched.push(log.clone());
        Ok(log)
    }
}
