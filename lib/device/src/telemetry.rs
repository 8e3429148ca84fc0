//! Normalized telemetry records.

use chrono::{DateTime, Utc};
use sensorflow_core::{DeviceId, TelemetryRecordId, TopicId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One normalized reading received from a device on a publish topic.
///
/// Produced by the ingestion pipeline; the automation engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub id: TelemetryRecordId,
    pub device_id: DeviceId,
    pub schema_version_topic_id: TopicId,
    /// Payload after parameter mutation, keyed by parameter key or nested path.
    #[serde(default)]
    pub transformed_values: Map<String, JsonValue>,
    pub recorded_at: DateTime<Utc>,
}

impl TelemetryRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        id: TelemetryRecordId,
        device_id: DeviceId,
        schema_version_topic_id: TopicId,
        transformed_values: Map<String, JsonValue>,
    ) -> Self {
        Self {
            id,
            device_id,
            schema_version_topic_id,
            transformed_values,
            recorded_at: Utc::now(),
        }
    }
}
