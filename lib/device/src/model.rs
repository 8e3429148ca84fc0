//! Device catalog model.
//!
//! A device runs one schema version. The schema version declares topics, each
//! either published by the device (telemetry) or subscribed to by it
//! (commands), and each topic declares the parameters carried in its payload.

use sensorflow_core::path;
use sensorflow_core::{
    DeviceId, DeviceTypeId, OrganizationId, ParameterDefinitionId, SchemaVersionId, TopicId,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Direction of a topic from the device's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicDirection {
    /// The device publishes on this topic (telemetry).
    Publish,
    /// The device subscribes to this topic (commands).
    Subscribe,
}

impl TopicDirection {
    /// Returns the wire name of the direction.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Subscribe => "subscribe",
        }
    }
}

/// A registered device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub organization_id: OrganizationId,
    pub device_type_id: DeviceTypeId,
    /// Schema version currently assigned to the device, if any.
    #[serde(default)]
    pub schema_version_id: Option<SchemaVersionId>,
    #[serde(default)]
    pub name: String,
}

/// A topic declared by a schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersionTopic {
    pub id: TopicId,
    pub schema_version_id: SchemaVersionId,
    pub key: String,
    #[serde(default)]
    pub suffix: String,
    pub direction: TopicDirection,
}

/// Declared type of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDataType {
    Integer,
    Decimal,
    Boolean,
    String,
    Json,
}

impl ParameterDataType {
    /// Returns true if `value` is acceptable for this type.
    ///
    /// Integer and decimal values may arrive as strings, booleans as `0`/`1`
    /// or `"true"`/`"false"`.
    #[must_use]
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            Self::Integer => match value {
                JsonValue::Number(n) => n.is_i64() || n.is_u64(),
                JsonValue::String(s) => {
                    let digits = s.strip_prefix('-').unwrap_or(s);
                    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
                }
                _ => false,
            },
            Self::Decimal => path::as_number(value).is_some(),
            Self::Boolean => match value {
                JsonValue::Bool(_) => true,
                JsonValue::Number(n) => matches!(n.as_i64(), Some(0 | 1)),
                JsonValue::String(s) => matches!(s.as_str(), "true" | "false" | "0" | "1"),
                _ => false,
            },
            Self::String => value.is_string(),
            Self::Json => value.is_object() || value.is_array(),
        }
    }
}

/// Optional value constraints attached to a parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<JsonValue>>,
}

/// Why a parameter value was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterViolation {
    /// A required value was missing or empty.
    Required,
    /// The value does not match the declared data type.
    DataType { expected: ParameterDataType },
    /// The value is below the configured minimum.
    BelowMinimum { min: f64 },
    /// The value is above the configured maximum.
    AboveMaximum { max: f64 },
    /// The value is not one of the allowed values.
    NotAllowed,
}

impl fmt::Display for ParameterViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "value is required"),
            Self::DataType { expected } => write!(f, "value is not a valid {expected:?}"),
            Self::BelowMinimum { min } => write!(f, "value must be at least {min}"),
            Self::AboveMaximum { max } => write!(f, "value must be at most {max}"),
            Self::NotAllowed => write!(f, "value is not one of the allowed values"),
        }
    }
}

/// A parameter carried in a topic payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub id: ParameterDefinitionId,
    pub topic_id: TopicId,
    pub key: String,
    /// Location of the value inside the payload, e.g. `$.voltages.V1`.
    #[serde(default)]
    pub json_path: String,
    pub data_type: ParameterDataType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<JsonValue>,
    #[serde(default)]
    pub validation_rules: ValidationRules,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ParameterDefinition {
    /// Extracts this parameter's value from a payload using its JSON path.
    ///
    /// Returns `None` when the path is empty, is the document root, or does
    /// not resolve.
    #[must_use]
    pub fn extract_value<'a>(&self, payload: &'a Map<String, JsonValue>) -> Option<&'a JsonValue> {
        let normalized = self.json_path.trim();
        if normalized.is_empty() || normalized == "$" {
            return None;
        }
        let normalized = normalized.strip_prefix("$.").unwrap_or(normalized);
        path::lookup_in(payload, normalized).filter(|value| !value.is_null())
    }

    /// Checks a value against the parameter's requirements.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate_value(&self, value: Option<&JsonValue>) -> Result<(), ParameterViolation> {
        let value = value.filter(|v| !v.is_null() && v.as_str() != Some(""));

        let Some(value) = value else {
            return if self.required {
                Err(ParameterViolation::Required)
            } else {
                Ok(())
            };
        };

        if !self.data_type.accepts(value) {
            return Err(ParameterViolation::DataType {
                expected: self.data_type,
            });
        }

        let rules = &self.validation_rules;
        if let Some(number) = path::as_number(value) {
            if let Some(min) = rules.min.filter(|min| number < *min) {
                return Err(ParameterViolation::BelowMinimum { min });
            }
            if let Some(max) = rules.max.filter(|max| number > *max) {
                return Err(ParameterViolation::AboveMaximum { max });
            }
        }

        if let Some(allowed) = &rules.allowed {
            if !allowed.contains(value) {
                return Err(ParameterViolation::NotAllowed);
            }
        }

        Ok(())
    }
}
