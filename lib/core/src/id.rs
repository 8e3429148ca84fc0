//! Strongly-typed ID types for domain entities.
//!
//! Catalog and workflow entities are keyed by positive integers assigned by the
//! backing store. Correlation ids are ULIDs so runs and their steps sort by
//! creation time in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Generates a newtype over a positive `i64` store key.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw key, rejecting zero and negative values.
            #[must_use]
            pub const fn new(value: i64) -> Option<Self> {
                if value > 0 { Some(Self(value)) } else { None }
            }

            /// Returns the raw key.
            #[must_use]
            pub const fn get(&self) -> i64 {
                self.0
            }

            /// Returns the prefix used for display formatting.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let prefix_with_underscore = concat!($prefix, "_");
                let raw = s.strip_prefix(prefix_with_underscore).unwrap_or(s);

                let value = raw.parse::<i64>().map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    reason: e.to_string(),
                })?;

                Self::new(value).ok_or_else(|| ParseIdError {
                    id_type: stringify!($name),
                    reason: format!("{value} is not a positive key"),
                })
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Tenant that owns devices and workflows.
    OrganizationId,
    "org"
);

define_id!(
    /// Automation workflow definition.
    WorkflowId,
    "wf"
);

define_id!(
    /// Immutable, published snapshot of a workflow graph.
    WorkflowVersionId,
    "wfv"
);

define_id!(
    /// Single execution of a workflow version.
    RunId,
    "run"
);

define_id!(
    /// Physical or virtual device.
    DeviceId,
    "dev"
);

define_id!(
    /// Device type (model family) a device belongs to.
    DeviceTypeId,
    "dtype"
);

define_id!(
    /// Version of a device schema.
    SchemaVersionId,
    "schema"
);

define_id!(
    /// Topic declared by a schema version.
    TopicId,
    "topic"
);

define_id!(
    /// Parameter declared on a schema-version topic.
    ParameterDefinitionId,
    "param"
);

define_id!(
    /// Device command log entry.
    CommandLogId,
    "cmd"
);

define_id!(
    /// Platform user.
    UserId,
    "usr"
);

define_id!(
    /// Normalized telemetry record.
    TelemetryRecordId,
    "tlm"
);

/// Opaque id linking a run, its steps and the event that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Ulid);

impl CorrelationId {
    /// Creates a new correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_str(s.trim())
            .map(Self)
            .map_err(|e| ParseIdError {
                id_type: "CorrelationId",
                reason: e.to_string(),
            })
    }
}
