//! Query node collaborator.
//!
//! Query nodes aggregate historical telemetry. How a query is expressed and
//! run belongs to the storage layer, so the engine only hands the node's
//! configuration to a [`QueryExecutor`] and threads the result into the
//! execution context of the node's descendants.

use crate::context::ExecutionContext;
use crate::run::Run;
use async_trait::async_trait;
use sensorflow_core::OrganizationId;
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Errors from a query collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The node configuration is not a runnable query.
    InvalidConfig { reason: String },
    /// The query ran but could not produce a result.
    Execution { reason: String },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } | Self::Execution { reason } => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for QueryError {}

/// Validates and runs query node configurations.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Checks a configuration at publish time.
    async fn validate_config(
        &self,
        organization_id: OrganizationId,
        config: &Map<String, JsonValue>,
    ) -> Result<(), QueryError>;

    /// Runs the query for one node.
    ///
    /// The result should carry a numeric `value` and may carry a
    /// `window: {start, end}`; both are exposed to conditions and alerts.
    async fn execute(
        &self,
        run: &Run,
        config: &Map<String, JsonValue>,
        context: &ExecutionContext,
    ) -> Result<JsonValue, QueryError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns a fixed result and records the configs it ran.
    pub(crate) struct StaticQueryExecutor {
        result: Result<JsonValue, QueryError>,
        pub(crate) executed: Mutex<Vec<Map<String, JsonValue>>>,
    }

    impl StaticQueryExecutor {
        pub(crate) fn returning(result: JsonValue) -> Self {
            Self {
                result: Ok(result),
                executed: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(reason: &str) -> Self {
            Self {
                result: Err(QueryError::Execution {
                    reason: reason.to_string(),
                }),
                executed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QueryExecutor for StaticQueryExecutor {
        async fn validate_config(
            &self,
            _organization_id: OrganizationId,
            config: &Map<String, JsonValue>,
        ) -> Result<(), QueryError> {
            match config.get("mode").and_then(JsonValue::as_str) {
                Some("sql") => Ok(()),
                _ => Err(QueryError::InvalidConfig {
                    reason: "must use sql mode".to_string(),
                }),
            }
        }

        async fn execute(
            &self,
            _run: &Run,
            config: &Map<String, JsonValue>,
            _context: &ExecutionContext,
        ) -> Result<JsonValue, QueryError> {
            self.executed.lock().expect("lock").push(config.clone());
            self.result.clone()
        }
    }

    #[test]
    fn error_display_is_the_reason() {
        let err = QueryError::InvalidConfig {
            reason: "must use sql mode".to_string(),
        };
        assert_eq!(err.to_string(), "must use sql mode");
        assert_eq!(
            json!({"reason": err.to_string()}),
            json!({"reason": "must use sql mode"})
        );
    }
}
