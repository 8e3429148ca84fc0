//! Matches telemetry records against the compiled trigger index.

use crate::error::TriggerIndexError;
use crate::store::{TelemetryScope, TriggerIndexRow, TriggerIndexStore};
use sensorflow_core::Result;
use sensorflow_core::WorkflowVersionId;
use sensorflow_device::{DeviceCatalog, TelemetryRecord};
use sensorflow_workflow::logic::{self, ExpressionEvaluator, JsonLogic};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

/// Finds the workflow versions a telemetry record may trigger.
pub struct TriggerMatcher {
    catalog: Arc<dyn DeviceCatalog>,
    store: Arc<dyn TriggerIndexStore>,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl TriggerMatcher {
    /// Creates a matcher that evaluates row filters with [`JsonLogic`].
    #[must_use]
    pub fn new(catalog: Arc<dyn DeviceCatalog>, store: Arc<dyn TriggerIndexStore>) -> Self {
        Self {
            catalog,
            store,
            evaluator: Arc::new(JsonLogic),
        }
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Returns the distinct workflow versions whose rows cover the record,
    /// in ascending id order.
    ///
    /// A record from a device the catalog no longer knows matches nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog or the index store fails.
    #[instrument(
        skip(self, record),
        fields(
            telemetry_record_id = %record.id,
            device_id = %record.device_id,
            schema_version_topic_id = %record.schema_version_topic_id,
        )
    )]
    pub async fn match_telemetry_triggers(
        &self,
        record: &TelemetryRecord,
    ) -> Result<Vec<WorkflowVersionId>, TriggerIndexError> {
        let Some(device) = self
            .catalog
            .device(record.device_id)
            .await
            .map_err(TriggerIndexError::from)?
        else {
            tracing::debug!("Telemetry device is not in the catalog");
            return Ok(Vec::new());
        };

        let scope = TelemetryScope {
            organization_id: device.organization_id,
            device_id: device.id,
            device_type_id: device.device_type_id,
            schema_version_topic_id: record.schema_version_topic_id,
        };
        let candidates = self.store.candidates(&scope).await?;
        let values = JsonValue::Object(record.transformed_values.clone());

        let matched: BTreeSet<WorkflowVersionId> = candidates
            .iter()
            .filter(|row| self.filter_passes(row, &values))
            .map(|row| row.workflow_version_id)
            .collect();

        tracing::info!(
            candidate_count = candidates.len(),
            matched_count = matched.len(),
            "Matched telemetry triggers"
        );

        Ok(matched.into_iter().collect())
    }

    /// Only a non-empty object or array is a filter; anything else matches.
    fn filter_passes(&self, row: &TriggerIndexRow, values: &JsonValue) -> bool {
        let is_filter = match &row.filter_expression {
            Some(JsonValue::Object(expression)) => !expression.is_empty(),
            Some(JsonValue::Array(expression)) => !expression.is_empty(),
            _ => false,
        };
        match &row.filter_expression {
            Some(expression) if is_filter => logic::coerce_bool(&self.evaluator.evaluate(expression, values)),
            _ => true,
        }
    }
}
