//! Trigger index rows and their storage.

use crate::error::TriggerIndexError;
use async_trait::async_trait;
use sensorflow_core::Result;
use sensorflow_core::{DeviceId, DeviceTypeId, OrganizationId, TopicId, WorkflowVersionId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

/// One compiled lookup entry pointing telemetry at a workflow version.
///
/// `None` in `device_id`, `device_type_id` or `schema_version_topic_id`
/// matches any value within the organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerIndexRow {
    pub organization_id: OrganizationId,
    pub workflow_version_id: WorkflowVersionId,
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    #[serde(default)]
    pub device_type_id: Option<DeviceTypeId>,
    #[serde(default)]
    pub schema_version_topic_id: Option<TopicId>,
    /// Coarse filter over the record's transformed values; absent always matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_expression: Option<JsonValue>,
}

impl TriggerIndexRow {
    /// Returns true if the row covers telemetry described by `scope`.
    #[must_use]
    pub fn covers(&self, scope: &TelemetryScope) -> bool {
        self.organization_id == scope.organization_id
            && self.device_id.is_none_or(|id| id == scope.device_id)
            && self.device_type_id.is_none_or(|id| id == scope.device_type_id)
            && self
                .schema_version_topic_id
                .is_none_or(|id| id == scope.schema_version_topic_id)
    }
}

/// Where a telemetry record came from, as seen by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryScope {
    pub organization_id: OrganizationId,
    pub device_id: DeviceId,
    pub device_type_id: DeviceTypeId,
    pub schema_version_topic_id: TopicId,
}

/// Persistence for trigger index rows.
///
/// Deleting and inserting a version's rows are separate operations, so a
/// reader running between them sees the version with no rows.
#[async_trait]
pub trait TriggerIndexStore: Send + Sync {
    /// Deletes every row of a workflow version, returning how many were removed.
    async fn delete_version(&self, workflow_version_id: WorkflowVersionId) -> Result<usize, TriggerIndexError>;

    /// Inserts rows, returning how many were added.
    async fn insert(&self, rows: Vec<TriggerIndexRow>) -> Result<usize, TriggerIndexError>;

    /// Returns the rows covering `scope`.
    async fn candidates(&self, scope: &TelemetryScope) -> Result<Vec<TriggerIndexRow>, TriggerIndexError>;

    /// Returns the rows of one workflow version.
    async fn version_rows(
        &self,
        workflow_version_id: WorkflowVersionId,
    ) -> Result<Vec<TriggerIndexRow>, TriggerIndexError>;
}

/// Trigger index held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryTriggerIndexStore {
    rows: RwLock<Vec<TriggerIndexRow>>,
}

impl InMemoryTriggerIndexStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored row.
    pub async fn rows(&self) -> Vec<TriggerIndexRow> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl TriggerIndexStore for InMemoryTriggerIndexStore {
    async fn delete_version(&self, workflow_version_id: WorkflowVersionId) -> Result<usize, TriggerIndexError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| row.workflow_version_id != workflow_version_id);
        Ok(before - rows.len())
    }

    async fn insert(&self, rows: Vec<TriggerIndexRow>) -> Result<usize, TriggerIndexError> {
        let inserted = rows.len();
        self.rows.write().await.extend(rows);
        Ok(inserted)
    }

    async fn candidates(&self, scope: &TelemetryScope) -> Result<Vec<TriggerIndexRow>, TriggerIndexError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| row.covers(scope))
            .cloned()
            .collect())
    }

    async fn version_rows(
        &self,
        workflow_version_id: WorkflowVersionId,
    ) -> Result<Vec<TriggerIndexRow>, TriggerIndexError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| row.workflow_version_id == workflow_version_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn scope() -> TelemetryScope {
        TelemetryScope {
            organization_id: OrganizationId::new(1).expect("positive"),
            device_id: DeviceId::new(1).expect("positive"),
            device_type_id: DeviceTypeId::new(10).expect("positive"),
            schema_version_topic_id: TopicId::new(5).expect("positive"),
        }
    }

    pub(crate) fn row(version: i64, device: Option<i64>, device_type: Option<i64>, topic: Option<i64>) -> TriggerIndexRow {
        TriggerIndexRow {
            organization_id: OrganizationId::new(1).expect("positive"),
            workflow_version_id: WorkflowVersionId::new(version).expect("positive"),
            device_id: device.and_then(DeviceId::new),
            device_type_id: device_type.and_then(DeviceTypeId::new),
            schema_version_topic_id: topic.and_then(TopicId::new),
            filter_expression: None,
        }
    }

    #[test]
    fn null_columns_are_wildcards() {
        let scope = scope();
        assert!(row(1, Some(1), Some(10), Some(5)).covers(&scope));
        assert!(row(1, None, None, None).covers(&scope));
        assert!(row(1, None, Some(10), None).covers(&scope));
        assert!(!row(1, Some(2), None, None).covers(&scope));
        assert!(!row(1, None, Some(20), None).covers(&scope));
        assert!(!row(1, Some(1), Some(10), Some(6)).covers(&scope));

        let mut foreign = row(1, None, None, None);
        foreign.organization_id = OrganizationId::new(2).expect("positive");
        assert!(!foreign.covers(&scope));
    }

    #[tokio::test]
    async fn delete_only_touches_one_version() {
        let store = InMemoryTriggerIndexStore::new();
        store
            .insert(vec![row(1, Some(1), Some(10), Some(5)), row(2, Some(1), Some(10), Some(5))])
            .await
            .expect("insert");

        let deleted = store
            .delete_version(WorkflowVersionId::new(1).expect("positive"))
            .await
            .expect("delete");

        assert_eq!(deleted, 1);
        let remaining = store.rows().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].workflow_version_id.get(), 2);
    }

    #[tokio::test]
    async fn candidates_apply_scope() {
        let store = InMemoryTriggerIndexStore::new();
        store
            .insert(vec![
                row(1, Some(1), Some(10), Some(5)),
                row(2, Some(2), Some(20), Some(6)),
                row(3, None, None, Some(5)),
            ])
            .await
            .expect("insert");

        let candidates = store.candidates(&scope()).await.expect("candidates");
        let versions: Vec<_> = candidates.iter().map(|row| row.workflow_version_id.get()).collect();
        assert_eq!(versions, vec![1, 3]);
    }
}
