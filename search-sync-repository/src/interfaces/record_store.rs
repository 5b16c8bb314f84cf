use async_trait::async_trait;
use search_sync_shared::{EntityType, RecordId, SourceRecord};

use crate::errors::RecordStoreError;
use crate::types::FieldFilter;

/// Trait for reading records from the system of record.
///
/// The pipeline only ever reads. A record that is not returned is treated as
/// deleted.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one record; `Ok(None)` when it no longer exists.
    async fn find_by_id(
        &self,
        entity_type: EntityType,
        id: &RecordId,
    ) -> Result<Option<SourceRecord>, RecordStoreError>;

    /// Fetch many records in one round trip. Missing ids are silently omitted.
    async fn find_many_by_id(
        &self,
        entity_type: EntityType,
        ids: &[RecordId],
    ) -> Result<Vec<SourceRecord>, RecordStoreError>;

    /// Planner estimate of the row count, `None` when no estimate is available.
    async fn estimated_count(&self, entity_type: EntityType)
        -> Result<Option<u64>, RecordStoreError>;

    /// Exact row count.
    async fn exact_count(&self, entity_type: EntityType) -> Result<u64, RecordStoreError>;

    /// Exact count of rows matching every filter.
    async fn count_matching(
        &self,
        entity_type: EntityType,
        filters: &[FieldFilter],
    ) -> Result<u64, RecordStoreError>;
}
