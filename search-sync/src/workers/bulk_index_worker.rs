use search_sync_repository::SearchIndexError;
use search_sync_shared::{IndexDocument, RecordId};
use tracing::{debug, info, instrument, warn};

use crate::errors::SyncError;
use crate::workers::{WorkerContext, WorkerOptions};

/// Upserts many records of one allow-listed type in a single index request.
///
/// Ids that no longer exist in the store are skipped. They are never deleted
/// here; single-record jobs own deletion.
pub struct BulkIndexWorker {
    ctx: WorkerContext,
    options: WorkerOptions,
}

impl BulkIndexWorker {
    pub fn new(ctx: WorkerContext, options: WorkerOptions) -> Self {
        Self { ctx, options }
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Returns the number of documents written.
    #[instrument(skip_all, fields(entity_type = %entity_type, requested = ids.len()))]
    pub async fn perform(&self, entity_type: &str, ids: &[RecordId]) -> Result<usize, SyncError> {
        let registered = self.ctx.registry.resolve_generic(entity_type)?;
        let adapter = &registered.adapter;

        let records = adapter.eager_load(self.ctx.store.as_ref(), ids).await?;
        if records.len() < ids.len() {
            debug!(
                missing = ids.len() - records.len(),
                "Skipping ids missing from the store"
            );
        }

        let documents = records
            .iter()
            .filter(|record| adapter.should_index(record))
            .map(|record| adapter.serialize(record))
            .collect::<Result<Vec<IndexDocument>, SyncError>>()?;

        if documents.is_empty() {
            debug!("Nothing to index");
            return Ok(0);
        }

        let summary = self
            .ctx
            .index
            .bulk_upsert_documents(adapter.index_name(), &documents)
            .await?;

        if summary.failed > 0 {
            let failed_ids = summary.failed_ids();
            warn!(
                failed = summary.failed,
                failed_ids = ?failed_ids,
                "Bulk upsert partially failed"
            );
            return Err(SearchIndexError::bulk_index(format!(
                "{} of {} documents failed: {}",
                summary.failed,
                summary.total,
                failed_ids.join(", ")
            ))
            .into());
        }

        info!(indexed = summary.succeeded, "Bulk upsert complete");
        Ok(summary.succeeded)
    }
}
