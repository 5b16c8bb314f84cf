use search_sync_shared::{EntityType, RecordId};
use tracing::{info, instrument};

use crate::errors::SyncError;
use crate::workers::{remove_document, SyncOutcome, WorkerContext, WorkerOptions};

/// Propagates a record deletion to the search index.
pub struct RemoveFromIndexWorker {
    ctx: WorkerContext,
    options: WorkerOptions,
}

impl RemoveFromIndexWorker {
    pub fn new(ctx: WorkerContext, options: WorkerOptions) -> Self {
        Self { ctx, options }
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    #[instrument(skip_all, fields(entity_type = %entity_type, id = %id))]
    pub async fn perform(
        &self,
        entity_type: EntityType,
        id: &RecordId,
    ) -> Result<SyncOutcome, SyncError> {
        let registered = self.ctx.registry.get(entity_type);
        let outcome = remove_document(self.ctx.index.as_ref(), registered, id).await?;
        info!(outcome = ?outcome, "Removed document from index");
        Ok(outcome)
    }
}
