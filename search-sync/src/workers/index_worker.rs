use search_sync_shared::RecordId;
use tracing::{debug, info, instrument};

use crate::adapters::RegisteredAdapter;
use crate::errors::SyncError;
use crate::workers::{remove_document, SyncOutcome, WorkerContext, WorkerOptions};

/// Which entity types an `IndexWorker` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexScope {
    /// Only types on the generic allow-list.
    Generic,
    /// Any registered type.
    PerModel,
}

/// Brings one record's document in line with the store: upsert it when the
/// record exists and should be indexed, delete it otherwise.
pub struct IndexWorker {
    ctx: WorkerContext,
    scope: IndexScope,
    options: WorkerOptions,
}

impl IndexWorker {
    pub fn new(ctx: WorkerContext, scope: IndexScope, options: WorkerOptions) -> Self {
        Self {
            ctx,
            scope,
            options,
        }
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn scope(&self) -> IndexScope {
        self.scope
    }

    fn resolve(&self, entity_type: &str) -> Result<&RegisteredAdapter, SyncError> {
        match self.scope {
            IndexScope::Generic => self.ctx.registry.resolve_generic(entity_type),
            IndexScope::PerModel => self.ctx.registry.resolve(entity_type),
        }
    }

    #[instrument(skip_all, fields(entity_type = %entity_type, id = %id, scope = ?self.scope))]
    pub async fn perform(&self, entity_type: &str, id: &RecordId) -> Result<SyncOutcome, SyncError> {
        // Rejected before any store or index traffic.
        let registered = self.resolve(entity_type)?;
        let adapter = &registered.adapter;

        let record = adapter.find(self.ctx.store.as_ref(), id).await?;

        match record {
            Some(record) if adapter.should_index(&record) => {
                let document = adapter.serialize(&record)?;
                self.ctx.index.upsert_document(&document).await?;
                info!(index = %document.index, "Upserted document");
                Ok(SyncOutcome::Upserted)
            }
            Some(_) => {
                debug!("Record no longer matches the indexing predicate, removing");
                remove_document(self.ctx.index.as_ref(), registered, id).await
            }
            None => {
                debug!("Record not found, removing");
                remove_document(self.ctx.index.as_ref(), registered, id).await
            }
        }
    }
}
