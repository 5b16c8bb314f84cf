//! Sync workers.
//!
//! Each worker performs one kind of job against the record store and the
//! search index. Workers hold no state between jobs and never retry locally;
//! a failed job is returned to the queue glue, which decides whether it runs
//! again.

mod bulk_index_worker;
mod index_worker;
mod reconciliation_worker;
mod remove_from_index_worker;

pub use bulk_index_worker::BulkIndexWorker;
pub use index_worker::{IndexScope, IndexWorker};
pub use reconciliation_worker::ReconciliationWorker;
pub use remove_from_index_worker::RemoveFromIndexWorker;

use std::sync::Arc;

use search_sync_repository::{RecordStore, SearchIndexProvider};
use search_sync_shared::{JobPayload, QueuePriority, RecordId};
use tracing::debug;

use crate::adapters::{AdapterRegistry, RegisteredAdapter};
use crate::errors::SyncError;

/// Shared handles every worker operates on.
#[derive(Clone)]
pub struct WorkerContext {
    pub registry: Arc<AdapterRegistry>,
    pub store: Arc<dyn RecordStore>,
    pub index: Arc<dyn SearchIndexProvider>,
}

impl WorkerContext {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        store: Arc<dyn RecordStore>,
        index: Arc<dyn SearchIndexProvider>,
    ) -> Self {
        Self {
            registry,
            store,
            index,
        }
    }
}

/// Queue settings for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Tier the worker's jobs are enqueued on.
    pub priority: QueuePriority,
    /// Retries allowed after the first attempt.
    pub retry: u32,
    /// Drop duplicate enqueues while an identical job is waiting.
    pub unique_until_executing: bool,
}

impl WorkerOptions {
    pub const fn new(priority: QueuePriority, retry: u32, unique_until_executing: bool) -> Self {
        Self {
            priority,
            retry,
            unique_until_executing,
        }
    }
}

/// Options for every worker, looked up by job payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub index: WorkerOptions,
    pub bulk_index: WorkerOptions,
    pub sync: WorkerOptions,
    pub remove_from_index: WorkerOptions,
    pub reconciliation: WorkerOptions,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            index: WorkerOptions::new(QueuePriority::HighPriority, 10, true),
            bulk_index: WorkerOptions::new(QueuePriority::MediumPriority, 5, false),
            sync: WorkerOptions::new(QueuePriority::HighPriority, 10, true),
            remove_from_index: WorkerOptions::new(QueuePriority::HighPriority, 10, true),
            reconciliation: WorkerOptions::new(QueuePriority::LowPriority, 3, false),
        }
    }
}

impl WorkerConfig {
    pub fn options_for(&self, payload: &JobPayload) -> WorkerOptions {
        match payload {
            JobPayload::Index { .. } => self.index,
            JobPayload::BulkIndex { .. } => self.bulk_index,
            JobPayload::Sync { .. } => self.sync,
            JobPayload::RemoveFromIndex { .. } => self.remove_from_index,
            JobPayload::Reconcile { .. } => self.reconciliation,
        }
    }
}

/// What a single-record job did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Upserted,
    Deleted,
    /// The document was already gone and the type tolerates that.
    AlreadyAbsent,
}

/// Delete one document, applying the type's not-found policy.
pub(crate) async fn remove_document(
    index: &dyn SearchIndexProvider,
    registered: &RegisteredAdapter,
    id: &RecordId,
) -> Result<SyncOutcome, SyncError> {
    let alias = registered.adapter.index_name();
    let document_id = id.to_string();

    match index.delete_document(alias, &document_id).await {
        Ok(()) => Ok(SyncOutcome::Deleted),
        Err(e) if e.is_not_found() && registered.policy.tolerate_missing_on_delete => {
            debug!(
                index = %alias,
                document_id = %document_id,
                "Document already absent from index"
            );
            Ok(SyncOutcome::AlreadyAbsent)
        }
        Err(e) => Err(e.into()),
    }
}
