//! Routes a queued job to the worker that performs it.

use std::str::FromStr;
use std::sync::Arc;

use search_sync_shared::{EntityType, JobPayload, ReconciliationSample, SyncJob};

use crate::errors::SyncError;
use crate::metrics::MetricsSink;
use crate::workers::{
    BulkIndexWorker, IndexScope, IndexWorker, ReconciliationWorker, RemoveFromIndexWorker,
    SyncOutcome, WorkerConfig, WorkerContext, WorkerOptions,
};

/// What a dispatched job did.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Synced(SyncOutcome),
    BulkIndexed(usize),
    Reconciled(ReconciliationSample),
}

pub struct JobDispatcher {
    index: IndexWorker,
    sync: IndexWorker,
    bulk_index: BulkIndexWorker,
    remove_from_index: RemoveFromIndexWorker,
    reconciliation: ReconciliationWorker,
}

impl JobDispatcher {
    pub fn new(ctx: WorkerContext, metrics: Arc<dyn MetricsSink>, config: WorkerConfig) -> Self {
        Self {
            index: IndexWorker::new(ctx.clone(), IndexScope::Generic, config.index),
            sync: IndexWorker::new(ctx.clone(), IndexScope::PerModel, config.sync),
            bulk_index: BulkIndexWorker::new(ctx.clone(), config.bulk_index),
            remove_from_index: RemoveFromIndexWorker::new(ctx.clone(), config.remove_from_index),
            reconciliation: ReconciliationWorker::new(ctx, metrics, config.reconciliation),
        }
    }

    /// Options of the worker that handles `job`.
    pub fn options_for(&self, job: &SyncJob) -> &WorkerOptions {
        match &job.payload {
            JobPayload::Index { .. } => self.index.options(),
            JobPayload::Sync { .. } => self.sync.options(),
            JobPayload::BulkIndex { .. } => self.bulk_index.options(),
            JobPayload::RemoveFromIndex { .. } => self.remove_from_index.options(),
            JobPayload::Reconcile { .. } => self.reconciliation.options(),
        }
    }

    pub async fn dispatch(&self, job: &SyncJob) -> Result<JobOutcome, SyncError> {
        match &job.payload {
            JobPayload::Index { entity_type, id } => {
                self.index.perform(entity_type, id).await.map(JobOutcome::Synced)
            }
            JobPayload::Sync { entity_type, id } => {
                self.sync.perform(entity_type, id).await.map(JobOutcome::Synced)
            }
            JobPayload::BulkIndex { entity_type, ids } => self
                .bulk_index
                .perform(entity_type, ids)
                .await
                .map(JobOutcome::BulkIndexed),
            JobPayload::RemoveFromIndex { entity_type, id } => self
                .remove_from_index
                .perform(parse_entity_type(entity_type)?, id)
                .await
                .map(JobOutcome::Synced),
            JobPayload::Reconcile { entity_type } => self
                .reconciliation
                .perform(parse_entity_type(entity_type)?)
                .await
                .map(JobOutcome::Reconciled),
        }
    }
}

fn parse_entity_type(name: &str) -> Result<EntityType, SyncError> {
    EntityType::from_str(name).map_err(|_| SyncError::invalid_entity_type(name))
}
