//! Application-facing enqueue API.

use std::sync::Arc;

use search_sync_shared::{EntityType, JobPayload, QueuePriority, RecordId, SyncJob};
use tracing::{debug, info};

use crate::errors::QueueError;
use crate::queue::{EnqueueOutcome, JobQueue, UniqueJobLocks};
use crate::workers::WorkerConfig;

/// Enqueues sync jobs with each worker's tier and uniqueness settings.
///
/// The host application calls this from its record lifecycle hooks: `index`
/// or `sync` after a save, `remove_from_index` after a destroy. A client built
/// with `new` always publishes; only a client sharing its locks with a local
/// orchestrator drops duplicate enqueues.
#[derive(Clone)]
pub struct SearchSyncClient {
    queue: Arc<dyn JobQueue>,
    locks: Option<Arc<UniqueJobLocks>>,
    workers: WorkerConfig,
}

impl SearchSyncClient {
    pub fn new(queue: Arc<dyn JobQueue>, workers: WorkerConfig) -> Self {
        Self {
            queue,
            locks: None,
            workers,
        }
    }

    /// Deduplicate unique jobs against `locks`, which must be the locks the
    /// orchestrator running these jobs releases.
    pub fn with_shared_locks(mut self, locks: Arc<UniqueJobLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn locks(&self) -> Option<&UniqueJobLocks> {
        self.locks.as_deref()
    }

    pub fn workers(&self) -> &WorkerConfig {
        &self.workers
    }

    /// Generic single-record sync. Only allow-listed types are accepted by the
    /// worker.
    pub async fn index(
        &self,
        entity_type: EntityType,
        id: RecordId,
    ) -> Result<EnqueueOutcome, QueueError> {
        self.submit(JobPayload::Index {
            entity_type: entity_type.to_string(),
            id,
        })
        .await
    }

    pub async fn bulk_index(
        &self,
        entity_type: EntityType,
        ids: Vec<RecordId>,
    ) -> Result<EnqueueOutcome, QueueError> {
        self.submit(JobPayload::BulkIndex {
            entity_type: entity_type.to_string(),
            ids,
        })
        .await
    }

    /// Per-model single-record sync for any registered type.
    pub async fn sync(
        &self,
        entity_type: EntityType,
        id: RecordId,
    ) -> Result<EnqueueOutcome, QueueError> {
        self.submit(JobPayload::Sync {
            entity_type: entity_type.to_string(),
            id,
        })
        .await
    }

    pub async fn remove_from_index(
        &self,
        entity_type: EntityType,
        id: RecordId,
    ) -> Result<EnqueueOutcome, QueueError> {
        self.submit(JobPayload::RemoveFromIndex {
            entity_type: entity_type.to_string(),
            id,
        })
        .await
    }

    pub async fn reconcile(&self, entity_type: EntityType) -> Result<EnqueueOutcome, QueueError> {
        self.submit(JobPayload::Reconcile {
            entity_type: entity_type.to_string(),
        })
        .await
    }

    /// Enqueue `bulk_index` jobs of at most `batch_size` ids each on the low
    /// tier, so a full reindex never crowds out live updates. Returns the
    /// number of jobs enqueued.
    pub async fn backfill(
        &self,
        entity_type: EntityType,
        ids: &[RecordId],
        batch_size: usize,
    ) -> Result<usize, QueueError> {
        let batch_size = batch_size.max(1);
        let mut enqueued = 0;

        for chunk in ids.chunks(batch_size) {
            let job = SyncJob::new(
                JobPayload::BulkIndex {
                    entity_type: entity_type.to_string(),
                    ids: chunk.to_vec(),
                },
                QueuePriority::LowPriority,
                false,
            );
            self.queue.enqueue(&job).await?;
            enqueued += 1;
        }

        info!(
            entity_type = %entity_type,
            ids = ids.len(),
            jobs = enqueued,
            "Enqueued backfill"
        );
        Ok(enqueued)
    }

    /// Publish an already-built job, bypassing uniqueness. Used for retries.
    pub async fn requeue(&self, job: &SyncJob) -> Result<(), QueueError> {
        self.queue.enqueue(job).await
    }

    async fn submit(&self, payload: JobPayload) -> Result<EnqueueOutcome, QueueError> {
        let options = self.workers.options_for(&payload);
        let job = SyncJob::new(payload, options.priority, options.unique_until_executing);
        self.enqueue(job).await
    }

    /// Publish a job, honoring its `unique` flag when locks are shared.
    pub async fn enqueue(&self, job: SyncJob) -> Result<EnqueueOutcome, QueueError> {
        let locks = match &self.locks {
            Some(locks) if job.unique => locks,
            _ => {
                self.queue.enqueue(&job).await?;
                return Ok(EnqueueOutcome::Enqueued);
            }
        };

        let key = job.dedup_key();
        if !locks.try_acquire(&key) {
            debug!(key = %key, "Identical job already queued, skipping");
            return Ok(EnqueueOutcome::Deduplicated);
        }

        if let Err(e) = self.queue.enqueue(&job).await {
            locks.release(&key);
            return Err(e);
        }
        Ok(EnqueueOutcome::Enqueued)
    }
}
