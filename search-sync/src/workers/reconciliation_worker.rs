use std::sync::Arc;

use search_sync_shared::{EntityType, ReconciliationSample};
use tracing::{info, instrument};

use crate::adapters::Indexable;
use crate::errors::SyncError;
use crate::metrics::{
    emit_or_log, Metric, MetricsSink, RECONCILIATION_DB_COUNT, RECONCILIATION_DRIFT,
    RECONCILIATION_INDEX_COUNT,
};
use crate::workers::{WorkerContext, WorkerOptions};

/// Measures how far an index has drifted from its table.
///
/// Read-only on both sides. Drift is reported, never repaired.
pub struct ReconciliationWorker {
    ctx: WorkerContext,
    metrics: Arc<dyn MetricsSink>,
    options: WorkerOptions,
}

impl ReconciliationWorker {
    pub fn new(ctx: WorkerContext, metrics: Arc<dyn MetricsSink>, options: WorkerOptions) -> Self {
        Self {
            ctx,
            metrics,
            options,
        }
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    #[instrument(skip_all, fields(entity_type = %entity_type))]
    pub async fn perform(&self, entity_type: EntityType) -> Result<ReconciliationSample, SyncError> {
        let adapter = &self.ctx.registry.get(entity_type).adapter;

        let db_count = self.db_count(adapter.as_ref()).await?;
        let index_count = self
            .ctx
            .index
            .count_documents(adapter.index_name())
            .await?;

        let sample = ReconciliationSample::new(entity_type, db_count, index_count);
        self.report(&sample);
        Ok(sample)
    }

    /// Adapter count first, since it reflects the indexing predicate; then the
    /// planner estimate; then an exact count.
    async fn db_count(&self, adapter: &dyn Indexable) -> Result<u64, SyncError> {
        let store = self.ctx.store.as_ref();

        if let Some(count) = adapter.custom_count(store).await? {
            return Ok(count);
        }
        if let Some(estimate) = store.estimated_count(adapter.entity_type()).await? {
            return Ok(estimate);
        }
        Ok(store.exact_count(adapter.entity_type()).await?)
    }

    fn report(&self, sample: &ReconciliationSample) {
        let entity = sample.entity_type.as_str();
        let metrics = [
            Metric::gauge(RECONCILIATION_DB_COUNT, sample.db_count as i64),
            Metric::gauge(RECONCILIATION_INDEX_COUNT, sample.index_count as i64),
            Metric::gauge(RECONCILIATION_DRIFT, sample.drift()),
        ];
        for metric in metrics {
            emit_or_log(self.metrics.as_ref(), &metric.with_tag("entity", entity));
        }

        info!(
            entity = %entity,
            db_count = sample.db_count,
            index_count = sample.index_count,
            drift = sample.drift(),
            "Reconciliation sample"
        );
    }
}
