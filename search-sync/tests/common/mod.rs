//! In-memory stand-ins for the index, the record store, the queue and the
//! metrics sink, shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc};

use search_sync::adapters::AdapterRegistry;
use search_sync::errors::QueueError;
use search_sync::metrics::{Metric, MetricsError, MetricsSink};
use search_sync::queue::{JobQueue, JobSource, QueuedJob, StreamMessage};
use search_sync::workers::WorkerContext;
use search_sync_repository::opensearch::IndexConfig;
use search_sync_repository::{
    BatchOperationResult, BatchOperationSummary, FieldFilter, RecordStore, RecordStoreError,
    SearchIndexError, SearchIndexProvider,
};
use search_sync_shared::{EntityType, IndexDocument, RecordId, SourceRecord, SyncJob};

pub fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

pub fn record(entity_type: EntityType, id: i64, value: Value) -> SourceRecord {
    let mut fields = fields(value);
    fields.insert("id".to_string(), Value::from(id));
    SourceRecord::new(entity_type, id, fields)
}

pub fn published_article(id: i64, title: &str) -> SourceRecord {
    record(
        EntityType::Article,
        id,
        serde_json::json!({
            "title": title,
            "path": format!("/ana/post-{}", id),
            "published": true,
            "cached_tag_list": "rust",
            "body_markdown": "Body",
            "user_id": 7,
            "comments_count": 1,
            "positive_reactions_count": 0,
            "hotness_score": 10
        }),
    )
}

/// One recorded call against the mock index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexCall {
    Upsert { index: String, id: String },
    BulkUpsert { index: String, ids: Vec<String> },
    Delete { index: String, id: String },
    Count { index: String },
}

#[derive(Default)]
pub struct MockSearchIndex {
    documents: Mutex<HashMap<String, HashMap<String, Map<String, Value>>>>,
    calls: Mutex<Vec<IndexCall>>,
    /// Document ids whose bulk item fails.
    bulk_failures: Mutex<Vec<String>>,
    /// Failures returned by the next upserts, in order.
    upsert_failures: Mutex<Vec<SearchIndexError>>,
    /// Count reported per alias instead of the stored document count.
    count_overrides: Mutex<HashMap<String, u64>>,
}

impl MockSearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, index: &str, id: &str, body: Map<String, Value>) {
        self.documents
            .lock()
            .unwrap()
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), body);
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        self.documents
            .lock()
            .unwrap()
            .get(index)
            .and_then(|docs| docs.get(id).cloned())
    }

    pub fn document_count(&self, index: &str) -> usize {
        self.documents
            .lock()
            .unwrap()
            .get(index)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, HashMap<String, Map<String, Value>>> {
        self.documents.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<IndexCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change the index.
    pub fn write_calls(&self) -> Vec<IndexCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, IndexCall::Count { .. }))
            .collect()
    }

    pub fn fail_bulk_item(&self, id: &str) {
        self.bulk_failures.lock().unwrap().push(id.to_string());
    }

    pub fn fail_next_upsert(&self, error: SearchIndexError) {
        self.upsert_failures.lock().unwrap().push(error);
    }

    pub fn report_count(&self, index: &str, count: u64) {
        self.count_overrides
            .lock()
            .unwrap()
            .insert(index.to_string(), count);
    }

    fn record_call(&self, call: IndexCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl SearchIndexProvider for MockSearchIndex {
    async fn ensure_index_exists(&self, _alias: &str) -> Result<(), SearchIndexError> {
        Ok(())
    }

    async fn upsert_document(&self, document: &IndexDocument) -> Result<(), SearchIndexError> {
        self.record_call(IndexCall::Upsert {
            index: document.index.clone(),
            id: document.id.clone(),
        });
        {
            let mut failures = self.upsert_failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }
        self.insert(&document.index, &document.id, document.body.clone());
        Ok(())
    }

    async fn bulk_upsert_documents(
        &self,
        alias: &str,
        documents: &[IndexDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        self.record_call(IndexCall::BulkUpsert {
            index: alias.to_string(),
            ids: documents.iter().map(|d| d.id.clone()).collect(),
        });

        let failures = self.bulk_failures.lock().unwrap().clone();
        let mut results = Vec::with_capacity(documents.len());
        for document in documents {
            if failures.contains(&document.id) {
                results.push(BatchOperationResult {
                    document_id: document.id.clone(),
                    success: false,
                    error: Some(SearchIndexError::bulk_index("mapper_parsing_exception")),
                });
            } else {
                self.insert(alias, &document.id, document.body.clone());
                results.push(BatchOperationResult {
                    document_id: document.id.clone(),
                    success: true,
                    error: None,
                });
            }
        }
        Ok(BatchOperationSummary::from_results(results))
    }

    async fn delete_document(&self, alias: &str, document_id: &str) -> Result<(), SearchIndexError> {
        self.record_call(IndexCall::Delete {
            index: alias.to_string(),
            id: document_id.to_string(),
        });

        let removed = self
            .documents
            .lock()
            .unwrap()
            .get_mut(alias)
            .and_then(|docs| docs.remove(document_id));
        match removed {
            Some(_) => Ok(()),
            None => Err(SearchIndexError::document_not_found(alias, document_id)),
        }
    }

    async fn count_documents(&self, alias: &str) -> Result<u64, SearchIndexError> {
        self.record_call(IndexCall::Count {
            index: alias.to_string(),
        });
        if let Some(count) = self.count_overrides.lock().unwrap().get(alias) {
            return Ok(*count);
        }
        Ok(self.document_count(alias) as u64)
    }
}

#[derive(Default)]
pub struct MockRecordStore {
    records: Mutex<HashMap<(EntityType, String), SourceRecord>>,
    estimates: Mutex<HashMap<EntityType, u64>>,
    unavailable: Mutex<bool>,
    pub lookups: AtomicUsize,
    pub counts: AtomicUsize,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SourceRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.put(record);
        }
        store
    }

    pub fn put(&self, record: SourceRecord) {
        self.records
            .lock()
            .unwrap()
            .insert((record.entity_type, record.id.to_string()), record);
    }

    pub fn remove(&self, entity_type: EntityType, id: &RecordId) {
        self.records
            .lock()
            .unwrap()
            .remove(&(entity_type, id.to_string()));
    }

    pub fn set_estimate(&self, entity_type: EntityType, estimate: u64) {
        self.estimates.lock().unwrap().insert(entity_type, estimate);
    }

    /// Make every call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn calls(&self) -> usize {
        self.lookups.load(Ordering::SeqCst) + self.counts.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), RecordStoreError> {
        if *self.unavailable.lock().unwrap() {
            return Err(RecordStoreError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn records_of(&self, entity_type: EntityType) -> Vec<SourceRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.entity_type == entity_type)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl RecordStore for MockRecordStore {
    async fn find_by_id(
        &self,
        entity_type: EntityType,
        id: &RecordId,
    ) -> Result<Option<SourceRecord>, RecordStoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(entity_type, id.to_string()))
            .cloned())
    }

    async fn find_many_by_id(
        &self,
        entity_type: EntityType,
        ids: &[RecordId],
    ) -> Result<Vec<SourceRecord>, RecordStoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let records = self.records.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| records.get(&(entity_type, id.to_string())).cloned())
            .collect())
    }

    async fn estimated_count(
        &self,
        entity_type: EntityType,
    ) -> Result<Option<u64>, RecordStoreError> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.estimates.lock().unwrap().get(&entity_type).copied())
    }

    async fn exact_count(&self, entity_type: EntityType) -> Result<u64, RecordStoreError> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.records_of(entity_type).len() as u64)
    }

    async fn count_matching(
        &self,
        entity_type: EntityType,
        filters: &[FieldFilter],
    ) -> Result<u64, RecordStoreError> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self
            .records_of(entity_type)
            .iter()
            .filter(|r| filters.iter().all(|f| f.matches(r.field(&f.field))))
            .count() as u64)
    }
}

#[derive(Default)]
pub struct RecordingMetricsSink {
    metrics: Mutex<Vec<Metric>>,
    fail: bool,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            metrics: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn metrics(&self) -> Vec<Metric> {
        self.metrics.lock().unwrap().clone()
    }

    pub fn value(&self, name: &str, entity: &str) -> Option<i64> {
        self.metrics()
            .iter()
            .find(|m| m.name == name && m.tag("entity") == Some(entity))
            .map(|m| m.value)
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn emit(&self, metric: &Metric) -> Result<(), MetricsError> {
        if self.fail {
            return Err(MetricsError("sink unavailable".to_string()));
        }
        self.metrics.lock().unwrap().push(metric.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockJobQueue {
    jobs: Mutex<Vec<SyncJob>>,
    fail: Mutex<bool>,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<SyncJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait::async_trait]
impl JobQueue for MockJobQueue {
    async fn enqueue(&self, job: &SyncJob) -> Result<(), QueueError> {
        if *self.fail.lock().unwrap() {
            return Err(QueueError::kafka("broker transport failure"));
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

pub const TOPIC: &str = "search_sync.high_priority";

/// Wrap jobs as a batch read from consecutive offsets of partition 0.
pub fn queued(jobs: Vec<SyncJob>) -> Vec<QueuedJob> {
    jobs.into_iter()
        .enumerate()
        .map(|(i, job)| QueuedJob::new(job, (TOPIC.to_string(), 0, i as i64)))
        .collect()
}

/// Sends one batch, waits for the expected number of acknowledgments, then
/// sends `End`.
pub struct MockJobSource {
    jobs: Vec<SyncJob>,
    expected_acks: usize,
    acks: Arc<Mutex<Vec<(Vec<i64>, bool)>>>,
}

impl MockJobSource {
    pub fn new(jobs: Vec<SyncJob>) -> Self {
        Self {
            jobs,
            expected_acks: 1,
            acks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn expecting_acks(mut self, expected_acks: usize) -> Self {
        self.expected_acks = expected_acks;
        self
    }

    /// Success flag of every acknowledgment received.
    pub fn acks(&self) -> Vec<bool> {
        self.acks.lock().unwrap().iter().map(|(_, success)| *success).collect()
    }

    /// Offsets named by every acknowledgment received, in arrival order.
    pub fn acked_offsets(&self) -> Vec<Vec<i64>> {
        self.acks
            .lock()
            .unwrap()
            .iter()
            .map(|(offsets, _)| offsets.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl JobSource for MockJobSource {
    fn subscribe(&self) -> Result<(), QueueError> {
        Ok(())
    }

    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        mut ack_receiver: mpsc::Receiver<StreamMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), QueueError> {
        let _ = sender.send(StreamMessage::Jobs(queued(self.jobs.clone()))).await;

        while self.acks.lock().unwrap().len() < self.expected_acks {
            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                ack = ack_receiver.recv() => match ack {
                    Some(StreamMessage::Acknowledgment { offsets, success, .. }) => {
                        let offsets = offsets.into_iter().map(|(_, _, offset)| offset).collect();
                        self.acks.lock().unwrap().push((offsets, success));
                    }
                    Some(_) => {}
                    None => return Ok(()),
                },
            }
        }

        let _ = sender.send(StreamMessage::End).await;
        Ok(())
    }
}

/// Registry, store and index wired into a worker context.
pub struct Harness {
    pub registry: Arc<AdapterRegistry>,
    pub store: Arc<MockRecordStore>,
    pub index: Arc<MockSearchIndex>,
}

impl Harness {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            registry: Arc::new(AdapterRegistry::standard(&IndexConfig::default())),
            store: Arc::new(MockRecordStore::with_records(records)),
            index: Arc::new(MockSearchIndex::new()),
        }
    }

    pub fn ctx(&self) -> WorkerContext {
        WorkerContext::new(
            self.registry.clone(),
            self.store.clone(),
            self.index.clone(),
        )
    }
}
