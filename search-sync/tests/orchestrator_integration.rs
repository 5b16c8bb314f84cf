//! Integration tests for the orchestrator.
//!
//! These run the real orchestrator, dispatcher and workers against an
//! in-memory job source, queue, record store and index.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;

use common::{
    published_article, queued, Harness, MockJobQueue, MockJobSource, RecordingMetricsSink,
};
use search_sync::dispatcher::JobDispatcher;
use search_sync::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorStats};
use search_sync::queue::{EnqueueOutcome, RetryPolicy, SearchSyncClient, UniqueJobLocks};
use search_sync::workers::WorkerConfig;
use search_sync_shared::{EntityType, JobPayload, QueuePriority, RecordId, SyncJob};

struct Fixture {
    harness: Harness,
    queue: Arc<MockJobQueue>,
    client: SearchSyncClient,
}

impl Fixture {
    fn new(harness: Harness) -> Self {
        let queue = Arc::new(MockJobQueue::new());
        let client = SearchSyncClient::new(queue.clone(), WorkerConfig::default())
            .with_shared_locks(Arc::new(UniqueJobLocks::default()));
        Self {
            harness,
            queue,
            client,
        }
    }

    fn orchestrator(&self, source: Arc<MockJobSource>) -> Orchestrator {
        let dispatcher = JobDispatcher::new(
            self.harness.ctx(),
            Arc::new(RecordingMetricsSink::new()),
            WorkerConfig::default(),
        );
        Orchestrator::with_config(
            source,
            dispatcher,
            self.client.clone(),
            RetryPolicy::default(),
            OrchestratorConfig {
                channel_buffer_size: 10,
                reconciliation_interval: None,
                progress_interval: Duration::from_secs(60),
            },
        )
    }
}

fn sync_job(entity_type: &str, id: i64) -> SyncJob {
    SyncJob::new(
        JobPayload::Sync {
            entity_type: entity_type.to_string(),
            id: RecordId::Int(id),
        },
        QueuePriority::HighPriority,
        true,
    )
}

#[tokio::test]
async fn test_batch_is_processed_and_acknowledged() {
    let fixture = Fixture::new(Harness::new(vec![
        published_article(1, "First"),
        published_article(2, "Second"),
    ]));
    let source = Arc::new(MockJobSource::new(vec![
        sync_job("Article", 1),
        sync_job("Article", 2),
    ]));
    let mut orchestrator = fixture.orchestrator(source.clone());

    let result = timeout(Duration::from_secs(5), orchestrator.run()).await;
    assert!(result.is_ok(), "orchestrator should finish once the stream ends");
    assert!(result.unwrap().is_ok());

    assert_eq!(source.acks(), vec![true]);
    assert!(fixture.harness.index.document("articles", "1").is_some());
    assert!(fixture.harness.index.document("articles", "2").is_some());
    assert_eq!(
        orchestrator.stats(),
        OrchestratorStats {
            jobs_processed: 2,
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn test_transient_failure_is_requeued_with_backoff() {
    let fixture = Fixture::new(Harness::new(vec![published_article(1, "First")]));
    fixture.harness.store.set_unavailable(true);
    let job = sync_job("Article", 1);
    let source = Arc::new(MockJobSource::new(vec![job.clone()]));
    let mut orchestrator = fixture.orchestrator(source.clone());

    timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .unwrap()
        .unwrap();

    // The failed job is handed back to the queue, so the batch itself succeeds.
    assert_eq!(source.acks(), vec![true]);

    let requeued = fixture.queue.jobs();
    assert_eq!(requeued.len(), 1);
    assert_eq!(requeued[0].job_id, job.job_id);
    assert_eq!(requeued[0].attempt, 1);
    assert_eq!(requeued[0].payload, job.payload);
    assert!(!requeued[0].unique);
    assert!(requeued[0].not_before.unwrap() > job.enqueued_at);

    let stats = orchestrator.stats();
    assert_eq!(stats.jobs_failed, 1);
    assert_eq!(stats.jobs_retried, 1);
    assert_eq!(stats.jobs_dead, 0);
    assert!(fixture.harness.index.write_calls().is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_are_dead() {
    let fixture = Fixture::new(Harness::new(vec![]));
    fixture.harness.store.set_unavailable(true);
    let mut job = sync_job("Tag", 3);
    job.attempt = WorkerConfig::default().sync.retry;

    let orchestrator = fixture.orchestrator(Arc::new(MockJobSource::new(vec![])));
    orchestrator.process_jobs(queued(vec![job])).await.unwrap();

    assert!(fixture.queue.jobs().is_empty());
    let stats = orchestrator.stats();
    assert_eq!(stats.jobs_failed, 1);
    assert_eq!(stats.jobs_dead, 1);
    assert_eq!(stats.jobs_retried, 0);
}

#[tokio::test]
async fn test_invalid_entity_type_is_dead_but_acknowledged() {
    let fixture = Fixture::new(Harness::new(vec![published_article(1, "First")]));
    let invalid = SyncJob::new(
        JobPayload::Reconcile {
            entity_type: "Comment".to_string(),
        },
        QueuePriority::LowPriority,
        false,
    );
    let source = Arc::new(MockJobSource::new(vec![invalid, sync_job("Article", 1)]));
    let mut orchestrator = fixture.orchestrator(source.clone());

    timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .unwrap()
        .unwrap();

    // One bad job does not hold back the rest of the batch.
    assert_eq!(source.acks(), vec![true]);
    assert!(fixture.queue.jobs().is_empty());
    assert!(fixture.harness.index.document("articles", "1").is_some());
    assert_eq!(
        orchestrator.stats(),
        OrchestratorStats {
            jobs_processed: 1,
            jobs_failed: 1,
            jobs_retried: 0,
            jobs_dead: 1,
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn test_failed_requeue_negatively_acknowledges_batch() {
    let fixture = Fixture::new(Harness::new(vec![published_article(1, "First")]));
    fixture.harness.store.set_unavailable(true);
    fixture.queue.set_failing(true);
    let source = Arc::new(MockJobSource::new(vec![sync_job("Article", 1)]));
    let mut orchestrator = fixture.orchestrator(source.clone());

    timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(source.acks(), vec![false]);
    let stats = orchestrator.stats();
    assert_eq!(stats.jobs_failed, 1);
    assert_eq!(stats.jobs_retried, 0);
}

#[tokio::test]
async fn test_unique_lock_released_when_job_starts() {
    let fixture = Fixture::new(Harness::new(vec![published_article(42, "Hello")]));

    let outcome = fixture
        .client
        .sync(EntityType::Article, RecordId::Int(42))
        .await
        .unwrap();
    assert_eq!(outcome, EnqueueOutcome::Enqueued);
    let job = fixture.queue.jobs().remove(0);
    let locks = fixture.client.locks().unwrap();
    assert!(locks.is_held(&job.dedup_key()));

    let duplicate = fixture
        .client
        .sync(EntityType::Article, RecordId::Int(42))
        .await
        .unwrap();
    assert_eq!(duplicate, EnqueueOutcome::Deduplicated);

    let orchestrator = fixture.orchestrator(Arc::new(MockJobSource::new(vec![])));
    orchestrator.process_jobs(queued(vec![job.clone()])).await.unwrap();

    assert!(!locks.is_held(&job.dedup_key()));
    let again = fixture
        .client
        .sync(EntityType::Article, RecordId::Int(42))
        .await
        .unwrap();
    assert_eq!(again, EnqueueOutcome::Enqueued);
}

#[tokio::test]
async fn test_producer_with_own_locks_is_never_starved() {
    let fixture = Fixture::new(Harness::new(vec![published_article(1, "First")]));
    // The host application enqueues from another process.
    let producer = SearchSyncClient::new(fixture.queue.clone(), WorkerConfig::default());

    producer.sync(EntityType::Article, RecordId::Int(1)).await.unwrap();
    let orchestrator = fixture.orchestrator(Arc::new(MockJobSource::new(vec![])));
    orchestrator
        .process_jobs(queued(fixture.queue.jobs()))
        .await
        .unwrap();

    let again = producer
        .sync(EntityType::Article, RecordId::Int(1))
        .await
        .unwrap();
    assert_eq!(again, EnqueueOutcome::Enqueued);
    assert_eq!(fixture.queue.jobs().len(), 2);
}

#[tokio::test]
async fn test_identical_unique_jobs_in_one_batch_run_once() {
    let fixture = Fixture::new(Harness::new(vec![
        published_article(1, "First"),
        published_article(2, "Second"),
    ]));
    let orchestrator = fixture.orchestrator(Arc::new(MockJobSource::new(vec![])));

    let deferred = orchestrator
        .process_jobs(queued(vec![
            sync_job("Article", 1),
            sync_job("Article", 2),
            sync_job("Article", 1),
        ]))
        .await
        .unwrap();

    assert!(deferred.is_empty());
    assert_eq!(fixture.harness.index.write_calls().len(), 2);
    let stats = orchestrator.stats();
    assert_eq!(stats.jobs_processed, 2);
    assert_eq!(stats.jobs_deduplicated, 1);
}

#[tokio::test(start_paused = true)]
async fn test_job_not_due_does_not_delay_the_batch() {
    let fixture = Fixture::new(Harness::new(vec![
        published_article(1, "First"),
        published_article(2, "Second"),
    ]));
    let retry = sync_job("Article", 1).retried(Utc::now() + chrono::Duration::seconds(600));
    let orchestrator = fixture.orchestrator(Arc::new(MockJobSource::new(vec![])));

    let started = tokio::time::Instant::now();
    let deferred = orchestrator
        .process_jobs(queued(vec![retry.clone(), sync_job("Article", 2)]))
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(fixture.harness.index.document("articles", "2").is_some());
    assert!(fixture.harness.index.document("articles", "1").is_none());
    assert_eq!(deferred.len(), 1);
    assert_eq!(deferred[0].job, retry);
    assert_eq!(orchestrator.stats().jobs_deferred, 1);
}

#[tokio::test(start_paused = true)]
async fn test_parked_job_runs_when_due_and_is_acknowledged_separately() {
    let fixture = Fixture::new(Harness::new(vec![
        published_article(1, "First"),
        published_article(2, "Second"),
    ]));
    let retry = sync_job("Article", 1).retried(Utc::now() + chrono::Duration::seconds(120));
    let source = Arc::new(
        MockJobSource::new(vec![retry, sync_job("Article", 2)]).expecting_acks(2),
    );
    let mut orchestrator = fixture.orchestrator(source.clone());

    let started = tokio::time::Instant::now();
    timeout(Duration::from_secs(600), orchestrator.run())
        .await
        .unwrap()
        .unwrap();

    // The fresh job is acknowledged at once, the parked one after its delay.
    assert_eq!(source.acked_offsets(), vec![vec![1], vec![0]]);
    assert_eq!(source.acks(), vec![true, true]);
    assert!(started.elapsed() >= Duration::from_secs(119));
    assert!(fixture.harness.index.document("articles", "1").is_some());
    let stats = orchestrator.stats();
    assert_eq!(stats.jobs_processed, 2);
    assert_eq!(stats.jobs_deferred, 1);
}
