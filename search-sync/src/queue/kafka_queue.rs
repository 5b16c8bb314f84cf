//! Kafka producer side of the job queue.

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use search_sync_shared::{QueuePriority, SyncJob};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::config::KafkaConfig;
use crate::errors::QueueError;
use crate::queue::JobQueue;

/// How long a send may wait for room in the producer's local buffer.
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Topic for a priority tier, e.g. `search_sync.high_priority`.
pub fn topic_name(prefix: &str, priority: QueuePriority) -> String {
    format!("{}.{}", prefix, priority.as_str())
}

/// Publishes jobs as JSON, one topic per tier.
///
/// Messages are keyed by the job's partition key so every job for one record
/// lands on the same partition and is consumed in order.
pub struct KafkaJobQueue {
    producer: FutureProducer,
    topic_prefix: String,
}

impl KafkaJobQueue {
    pub fn new(config: &KafkaConfig) -> Result<Self, QueueError> {
        let producer: FutureProducer = config
            .client_config()
            .set("client.id", &config.client_id)
            .set("compression.type", "zstd")
            .set("message.timeout.ms", "5000")
            .create()?;

        info!(
            broker = %config.broker,
            topic_prefix = %config.topic_prefix,
            "Created Kafka job producer"
        );

        Ok(Self {
            producer,
            topic_prefix: config.topic_prefix.clone(),
        })
    }
}

#[async_trait]
impl JobQueue for KafkaJobQueue {
    #[instrument(skip_all, fields(job_id = %job.job_id, job_type = job.payload.job_type()))]
    async fn enqueue(&self, job: &SyncJob) -> Result<(), QueueError> {
        let topic = topic_name(&self.topic_prefix, job.priority);
        let key = job.partition_key();
        let payload =
            serde_json::to_vec(job).map_err(|e| QueueError::encode(e.to_string()))?;

        self.producer
            .send(
                FutureRecord::to(&topic).key(&key).payload(&payload),
                Timeout::After(ENQUEUE_TIMEOUT),
            )
            .await
            .map_err(|(e, _)| QueueError::from(e))?;

        debug!(topic = %topic, key = %key, attempt = job.attempt, "Enqueued job");
        Ok(())
    }
}
