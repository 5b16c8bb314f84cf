//! Kafka consumer side of the job queue.
//!
//! Reads `SyncJob`s from the tier topics this process serves and forwards
//! them to the orchestrator in batches. A partition's offset is committed only
//! up to the first message that has not been acknowledged, and a rejected
//! batch is read again from its first message.

use async_trait::async_trait;
use rdkafka::{
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::{BorrowedMessage, Message as KafkaMessage},
    Offset, TopicPartitionList,
};
use search_sync_shared::SyncJob;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::config::KafkaConfig;
use crate::errors::QueueError;
use crate::queue::{
    topic_name, JobSource, MessageOffset, OffsetTracker, QueuedJob, StreamMessage,
};

/// Default batch size for Kafka message batching.
const DEFAULT_BATCH_SIZE: usize = 50;

/// Default batch timeout in milliseconds.
const DEFAULT_BATCH_TIMEOUT_MS: u64 = 1000;

/// How long a seek back to a rejected batch may block.
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka consumer for sync jobs.
pub struct KafkaJobConsumer {
    consumer: StreamConsumer,
    topics: Vec<String>,
    batch_size: usize,
    batch_timeout: Duration,
}

impl KafkaJobConsumer {
    pub fn new(config: &KafkaConfig) -> Result<Self, QueueError> {
        Self::with_batch_config(config, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT_MS)
    }

    /// Create a consumer with custom batch configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Broker, group and tier settings
    /// * `batch_size` - Number of jobs to batch before sending
    /// * `batch_timeout_ms` - Maximum time to wait before flushing a partial batch (milliseconds)
    pub fn with_batch_config(
        config: &KafkaConfig,
        batch_size: usize,
        batch_timeout_ms: u64,
    ) -> Result<Self, QueueError> {
        let consumer: StreamConsumer = config
            .client_config()
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()?;

        let topics = config
            .tiers
            .iter()
            .map(|tier| topic_name(&config.topic_prefix, *tier))
            .collect::<Vec<_>>();

        info!(
            broker = %config.broker,
            group_id = %config.group_id,
            topics = ?topics,
            batch_size = batch_size,
            batch_timeout_ms = batch_timeout_ms,
            "Created Kafka job consumer with batching"
        );

        Ok(Self {
            consumer,
            topics,
            batch_size,
            batch_timeout: Duration::from_millis(batch_timeout_ms),
        })
    }

    /// Flush a batch of jobs to the channel.
    async fn flush_batch(
        &self,
        batch: &mut Vec<QueuedJob>,
        sender: &mpsc::Sender<StreamMessage>,
    ) -> Result<(), QueueError> {
        if batch.is_empty() {
            return Ok(());
        }

        info!(job_count = batch.len(), "Sending batch of jobs to orchestrator");
        sender
            .send(StreamMessage::Jobs(std::mem::take(batch)))
            .await
            .map_err(|e| QueueError::ChannelError(e.to_string()))
    }

    /// Commit the position after each given offset.
    fn commit_offsets(&self, offsets: &[MessageOffset]) -> Result<(), QueueError> {
        if offsets.is_empty() {
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        for (topic, partition, offset) in offsets {
            tpl.add_partition_offset(topic, *partition, Offset::Offset(offset + 1))?;
        }

        self.consumer.commit(&tpl, CommitMode::Async)?;
        Ok(())
    }

    /// Mark messages as handled and commit whatever became contiguous.
    fn complete(
        &self,
        tracker: &mut OffsetTracker,
        offsets: &[MessageOffset],
    ) -> Result<(), QueueError> {
        let committable = tracker.complete(offsets);
        self.commit_offsets(&committable)?;
        if !committable.is_empty() {
            debug!(partitions = committable.len(), "Committed acknowledged offsets");
        }
        Ok(())
    }

    /// Read a rejected batch again by seeking each partition back to its
    /// first rejected message.
    fn redeliver(&self, tracker: &mut OffsetTracker, offsets: &[MessageOffset]) {
        for (topic, partition, offset) in tracker.rewind(offsets) {
            match self
                .consumer
                .seek(&topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
            {
                Ok(()) => info!(
                    topic = %topic,
                    partition = partition,
                    offset = offset,
                    "Rewound partition to redeliver rejected jobs"
                ),
                // The offsets stay uncommitted, so a restart redelivers them.
                Err(e) => error!(
                    topic = %topic,
                    partition = partition,
                    offset = offset,
                    error = %e,
                    "Failed to rewind partition"
                ),
            }
        }
    }

    /// Decode a message; `Ok(None)` for messages that carry no job.
    fn parse_message(msg: &BorrowedMessage<'_>) -> Result<Option<SyncJob>, QueueError> {
        let payload = match msg.payload() {
            Some(p) if !p.is_empty() => p,
            _ => {
                debug!("Received message with empty payload");
                return Ok(None);
            }
        };

        serde_json::from_slice::<SyncJob>(payload)
            .map(Some)
            .map_err(|e| QueueError::decode(e.to_string()))
    }
}

#[async_trait]
impl JobSource for KafkaJobConsumer {
    fn subscribe(&self) -> Result<(), QueueError> {
        let topics: Vec<&str> = self.topics.iter().map(|s| s.as_str()).collect();
        self.consumer.subscribe(&topics)?;

        info!(topics = ?self.topics, "Subscribed to Kafka topics");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        mut ack_receiver: mpsc::Receiver<StreamMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), QueueError> {
        use futures::StreamExt;

        let mut message_stream = self.consumer.stream();
        let mut batch: Vec<QueuedJob> = Vec::with_capacity(self.batch_size);
        let mut tracker = OffsetTracker::new();
        let mut flush_timer = tokio::time::interval(self.batch_timeout);
        flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        flush_timer.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(in_flight = tracker.in_flight(), "Consumer received shutdown signal");
                    // Uncommitted jobs are re-read from the last committed offset on restart.
                    let _ = sender.send(StreamMessage::End).await;
                    break;
                }
                ack_msg = ack_receiver.recv() => {
                    match ack_msg {
                        Some(StreamMessage::Acknowledgment { offsets, success, error }) => {
                            if success {
                                if let Err(e) = self.complete(&mut tracker, &offsets) {
                                    error!(error = %e, "Failed to commit offsets after acknowledgment");
                                }
                            } else {
                                error!(
                                    offset_count = offsets.len(),
                                    error = error.as_deref().unwrap_or("Unknown error"),
                                    "Jobs were rejected, reading them again"
                                );
                                self.redeliver(&mut tracker, &offsets);
                            }
                        }
                        Some(StreamMessage::End) | None => {
                            info!("Acknowledgment channel closed");
                            break;
                        }
                        _ => {}
                    }
                }
                message = message_stream.next() => {
                    match message {
                        Some(Ok(msg)) => {
                            debug!(
                                topic = %msg.topic(),
                                partition = msg.partition(),
                                offset = msg.offset(),
                                "Received message from Kafka"
                            );
                            let offset = (msg.topic().to_string(), msg.partition(), msg.offset());
                            tracker.track(&offset);

                            match Self::parse_message(&msg) {
                                Ok(Some(job)) => {
                                    batch.push(QueuedJob::new(job, offset));

                                    if batch.len() >= self.batch_size {
                                        self.flush_batch(&mut batch, &sender).await?;
                                    }
                                }
                                Ok(None) => {
                                    self.complete(&mut tracker, &[offset])?;
                                }
                                Err(e) => {
                                    // A job that cannot be decoded will never decode; skip past it.
                                    warn!(
                                        topic = %msg.topic(),
                                        partition = msg.partition(),
                                        offset = msg.offset(),
                                        error = %e,
                                        "Dropping undecodable job"
                                    );
                                    self.complete(&mut tracker, &[offset])?;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Kafka error");
                            let _ = sender.send(StreamMessage::Error(e.to_string())).await;
                        }
                        None => {
                            info!("Kafka stream ended");
                            self.flush_batch(&mut batch, &sender).await?;
                            let _ = sender.send(StreamMessage::End).await;
                            break;
                        }
                    }
                }
                _ = flush_timer.tick() => {
                    if !batch.is_empty() {
                        debug!(count = batch.len(), "Flushing batch due to timeout");
                        self.flush_batch(&mut batch, &sender).await?;
                    }
                }
            }
        }

        Ok(())
    }
}
