//! Queue glue: how jobs are enqueued, delivered, deduplicated and retried.
//!
//! The queue is a set of Kafka topics, one per priority tier. Producers
//! publish `SyncJob`s through a `JobQueue`; the orchestrator pulls them from a
//! `JobSource` and acknowledges each batch once every job in it has either
//! succeeded, been re-enqueued for retry or been declared dead.

mod client;
mod kafka_consumer;
mod kafka_queue;
mod messages;
mod offsets;
mod retry;
mod unique;

pub use client::SearchSyncClient;
pub use kafka_consumer::KafkaJobConsumer;
pub use kafka_queue::{topic_name, KafkaJobQueue};
pub use messages::{MessageOffset, Offsets, QueuedJob, StreamMessage};
pub use offsets::OffsetTracker;
pub use retry::{RetryDecision, RetryPolicy, DEFAULT_MAX_BACKOFF_SECS};
pub use unique::{UniqueJobLocks, DEFAULT_LOCK_TTL_SECS};

use async_trait::async_trait;
use search_sync_shared::SyncJob;
use tokio::sync::{broadcast, mpsc};

use crate::errors::QueueError;

/// Result of asking for a job to be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// An identical unique job is already waiting in this process; nothing
    /// was published.
    Deduplicated,
}

/// Publishes jobs to the durable queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &SyncJob) -> Result<(), QueueError>;
}

/// Delivers queued jobs to the orchestrator.
///
/// Implementations send `StreamMessage::Jobs` batches on `sender` and must
/// only mark a job's message as consumed after a successful
/// `StreamMessage::Acknowledgment` naming its offset arrives on
/// `ack_receiver`, and never past an earlier unacknowledged message.
#[async_trait]
pub trait JobSource: Send + Sync {
    fn subscribe(&self) -> Result<(), QueueError>;

    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        ack_receiver: mpsc::Receiver<StreamMessage>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), QueueError>;
}
