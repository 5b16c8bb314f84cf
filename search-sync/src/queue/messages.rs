//! Messages exchanged between a job source and the orchestrator.

use search_sync_shared::SyncJob;

/// `(topic, partition, offset)` of one queue message.
pub type MessageOffset = (String, i32, i64);

/// Offsets acknowledged together.
pub type Offsets = Vec<MessageOffset>;

/// A job together with the position of the message that carried it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub job: SyncJob,
    pub offset: MessageOffset,
}

impl QueuedJob {
    pub fn new(job: SyncJob, offset: MessageOffset) -> Self {
        Self { job, offset }
    }
}

#[derive(Debug)]
pub enum StreamMessage {
    /// A batch of jobs to run.
    Jobs(Vec<QueuedJob>),
    /// Outcome of handling some jobs, sent back to the source.
    ///
    /// A batch may be acknowledged in several parts: jobs that are not due yet
    /// are acknowledged once they have run.
    Acknowledgment {
        offsets: Offsets,
        success: bool,
        error: Option<String>,
    },
    /// Stream has ended.
    End,
    /// An error occurred.
    Error(String),
}
