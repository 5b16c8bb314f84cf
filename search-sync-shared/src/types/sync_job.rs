//! Queued sync job types.
//!
//! A `SyncJob` is the unit of work that travels through the queue. Jobs are
//! serialized as JSON; the entity type is kept as a plain string so that an
//! unknown tag is rejected by the worker that receives it rather than by the
//! decoder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::record::RecordId;

/// Queue tier a job is scheduled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePriority {
    HighPriority,
    MediumPriority,
    LowPriority,
}

impl QueuePriority {
    pub const ALL: [QueuePriority; 3] = [
        QueuePriority::HighPriority,
        QueuePriority::MediumPriority,
        QueuePriority::LowPriority,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueuePriority::HighPriority => "high_priority",
            QueuePriority::MediumPriority => "medium_priority",
            QueuePriority::LowPriority => "low_priority",
        }
    }
}

impl fmt::Display for QueuePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job asks a worker to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum JobPayload {
    /// Generic single-record sync, restricted to the indexing allow-list.
    Index { entity_type: String, id: RecordId },
    /// Generic batch upsert, restricted to the indexing allow-list.
    BulkIndex {
        entity_type: String,
        ids: Vec<RecordId>,
    },
    /// Per-model single-record sync for any registered entity type.
    Sync { entity_type: String, id: RecordId },
    /// Remove one document from the entity type's index.
    RemoveFromIndex { entity_type: String, id: RecordId },
    /// Compare store and index counts for one entity type.
    Reconcile { entity_type: String },
}

impl JobPayload {
    pub fn job_type(&self) -> &'static str {
        match self {
            JobPayload::Index { .. } => "index",
            JobPayload::BulkIndex { .. } => "bulk_index",
            JobPayload::Sync { .. } => "sync",
            JobPayload::RemoveFromIndex { .. } => "remove_from_index",
            JobPayload::Reconcile { .. } => "reconcile",
        }
    }

    pub fn entity_type(&self) -> &str {
        match self {
            JobPayload::Index { entity_type, .. }
            | JobPayload::BulkIndex { entity_type, .. }
            | JobPayload::Sync { entity_type, .. }
            | JobPayload::RemoveFromIndex { entity_type, .. }
            | JobPayload::Reconcile { entity_type } => entity_type,
        }
    }
}

/// A unit of work carried by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub job_id: Uuid,
    pub priority: QueuePriority,
    /// Zero for the first delivery, incremented on each retry.
    #[serde(default)]
    pub attempt: u32,
    /// Whether a duplicate enqueue should be dropped while this job waits.
    #[serde(default)]
    pub unique: bool,
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time a retried job may run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    pub payload: JobPayload,
}

impl SyncJob {
    pub fn new(payload: JobPayload, priority: QueuePriority, unique: bool) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            priority,
            attempt: 0,
            unique,
            enqueued_at: Utc::now(),
            not_before: None,
            payload,
        }
    }

    /// Key identifying "the same work": job type, entity type and target.
    pub fn dedup_key(&self) -> String {
        let job_type = self.payload.job_type();
        match &self.payload {
            JobPayload::Index { entity_type, id }
            | JobPayload::Sync { entity_type, id }
            | JobPayload::RemoveFromIndex { entity_type, id } => {
                format!("{}:{}:{}", job_type, entity_type, id)
            }
            JobPayload::BulkIndex { entity_type, ids } => {
                let joined = ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}:{}:{}", job_type, entity_type, joined)
            }
            JobPayload::Reconcile { entity_type } => format!("{}:{}", job_type, entity_type),
        }
    }

    /// Queue partition key: entity type and target, without the job type, so
    /// a record's `index`, `sync` and `remove_from_index` jobs share a
    /// partition and are consumed in enqueue order.
    pub fn partition_key(&self) -> String {
        match &self.payload {
            JobPayload::Index { entity_type, id }
            | JobPayload::Sync { entity_type, id }
            | JobPayload::RemoveFromIndex { entity_type, id } => format!("{}:{}", entity_type, id),
            JobPayload::BulkIndex { entity_type, ids } => match ids.first() {
                Some(first) => format!("{}:{}", entity_type, first),
                None => entity_type.clone(),
            },
            JobPayload::Reconcile { entity_type } => entity_type.clone(),
        }
    }

    /// Build the next delivery of this job after a failure.
    pub fn retried(&self, not_before: DateTime<Utc>) -> Self {
        Self {
            job_id: self.job_id,
            priority: self.priority,
            attempt: self.attempt + 1,
            unique: false,
            enqueued_at: Utc::now(),
            not_before: Some(not_before),
            payload: self.payload.clone(),
        }
    }
}
