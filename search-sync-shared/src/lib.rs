//! # Search Sync Shared
//!
//! This crate defines shared data structures used across the search sync
//! pipeline: entity type tags, source records, index documents, queued sync
//! jobs and reconciliation samples.

pub mod types;

pub use types::entity_type::{EntityType, UnknownEntityType};
pub use types::index_document::IndexDocument;
pub use types::reconciliation::ReconciliationSample;
pub use types::record::{RecordId, SourceRecord};
pub use types::sync_job::{JobPayload, QueuePriority, SyncJob};
