//! Error types for the search sync workers and queue glue.

use search_sync_repository::{RecordStoreError, SearchIndexError};
use search_sync_shared::{EntityType, RecordId};
use thiserror::Error;

/// Errors a worker can fail a job with.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The job named an entity type outside the registry or the allow-list.
    #[error("Invalid entity type: {0}")]
    InvalidEntityType(String),

    /// The record cannot be represented as an index document.
    #[error("Cannot serialize {entity_type} {id}: {reason}")]
    Serialization {
        entity_type: EntityType,
        id: RecordId,
        reason: String,
    },

    /// Error from the search index.
    #[error("Search index error: {0}")]
    Index(#[from] SearchIndexError),

    /// Error from the record store.
    #[error("Record store error: {0}")]
    Store(#[from] RecordStoreError),
}

impl SyncError {
    /// Create an invalid entity type error.
    pub fn invalid_entity_type(name: impl Into<String>) -> Self {
        Self::InvalidEntityType(name.into())
    }

    /// Whether the queue should run the job again.
    ///
    /// Bad input and unserializable records fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidEntityType(_) | Self::Serialization { .. } => false,
            Self::Index(e) => e.is_transient(),
            Self::Store(e) => e.is_transient(),
        }
    }
}

/// Errors from the job queue transport.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// A job could not be encoded for the queue.
    #[error("Encode error: {0}")]
    EncodeError(String),

    /// A queued message could not be decoded into a job.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl QueueError {
    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create an encode error.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::EncodeError(msg.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }
}

impl From<rdkafka::error::KafkaError> for QueueError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(!SyncError::invalid_entity_type("Billboard").is_retryable());
        assert!(!SyncError::Serialization {
            entity_type: EntityType::Article,
            id: RecordId::Int(1),
            reason: "missing title".to_string(),
        }
        .is_retryable());
        assert!(SyncError::from(SearchIndexError::connection("reset")).is_retryable());
        assert!(SyncError::from(SearchIndexError::document_not_found("users", "1")).is_retryable());
        assert!(!SyncError::from(SearchIndexError::validation("bad alias")).is_retryable());
        assert!(!SyncError::from(RecordStoreError::UnsafeIdentifier("x y".to_string())).is_retryable());
    }

    #[test]
    fn test_serialization_error_message() {
        let err = SyncError::Serialization {
            entity_type: EntityType::User,
            id: RecordId::Int(7),
            reason: "missing required field 'username'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot serialize User 7: missing required field 'username'"
        );
    }
}
