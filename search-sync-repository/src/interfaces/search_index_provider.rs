//! Search index provider trait definition.
//!
//! This module defines the abstract interface for search index operations,
//! allowing for different backend implementations (OpenSearch, Elasticsearch, etc.).

use async_trait::async_trait;
use search_sync_shared::IndexDocument;

use crate::errors::SearchIndexError;
use crate::types::BatchOperationSummary;

/// Abstracts the underlying search index implementation (OpenSearch, Elasticsearch, etc.).
///
/// All writes are idempotent by document id: writing the same document twice
/// leaves the index in the same state, which is what makes at-least-once job
/// delivery safe.
///
/// # Index Initialization
///
/// Implementations should call `ensure_index_exists` during application startup for every
/// alias the workers write to.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Ensure the index behind `alias` exists, creating it if necessary.
    async fn ensure_index_exists(&self, alias: &str) -> Result<(), SearchIndexError>;

    /// Insert or fully replace one document.
    ///
    /// # Arguments
    ///
    /// * `document` - The document, carrying its index alias and id
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was written
    /// * `Err(SearchIndexError)` - If the operation fails
    async fn upsert_document(&self, document: &IndexDocument) -> Result<(), SearchIndexError>;

    /// Insert or fully replace many documents of one index in a single request.
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOperationSummary)` - Per-document outcome of the bulk request
    /// * `Err(SearchIndexError)` - If the bulk request fails entirely
    async fn bulk_upsert_documents(
        &self,
        alias: &str,
        documents: &[IndexDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError>;

    /// Delete one document.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was deleted
    /// * `Err(SearchIndexError::DocumentNotFound)` - If no such document exists
    /// * `Err(SearchIndexError)` - If the deletion fails
    async fn delete_document(&self, alias: &str, document_id: &str)
        -> Result<(), SearchIndexError>;

    /// Number of documents currently held by the index behind `alias`.
    async fn count_documents(&self, alias: &str) -> Result<u64, SearchIndexError>;
}
