//! Index adapters.
//!
//! An adapter is the per-entity-type description of how a source record maps
//! to a search document: which index it lives in, which records belong in the
//! index at all, and how to turn a record into a document body.

mod article;
mod reaction;
mod registry;
mod tag;
mod user;

pub use article::ArticleAdapter;
pub use reaction::ReactionAdapter;
pub use registry::{AdapterRegistry, RegisteredAdapter, SyncPolicy};
pub use tag::TagAdapter;
pub use user::UserAdapter;

use async_trait::async_trait;
use search_sync_repository::{FieldFilter, RecordStore};
use search_sync_shared::{EntityType, IndexDocument, RecordId, SourceRecord};
use serde_json::{Map, Value};

use crate::errors::SyncError;

/// Capability contract every indexed entity type implements.
///
/// Only `entity_type`, `index_name` and `serialize` are required; the rest
/// have defaults that suit a type whose table maps 1:1 onto its index.
#[async_trait]
pub trait Indexable: Send + Sync {
    fn entity_type(&self) -> EntityType;

    /// Alias of the index this type's documents are written to.
    fn index_name(&self) -> &str;

    /// Build the document body for a record.
    ///
    /// Must be deterministic: the same record always yields the same body.
    fn serialize(&self, record: &SourceRecord) -> Result<IndexDocument, SyncError>;

    fn document_id(&self, record: &SourceRecord) -> String {
        record.id.to_string()
    }

    /// Whether the record belongs in the index. Records that fail the
    /// predicate are removed rather than written.
    fn should_index(&self, _record: &SourceRecord) -> bool {
        true
    }

    /// Store-side equivalent of `should_index`, used for counting.
    fn index_filters(&self) -> Vec<FieldFilter> {
        Vec::new()
    }

    async fn find(
        &self,
        store: &dyn RecordStore,
        id: &RecordId,
    ) -> Result<Option<SourceRecord>, SyncError> {
        Ok(store.find_by_id(self.entity_type(), id).await?)
    }

    /// Load many records in one round trip. Missing ids are dropped.
    async fn eager_load(
        &self,
        store: &dyn RecordStore,
        ids: &[RecordId],
    ) -> Result<Vec<SourceRecord>, SyncError> {
        Ok(store.find_many_by_id(self.entity_type(), ids).await?)
    }

    /// Record count to compare against the index, for types whose index
    /// holds only a subset of the table. `None` means "use the table size".
    async fn custom_count(&self, _store: &dyn RecordStore) -> Result<Option<u64>, SyncError> {
        Ok(None)
    }
}

pub(crate) fn serialization_error(record: &SourceRecord, reason: impl Into<String>) -> SyncError {
    SyncError::Serialization {
        entity_type: record.entity_type,
        id: record.id.clone(),
        reason: reason.into(),
    }
}

/// A non-empty string field, or a serialization error naming the field.
pub(crate) fn required_str<'a>(record: &'a SourceRecord, field: &str) -> Result<&'a str, SyncError> {
    match record.str_field(field) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(serialization_error(
            record,
            format!("missing required field '{}'", field),
        )),
    }
}

/// Copy a field into the body as-is, writing `null` when the record lacks it.
pub(crate) fn copy_field(body: &mut Map<String, Value>, record: &SourceRecord, field: &str) {
    body.insert(
        field.to_string(),
        record.field(field).cloned().unwrap_or(Value::Null),
    );
}

/// Split a comma separated tag list such as `"rust, webdev"`.
pub(crate) fn split_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// First `limit` characters of `text`, never splitting a character.
pub(crate) fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_tag_list() {
        assert_eq!(split_tag_list("rust, webdev ,,beginners"), vec!["rust", "webdev", "beginners"]);
        assert!(split_tag_list("").is_empty());
        assert!(split_tag_list(" , ").is_empty());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_required_str() {
        let mut fields = Map::new();
        fields.insert("title".to_string(), json!("Hello"));
        fields.insert("path".to_string(), json!("   "));
        let record = SourceRecord::new(EntityType::Article, RecordId::Int(1), fields);

        assert_eq!(required_str(&record, "title").unwrap(), "Hello");
        assert!(matches!(
            required_str(&record, "path"),
            Err(SyncError::Serialization { .. })
        ));
        assert!(matches!(
            required_str(&record, "missing"),
            Err(SyncError::Serialization { .. })
        ));
    }
}
