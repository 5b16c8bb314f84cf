use async_trait::async_trait;
use search_sync_repository::opensearch::IndexConfig;
use search_sync_repository::{FieldFilter, RecordStore};
use search_sync_shared::{EntityType, IndexDocument, SourceRecord};
use serde_json::{json, Map};

use crate::adapters::{copy_field, required_str, serialization_error, Indexable};
use crate::errors::SyncError;

const READING_LIST_CATEGORY: &str = "readinglist";
const ARTICLE_REACTABLE: &str = "Article";

/// Indexes reading-list reactions on articles. Other reactions never reach
/// the index.
pub struct ReactionAdapter {
    index_name: String,
}

impl ReactionAdapter {
    pub const BASE_INDEX: &'static str = "reactions";

    pub fn new(index_config: &IndexConfig) -> Self {
        Self {
            index_name: index_config.alias(Self::BASE_INDEX),
        }
    }
}

#[async_trait]
impl Indexable for ReactionAdapter {
    fn entity_type(&self) -> EntityType {
        EntityType::Reaction
    }

    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn serialize(&self, record: &SourceRecord) -> Result<IndexDocument, SyncError> {
        let category = required_str(record, "category")?;
        let reactable_id = record
            .field("reactable_id")
            .cloned()
            .ok_or_else(|| serialization_error(record, "missing required field 'reactable_id'"))?;

        let mut body = Map::new();
        body.insert("category".to_string(), json!(category));
        copy_field(&mut body, record, "user_id");
        body.insert("reactable_id".to_string(), reactable_id);
        copy_field(&mut body, record, "reactable_type");
        copy_field(&mut body, record, "created_at");
        body.insert("class_name".to_string(), json!("Reaction"));

        Ok(IndexDocument::new(
            self.document_id(record),
            self.index_name.clone(),
            body,
        ))
    }

    fn should_index(&self, record: &SourceRecord) -> bool {
        record.str_field("category") == Some(READING_LIST_CATEGORY)
            && record.str_field("reactable_type") == Some(ARTICLE_REACTABLE)
    }

    fn index_filters(&self) -> Vec<FieldFilter> {
        vec![
            FieldFilter::equals("category", READING_LIST_CATEGORY),
            FieldFilter::equals("reactable_type", ARTICLE_REACTABLE),
        ]
    }

    async fn custom_count(&self, store: &dyn RecordStore) -> Result<Option<u64>, SyncError> {
        let count = store
            .count_matching(EntityType::Reaction, &self.index_filters())
            .await?;
        Ok(Some(count))
    }
}
