use async_trait::async_trait;
use search_sync_repository::opensearch::IndexConfig;
use search_sync_shared::{EntityType, IndexDocument, SourceRecord};
use serde_json::{json, Map};

use crate::adapters::{copy_field, required_str, Indexable};
use crate::errors::SyncError;

/// Indexes every tag.
pub struct TagAdapter {
    index_name: String,
}

impl TagAdapter {
    pub const BASE_INDEX: &'static str = "tags";

    pub fn new(index_config: &IndexConfig) -> Self {
        Self {
            index_name: index_config.alias(Self::BASE_INDEX),
        }
    }
}

#[async_trait]
impl Indexable for TagAdapter {
    fn entity_type(&self) -> EntityType {
        EntityType::Tag
    }

    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn serialize(&self, record: &SourceRecord) -> Result<IndexDocument, SyncError> {
        let name = required_str(record, "name")?;

        let mut body = Map::new();
        body.insert("name".to_string(), json!(name));
        body.insert(
            "hotness_score".to_string(),
            json!(record.i64_field("hotness_score").unwrap_or(0)),
        );
        body.insert(
            "supported".to_string(),
            json!(record.bool_field("supported").unwrap_or(false)),
        );
        copy_field(&mut body, record, "short_summary");
        body.insert(
            "taggings_count".to_string(),
            json!(record.i64_field("taggings_count").unwrap_or(0)),
        );
        body.insert("class_name".to_string(), json!("Tag"));

        Ok(IndexDocument::new(
            self.document_id(record),
            self.index_name.clone(),
            body,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sync_shared::RecordId;

    #[test]
    fn test_serialize_tag() {
        let adapter = TagAdapter::new(&IndexConfig::default());
        let fields = json!({ "id": 3, "name": "rust", "supported": true, "taggings_count": 12 });
        let record = SourceRecord::new(EntityType::Tag, RecordId::Int(3), fields.as_object().cloned().unwrap());

        let doc = adapter.serialize(&record).unwrap();
        assert_eq!(doc.id, "3");
        assert_eq!(doc.index, "tags");
        assert_eq!(doc.body["name"], "rust");
        assert_eq!(doc.body["supported"], true);
        assert_eq!(doc.body["hotness_score"], 0);
        assert!(doc.body["short_summary"].is_null());
    }

    #[test]
    fn test_missing_name() {
        let adapter = TagAdapter::new(&IndexConfig::default());
        let record = SourceRecord::new(EntityType::Tag, RecordId::Int(3), Map::new());
        assert!(adapter.serialize(&record).is_err());
    }
}
