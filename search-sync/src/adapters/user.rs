use async_trait::async_trait;
use search_sync_repository::opensearch::IndexConfig;
use search_sync_shared::{EntityType, IndexDocument, SourceRecord};
use serde_json::{json, Map};

use crate::adapters::{copy_field, required_str, Indexable};
use crate::errors::SyncError;

/// Profile fields folded into the keyword field, in order.
const KEYWORD_FIELDS: [&str; 3] = ["employer_name", "mostly_work_with", "available_for"];

/// Indexes every user.
pub struct UserAdapter {
    index_name: String,
}

impl UserAdapter {
    pub const BASE_INDEX: &'static str = "users";

    pub fn new(index_config: &IndexConfig) -> Self {
        Self {
            index_name: index_config.alias(Self::BASE_INDEX),
        }
    }

    fn tag_keywords_for_search(record: &SourceRecord) -> String {
        KEYWORD_FIELDS
            .iter()
            .filter_map(|field| record.str_field(field))
            .collect::<String>()
    }

    fn search_score(record: &SourceRecord, keywords: &str) -> i64 {
        let activity = record.i64_field("articles_count").unwrap_or(0)
            + record.i64_field("comments_count").unwrap_or(0)
            + record.i64_field("reactions_count").unwrap_or(0);
        let reputation = record.f64_field("reputation_modifier").unwrap_or(1.0);
        let followers = record.i64_field("followers_count").unwrap_or(0);

        let base = activity * 10 + keywords.chars().count() as i64;
        (base as f64 * reputation * followers as f64) as i64
    }
}

#[async_trait]
impl Indexable for UserAdapter {
    fn entity_type(&self) -> EntityType {
        EntityType::User
    }

    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn serialize(&self, record: &SourceRecord) -> Result<IndexDocument, SyncError> {
        let username = required_str(record, "username")?;
        let keywords = Self::tag_keywords_for_search(record);

        let mut body = Map::new();
        body.insert("username".to_string(), json!(username));
        copy_field(&mut body, record, "name");
        body.insert(
            "profile_image_90".to_string(),
            json!(record.str_field("profile_image")),
        );
        body.insert(
            "search_score".to_string(),
            json!(Self::search_score(record, &keywords)),
        );
        body.insert("tag_keywords_for_search".to_string(), json!(keywords));
        body.insert("class_name".to_string(), json!("User"));

        Ok(IndexDocument::new(
            self.document_id(record),
            self.index_name.clone(),
            body,
        ))
    }
}
