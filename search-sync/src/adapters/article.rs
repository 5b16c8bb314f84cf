use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use search_sync_repository::opensearch::IndexConfig;
use search_sync_repository::{FieldFilter, RecordStore};
use search_sync_shared::{EntityType, IndexDocument, RecordId, SourceRecord};
use serde_json::{json, Map, Value};

use crate::adapters::{copy_field, required_str, split_tag_list, truncate_chars, Indexable};
use crate::errors::SyncError;

/// Articles tagged with this are job listings and stay out of search.
const EXCLUDED_TAG: &str = "hiring";

/// Longest `body_text` written to the index, in characters.
const BODY_TEXT_LIMIT: usize = 7000;

/// Field the author's reputation modifier is copied into when an article is
/// loaded.
const AUTHOR_REPUTATION_FIELD: &str = "user_reputation_modifier";

/// Indexes published articles.
pub struct ArticleAdapter {
    index_name: String,
}

impl ArticleAdapter {
    pub const BASE_INDEX: &'static str = "articles";

    pub fn new(index_config: &IndexConfig) -> Self {
        Self {
            index_name: index_config.alias(Self::BASE_INDEX),
        }
    }

    fn tag_list(record: &SourceRecord) -> Vec<String> {
        record
            .str_field("cached_tag_list")
            .map(split_tag_list)
            .unwrap_or_default()
    }

    /// `hotness_score + comments * 3 + positive reactions * 300 * author
    /// reputation`, truncated toward zero.
    fn search_score(record: &SourceRecord) -> i64 {
        let hotness = record.i64_field("hotness_score").unwrap_or(0);
        let comments = record.i64_field("comments_count").unwrap_or(0);
        let reactions = record.i64_field("positive_reactions_count").unwrap_or(0);
        let reputation = record.f64_field(AUTHOR_REPUTATION_FIELD).unwrap_or(1.0);
        (hotness as f64 + (comments * 3) as f64 + reactions as f64 * 300.0 * reputation) as i64
    }

    /// Copy each author's `reputation_modifier` onto their articles, with one
    /// store round trip for the whole slice.
    async fn attach_authors(
        store: &dyn RecordStore,
        records: &mut [SourceRecord],
    ) -> Result<(), SyncError> {
        let mut seen = HashSet::new();
        let author_ids: Vec<RecordId> = records
            .iter()
            .filter_map(|record| record.field("user_id").and_then(RecordId::from_json))
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if author_ids.is_empty() {
            return Ok(());
        }

        let modifiers: HashMap<RecordId, Value> = store
            .find_many_by_id(EntityType::User, &author_ids)
            .await?
            .into_iter()
            .filter_map(|author| {
                let modifier = author.field("reputation_modifier").cloned()?;
                Some((author.id, modifier))
            })
            .collect();

        for record in records.iter_mut() {
            let modifier = record
                .field("user_id")
                .and_then(RecordId::from_json)
                .and_then(|id| modifiers.get(&id).cloned());
            if let Some(modifier) = modifier {
                record
                    .fields
                    .insert(AUTHOR_REPUTATION_FIELD.to_string(), modifier);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Indexable for ArticleAdapter {
    fn entity_type(&self) -> EntityType {
        EntityType::Article
    }

    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn serialize(&self, record: &SourceRecord) -> Result<IndexDocument, SyncError> {
        let title = required_str(record, "title")?;
        let path = required_str(record, "path")?;
        let body_text = record
            .str_field("body_markdown")
            .map(|body| truncate_chars(body, BODY_TEXT_LIMIT))
            .unwrap_or_default();

        let mut body = Map::new();
        body.insert("title".to_string(), json!(title));
        body.insert("path".to_string(), json!(path));
        body.insert("tag_list".to_string(), json!(Self::tag_list(record)));
        body.insert("body_text".to_string(), json!(body_text));
        copy_field(&mut body, record, "user_id");
        body.insert(
            "user_name".to_string(),
            json!(record.str_field("cached_user_name")),
        );
        body.insert(
            "user_username".to_string(),
            json!(record.str_field("cached_user_username")),
        );
        copy_field(&mut body, record, "published_at");
        body.insert(
            "comments_count".to_string(),
            json!(record.i64_field("comments_count").unwrap_or(0)),
        );
        body.insert(
            "positive_reactions_count".to_string(),
            json!(record.i64_field("positive_reactions_count").unwrap_or(0)),
        );
        body.insert(
            "hotness_score".to_string(),
            json!(record.i64_field("hotness_score").unwrap_or(0)),
        );
        body.insert("search_score".to_string(), json!(Self::search_score(record)));
        body.insert("class_name".to_string(), json!("Article"));

        Ok(IndexDocument::new(
            self.document_id(record),
            self.index_name.clone(),
            body,
        ))
    }

    fn should_index(&self, record: &SourceRecord) -> bool {
        record.bool_field("published").unwrap_or(false)
            && !Self::tag_list(record).iter().any(|tag| tag == EXCLUDED_TAG)
    }

    // The store filter is a substring match, so it also drops tags that merely
    // contain "hiring". Reconciliation tolerates that difference.
    fn index_filters(&self) -> Vec<FieldFilter> {
        vec![
            FieldFilter::equals("published", true),
            FieldFilter::not_containing("cached_tag_list", EXCLUDED_TAG),
        ]
    }

    async fn find(
        &self,
        store: &dyn RecordStore,
        id: &RecordId,
    ) -> Result<Option<SourceRecord>, SyncError> {
        let Some(mut record) = store.find_by_id(EntityType::Article, id).await? else {
            return Ok(None);
        };
        Self::attach_authors(store, std::slice::from_mut(&mut record)).await?;
        Ok(Some(record))
    }

    async fn eager_load(
        &self,
        store: &dyn RecordStore,
        ids: &[RecordId],
    ) -> Result<Vec<SourceRecord>, SyncError> {
        let mut records = store.find_many_by_id(EntityType::Article, ids).await?;
        Self::attach_authors(store, &mut records).await?;
        Ok(records)
    }

    async fn custom_count(&self, store: &dyn RecordStore) -> Result<Option<u64>, SyncError> {
        let count = store
            .count_matching(EntityType::Article, &self.index_filters())
            .await?;
        Ok(Some(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article(fields: Value) -> SourceRecord {
        let fields = match fields {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        SourceRecord::new(EntityType::Article, RecordId::Int(42), fields)
    }

    fn published_article() -> SourceRecord {
        article(json!({
            "id": 42,
            "title": "Understanding lifetimes",
            "path": "/ana/understanding-lifetimes",
            "published": true,
            "cached_tag_list": "rust, beginners",
            "body_markdown": "Borrowing is...",
            "user_id": 7,
            "cached_user_name": "Ana",
            "cached_user_username": "ana",
            "published_at": "2024-03-01T10:00:00Z",
            "comments_count": 4,
            "positive_reactions_count": 2,
            "hotness_score": 100
        }))
    }

    #[test]
    fn test_serialize_published_article() {
        let adapter = ArticleAdapter::new(&IndexConfig::default());
        let doc = adapter.serialize(&published_article()).unwrap();

        assert_eq!(doc.id, "42");
        assert_eq!(doc.index, "articles");
        assert_eq!(doc.body["title"], "Understanding lifetimes");
        assert_eq!(doc.body["tag_list"], json!(["rust", "beginners"]));
        assert_eq!(doc.body["user_username"], "ana");
        assert_eq!(doc.body["search_score"], 100 + 4 * 3 + 2 * 300);
        assert_eq!(doc.body["class_name"], "Article");
    }

    #[test]
    fn test_reactions_weighted_by_author_reputation() {
        let adapter = ArticleAdapter::new(&IndexConfig::default());
        let mut record = published_article();
        record
            .fields
            .insert(AUTHOR_REPUTATION_FIELD.to_string(), json!(1.5));

        let doc = adapter.serialize(&record).unwrap();
        assert_eq!(doc.body["search_score"], 100 + 4 * 3 + 900);

        record
            .fields
            .insert(AUTHOR_REPUTATION_FIELD.to_string(), json!(0.25));
        let doc = adapter.serialize(&record).unwrap();
        // 100 + 12 + 150
        assert_eq!(doc.body["search_score"], 262);
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let adapter = ArticleAdapter::new(&IndexConfig::default());
        let record = published_article();
        assert_eq!(
            adapter.serialize(&record).unwrap(),
            adapter.serialize(&record).unwrap()
        );
    }

    #[test]
    fn test_body_text_is_truncated() {
        let adapter = ArticleAdapter::new(&IndexConfig::default());
        let mut record = published_article();
        record
            .fields
            .insert("body_markdown".to_string(), json!("é".repeat(BODY_TEXT_LIMIT + 10)));

        let doc = adapter.serialize(&record).unwrap();
        let body_text = doc.body["body_text"].as_str().unwrap();
        assert_eq!(body_text.chars().count(), BODY_TEXT_LIMIT);
    }

    #[test]
    fn test_missing_title_is_a_serialization_error() {
        let adapter = ArticleAdapter::new(&IndexConfig::default());
        let record = article(json!({ "id": 42, "path": "/x" }));

        assert!(matches!(
            adapter.serialize(&record),
            Err(SyncError::Serialization { entity_type: EntityType::Article, .. })
        ));
    }

    #[test]
    fn test_should_index() {
        let adapter = ArticleAdapter::new(&IndexConfig::default());
        assert!(adapter.should_index(&published_article()));

        let mut draft = published_article();
        draft.fields.insert("published".to_string(), json!(false));
        assert!(!adapter.should_index(&draft));

        let mut listing = published_article();
        listing
            .fields
            .insert("cached_tag_list".to_string(), json!("career, hiring"));
        assert!(!adapter.should_index(&listing));
    }

    #[test]
    fn test_environment_alias() {
        let adapter = ArticleAdapter::new(&IndexConfig::new(Some("staging".to_string()), 1));
        assert_eq!(adapter.index_name(), "articles_staging");
    }
}
