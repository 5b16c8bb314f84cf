//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use opensearch::{
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    BulkParts, CountParts, DeleteParts, IndexParts, OpenSearch,
};
use search_sync_shared::IndexDocument;
use serde_json::{json, Value};
use tracing::{debug, error, info};
use url::Url;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::opensearch::index_config::{get_index_settings, IndexConfig};
use crate::types::{BatchOperationResult, BatchOperationSummary};
use crate::utils::is_safe_identifier;

/// OpenSearch provider implementation.
///
/// # Example
///
/// ```ignore
/// use search_sync_repository::opensearch::{IndexConfig, OpenSearchProvider};
///
/// let provider = OpenSearchProvider::new("http://localhost:9200", IndexConfig::default()).await?;
/// provider.ensure_index_exists("articles").await?;
/// provider.upsert_document(&document).await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
    index_config: IndexConfig,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - Naming configuration used when creating indexes
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub async fn new(url: &str, index_config: IndexConfig) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            environment = ?index_config.environment,
            version = index_config.version,
            "Created OpenSearch provider"
        );

        Ok(Self {
            client,
            index_config,
        })
    }

    /// Reject aliases and ids that would produce a malformed request path.
    fn validate_target(alias: &str, document_id: Option<&str>) -> Result<(), SearchIndexError> {
        if !is_safe_identifier(alias) {
            return Err(SearchIndexError::validation(format!(
                "Index alias '{}' contains invalid characters",
                alias
            )));
        }
        if let Some(id) = document_id {
            if id.is_empty() {
                return Err(SearchIndexError::validation("Document id cannot be empty"));
            }
        }
        Ok(())
    }

    /// Build the NDJSON lines of a bulk request: one `index` action per document
    /// followed by its source.
    fn build_bulk_body(documents: &[IndexDocument]) -> Vec<Value> {
        let mut body = Vec::with_capacity(documents.len() * 2);
        for doc in documents {
            body.push(json!({ "index": { "_id": doc.id } }));
            body.push(Value::Object(doc.body.clone()));
        }
        body
    }

    /// Turn a bulk response body into a per-document summary.
    fn parse_bulk_response(response: &Value) -> Result<BatchOperationSummary, SearchIndexError> {
        let items = response["items"]
            .as_array()
            .ok_or_else(|| SearchIndexError::parse("Bulk response has no items array"))?;

        let results = items
            .iter()
            .map(|item| {
                let action = &item["index"];
                let document_id = action["_id"].as_str().unwrap_or_default().to_string();
                let status = action["status"].as_u64().unwrap_or(0);
                let success = (200..300).contains(&status) && action.get("error").is_none();
                let error = if success {
                    None
                } else {
                    let reason = action["error"]["reason"]
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("status {}", status));
                    Some(SearchIndexError::index(reason))
                };
                BatchOperationResult {
                    document_id,
                    success,
                    error,
                }
            })
            .collect();

        Ok(BatchOperationSummary::from_results(results))
    }

    fn parse_count_response(response: &Value) -> Result<u64, SearchIndexError> {
        response["count"]
            .as_u64()
            .ok_or_else(|| SearchIndexError::parse("Count response has no numeric count"))
    }
}

#[async_trait]
impl SearchIndexProvider for OpenSearchProvider {
    /// Ensure the alias resolves, creating `<alias>_v<version>` with the alias
    /// attached if it does not.
    ///
    /// A concurrent creation by another worker process is not an error.
    async fn ensure_index_exists(&self, alias: &str) -> Result<(), SearchIndexError> {
        Self::validate_target(alias, None)?;

        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[alias]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if response.status_code().is_success() {
            debug!(alias = %alias, "Index alias already exists");
            return Ok(());
        }

        let index_name = self.index_config.versioned_index_name(alias);
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&index_name))
            .body(get_index_settings(alias))
            .send()
            .await
            .map_err(|e| SearchIndexError::index_creation(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            if error_body.contains("resource_already_exists_exception") {
                debug!(index = %index_name, "Index created concurrently");
                return Ok(());
            }
            error!(status = %status, body = %error_body, "Create index request failed");
            return Err(SearchIndexError::index_creation(format!(
                "Create index {} failed with status {}: {}",
                index_name, status, error_body
            )));
        }

        info!(index = %index_name, alias = %alias, "Created search index");
        Ok(())
    }

    /// Write the full document with the index API; any previous version of the
    /// document is replaced (last write wins).
    async fn upsert_document(&self, document: &IndexDocument) -> Result<(), SearchIndexError> {
        Self::validate_target(&document.index, Some(&document.id))?;

        let response = self
            .client
            .index(IndexParts::IndexId(&document.index, &document.id))
            .body(Value::Object(document.body.clone()))
            .send()
            .await
            .map_err(|e| SearchIndexError::index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Index request failed");
            return Err(SearchIndexError::index(format!(
                "Index failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(index = %document.index, doc_id = %document.id, "Document upserted");
        Ok(())
    }

    async fn bulk_upsert_documents(
        &self,
        alias: &str,
        documents: &[IndexDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        Self::validate_target(alias, None)?;

        if documents.is_empty() {
            return Ok(BatchOperationSummary::default());
        }

        let body: Vec<JsonBody<Value>> = Self::build_bulk_body(documents)
            .into_iter()
            .map(JsonBody::from)
            .collect();

        let response = self
            .client
            .bulk(BulkParts::Index(alias))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::bulk_index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(SearchIndexError::bulk_index(format!(
                "Bulk request failed with status {}: {}",
                status, error_body
            )));
        }

        let response_body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;
        let summary = Self::parse_bulk_response(&response_body)?;

        debug!(
            alias = %alias,
            total = summary.total,
            failed = summary.failed,
            "Bulk upsert completed"
        );
        Ok(summary)
    }

    /// Delete one document. A 404 (missing document or missing index) is
    /// reported as `DocumentNotFound` so callers can apply their own policy.
    async fn delete_document(
        &self,
        alias: &str,
        document_id: &str,
    ) -> Result<(), SearchIndexError> {
        Self::validate_target(alias, Some(document_id))?;

        let response = self
            .client
            .delete(DeleteParts::IndexId(alias, document_id))
            .send()
            .await
            .map_err(|e| SearchIndexError::delete(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Err(SearchIndexError::document_not_found(alias, document_id));
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Delete request failed");
            return Err(SearchIndexError::delete(format!(
                "Delete failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(alias = %alias, doc_id = %document_id, "Document deleted");
        Ok(())
    }

    async fn count_documents(&self, alias: &str) -> Result<u64, SearchIndexError> {
        Self::validate_target(alias, None)?;

        let response = self
            .client
            .count(CountParts::Index(&[alias]))
            .send()
            .await
            .map_err(|e| SearchIndexError::count(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Count request failed");
            return Err(SearchIndexError::count(format!(
                "Count failed with status {}: {}",
                status, error_body
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;
        Self::parse_count_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, title: &str) -> IndexDocument {
        IndexDocument::new(
            id,
            "articles",
            json!({ "title": title }).as_object().cloned().unwrap(),
        )
    }

    #[test]
    fn test_validate_target() {
        assert!(OpenSearchProvider::validate_target("articles", Some("42")).is_ok());
        assert!(OpenSearchProvider::validate_target("articles_production", None).is_ok());

        let err = OpenSearchProvider::validate_target("articles/_doc", None).unwrap_err();
        assert!(matches!(err, SearchIndexError::ValidationError(_)));

        let err = OpenSearchProvider::validate_target("articles", Some("")).unwrap_err();
        assert!(matches!(err, SearchIndexError::ValidationError(_)));
    }

    #[test]
    fn test_build_bulk_body_pairs_action_and_source() {
        let body = OpenSearchProvider::build_bulk_body(&[doc("1", "One"), doc("3", "Three")]);

        assert_eq!(body.len(), 4);
        assert_eq!(body[0], json!({ "index": { "_id": "1" } }));
        assert_eq!(body[1], json!({ "title": "One" }));
        assert_eq!(body[2], json!({ "index": { "_id": "3" } }));
        assert_eq!(body[3], json!({ "title": "Three" }));
    }

    #[test]
    fn test_parse_bulk_response_all_succeeded() {
        let response = json!({
            "took": 3,
            "errors": false,
            "items": [
                { "index": { "_id": "1", "status": 201 } },
                { "index": { "_id": "3", "status": 200 } }
            ]
        });

        let summary = OpenSearchProvider::parse_bulk_response(&response).unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn test_parse_bulk_response_partial_failure() {
        let response = json!({
            "errors": true,
            "items": [
                { "index": { "_id": "1", "status": 201 } },
                { "index": {
                    "_id": "2",
                    "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": "failed to parse field [published_at]" }
                } }
            ]
        });

        let summary = OpenSearchProvider::parse_bulk_response(&response).unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_ids(), vec!["2"]);
        let err = summary.results[1].error.as_ref().unwrap();
        assert!(err.to_string().contains("failed to parse field"));
    }

    #[test]
    fn test_parse_bulk_response_without_items() {
        let result = OpenSearchProvider::parse_bulk_response(&json!({ "errors": false }));
        assert!(matches!(result, Err(SearchIndexError::ParseError(_))));
    }

    #[test]
    fn test_parse_count_response() {
        assert_eq!(
            OpenSearchProvider::parse_count_response(&json!({ "count": 115 })).unwrap(),
            115
        );
        assert!(OpenSearchProvider::parse_count_response(&json!({})).is_err());
    }
}
