//! Request and response types for search index and record store operations.

use serde_json::Value;

use crate::errors::SearchIndexError;

/// Result of a batch operation for a single document.
#[derive(Debug, Clone)]
pub struct BatchOperationResult {
    /// The document's identifier.
    pub document_id: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error if the operation failed.
    pub error: Option<SearchIndexError>,
}

/// Summary of a batch operation containing aggregate statistics and individual results.
///
/// A bulk request can succeed at the transport level while individual items
/// fail; callers inspect `failed` to decide whether the whole batch must be
/// retried.
#[derive(Debug, Clone, Default)]
pub struct BatchOperationSummary {
    /// Total number of items in the batch.
    pub total: usize,
    /// Number of successful operations.
    pub succeeded: usize,
    /// Number of failed operations.
    pub failed: usize,
    /// Individual results for each item.
    pub results: Vec<BatchOperationResult>,
}

impl BatchOperationSummary {
    /// Build a summary from per-item results.
    pub fn from_results(results: Vec<BatchOperationResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// Ids of the documents that failed.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.document_id.as_str())
            .collect()
    }
}

/// Comparison applied to one column when counting records.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Column equals the value (compared in text form).
    Equals(Value),
    /// Column text does not contain the substring (case-insensitive).
    NotContaining(String),
}

/// A column condition used to count only the records an index should hold.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
}

impl FieldFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Equals(value.into()),
        }
    }

    pub fn not_containing(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::NotContaining(needle.into()),
        }
    }

    /// Evaluate the filter against an in-memory column value.
    ///
    /// Mirrors the SQL the PostgreSQL store generates, so in-memory stores
    /// and the real one agree on what matches.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match &self.op {
            FilterOp::Equals(expected) => match value {
                Some(actual) => value_as_text(actual) == value_as_text(expected),
                None => false,
            },
            FilterOp::NotContaining(needle) => {
                let haystack = value.map(value_as_text).unwrap_or_default();
                !haystack.to_lowercase().contains(&needle.to_lowercase())
            }
        }
    }
}

/// Text form of a JSON value as PostgreSQL's `::text` cast would print it.
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_from_results() {
        let summary = BatchOperationSummary::from_results(vec![
            BatchOperationResult {
                document_id: "1".to_string(),
                success: true,
                error: None,
            },
            BatchOperationResult {
                document_id: "2".to_string(),
                success: false,
                error: Some(SearchIndexError::index("mapper_parsing_exception")),
            },
        ]);

        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_ids(), vec!["2"]);
    }

    #[test]
    fn test_equals_filter() {
        let filter = FieldFilter::equals("published", true);
        assert!(filter.matches(Some(&json!(true))));
        assert!(!filter.matches(Some(&json!(false))));
        assert!(!filter.matches(None));

        let filter = FieldFilter::equals("category", "readinglist");
        assert!(filter.matches(Some(&json!("readinglist"))));
        assert!(!filter.matches(Some(&json!("like"))));
    }

    #[test]
    fn test_not_containing_filter() {
        let filter = FieldFilter::not_containing("cached_tag_list", "hiring");
        assert!(filter.matches(Some(&json!("rust, webdev"))));
        assert!(!filter.matches(Some(&json!("rust, Hiring"))));
        assert!(filter.matches(None));
    }
}
