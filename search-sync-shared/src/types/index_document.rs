//! Index document types.
//!
//! This module defines the document structure that is written to the search
//! index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document representation for the search index.
///
/// # Fields
///
/// - `id`: Document ID, always the string form of the source record's id
/// - `index`: Alias of the index the document lives in
/// - `body`: Searchable fields, written as the document `_source`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDocument {
    pub id: String,
    pub index: String,
    pub body: Map<String, Value>,
}

impl IndexDocument {
    /// Create a new document.
    ///
    /// # Example
    ///
    /// ```
    /// use search_sync_shared::IndexDocument;
    /// use serde_json::json;
    ///
    /// let body = json!({ "title": "Hello" }).as_object().cloned().unwrap();
    /// let doc = IndexDocument::new("42", "articles", body);
    /// assert_eq!(doc.id, "42");
    /// ```
    pub fn new(id: impl Into<String>, index: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            index: index.into(),
            body,
        }
    }
}
