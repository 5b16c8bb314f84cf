//! Utility functions for the search sync repository.

/// Check that a name is safe to splice into SQL or an index path.
///
/// Table names, column names and index aliases are never bound as
/// parameters, so they must contain only ASCII alphanumerics and underscores
/// and must not be empty.
///
/// # Example
///
/// ```
/// use search_sync_repository::utils::is_safe_identifier;
///
/// assert!(is_safe_identifier("cached_tag_list"));
/// assert!(!is_safe_identifier("title; DROP TABLE articles"));
/// ```
pub fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
