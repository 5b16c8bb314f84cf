//! # Search Sync Repository
//!
//! This crate provides traits and implementations for the two external
//! stores the sync pipeline talks to: the search index (OpenSearch) and the
//! system of record (PostgreSQL). It includes definitions for errors,
//! interfaces, and the concrete backends.

pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod postgres;
pub mod types;
pub mod utils;

pub use errors::{RecordStoreError, SearchIndexError};
pub use interfaces::{RecordStore, SearchIndexProvider};
pub use opensearch::OpenSearchProvider;
pub use postgres::PostgresRecordStore;
pub use types::{BatchOperationResult, BatchOperationSummary, FieldFilter, FilterOp};
