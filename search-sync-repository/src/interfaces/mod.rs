//! Interfaces for the search index and the record store.
//!
//! Workers are written against these traits; tests swap in in-memory
//! implementations.

mod record_store;
mod search_index_provider;

pub use record_store::RecordStore;
pub use search_index_provider::SearchIndexProvider;
