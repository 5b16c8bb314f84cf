//! # Search Sync
//!
//! Keeps the Forem search indexes in step with the PostgreSQL system of
//! record. Application writes enqueue sync jobs on Kafka; this service runs
//! them against OpenSearch.
//!
//! ## Architecture
//!
//! 1. **Queue**: Sync jobs on one Kafka topic per priority tier
//! 2. **Dispatcher**: Routes each job to its worker
//! 3. **Workers**: Upsert, bulk upsert, delete and reconcile documents
//! 4. **Adapters**: Describe how each entity type becomes a document
//! 5. **Orchestrator**: Drives the flow, retries and schedules reconciliation
//!
//! ## Modules
//!
//! - [`adapters`]: Per-entity-type index adapters and the registry
//! - [`config`]: Configuration and dependency initialization
//! - [`dispatcher`]: Job routing
//! - [`errors`]: Error types for workers and the queue
//! - [`metrics`]: Metric sink
//! - [`orchestrator`]: Coordinates the job flow
//! - [`queue`]: Kafka queue, enqueue client, retry policy and dedup locks
//! - [`workers`]: The sync workers

pub mod adapters;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod metrics;
pub mod orchestrator;
pub mod queue;
pub mod workers;

pub use config::{Dependencies, SyncConfig};
pub use errors::{QueueError, SyncError};

use thiserror::Error;

/// Errors that can occur during service initialization or execution.
#[derive(Error, Debug)]
pub enum SearchSyncError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Queue error.
    #[error("Queue error: {0}")]
    QueueError(#[from] QueueError),
}

impl SearchSyncError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
