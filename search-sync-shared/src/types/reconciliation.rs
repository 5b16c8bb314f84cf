//! Reconciliation measurements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::entity_type::EntityType;

/// One comparison of store and index counts for an entity type.
///
/// Samples are emitted to the metrics sink and then dropped; nothing stores
/// them. A non-zero drift within normal sync latency is expected and left to
/// whoever consumes the metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSample {
    pub entity_type: EntityType,
    pub db_count: u64,
    pub index_count: u64,
    pub measured_at: DateTime<Utc>,
}

impl ReconciliationSample {
    pub fn new(entity_type: EntityType, db_count: u64, index_count: u64) -> Self {
        Self {
            entity_type,
            db_count,
            index_count,
            measured_at: Utc::now(),
        }
    }

    /// `db_count - index_count`; negative when the index holds extra documents.
    pub fn drift(&self) -> i64 {
        self.db_count as i64 - self.index_count as i64
    }
}
