//! Metric emission.
//!
//! Workers report gauges through a `MetricsSink`. Emission is fire-and-forget:
//! a failing sink is logged and never fails the job that reported to it.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

/// Reconciliation gauge names.
pub const RECONCILIATION_DB_COUNT: &str = "search.reconciliation.db_count";
pub const RECONCILIATION_INDEX_COUNT: &str = "search.reconciliation.index_count";
pub const RECONCILIATION_DRIFT: &str = "search.reconciliation.drift";

/// A single gauge reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: i64,
    pub tags: BTreeMap<String, String>,
}

impl Metric {
    pub fn gauge(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Error, Debug)]
#[error("Metrics sink error: {0}")]
pub struct MetricsError(pub String);

/// Destination for metrics.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, metric: &Metric) -> Result<(), MetricsError>;
}

/// Emit a metric, logging instead of failing when the sink errors.
pub fn emit_or_log(sink: &dyn MetricsSink, metric: &Metric) {
    if let Err(e) = sink.emit(metric) {
        warn!(metric = %metric.name, error = %e, "Failed to emit metric");
    }
}

/// Writes each metric as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn emit(&self, metric: &Metric) -> Result<(), MetricsError> {
        info!(
            target: "search_sync::metrics",
            metric = %metric.name,
            value = metric.value,
            tags = ?metric.tags,
            "metric"
        );
        Ok(())
    }
}
