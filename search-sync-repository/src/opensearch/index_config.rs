//! OpenSearch index naming and creation settings.
//!
//! Workers address every index through an alias. The physical index behind
//! an alias carries a version suffix so it can be rebuilt and swapped without
//! touching writers.

use serde_json::{json, Value};

/// Naming configuration shared by every index the pipeline writes to.
#[derive(Debug, Clone, Default)]
pub struct IndexConfig {
    /// Optional deployment environment appended to every alias
    /// (e.g. `articles_production`).
    pub environment: Option<String>,
    /// The version number of the physical indexes (e.g., 0 for "articles_v0").
    pub version: u32,
}

impl IndexConfig {
    /// Create a new index configuration.
    ///
    /// # Arguments
    ///
    /// * `environment` - Optional alias suffix; empty strings are ignored
    /// * `version` - The version number
    pub fn new(environment: Option<String>, version: u32) -> Self {
        Self {
            environment: environment.filter(|e| !e.is_empty()),
            version,
        }
    }

    /// Alias for an index base name, e.g. `articles` or `articles_production`.
    pub fn alias(&self, base_name: &str) -> String {
        match &self.environment {
            Some(env) => format!("{}_{}", base_name, env),
            None => base_name.to_string(),
        }
    }

    /// Physical index name behind an alias, e.g. `articles_v0`.
    pub fn versioned_index_name(&self, alias: &str) -> String {
        format!("{}_v{}", alias, self.version)
    }
}

/// Creation body for the physical index behind `alias`.
///
/// Field mappings are left dynamic; only sharding and the alias itself are
/// declared.
///
/// # Sharding Configuration
///
/// - 1 primary shard
/// - 1 replica for redundancy
pub fn get_index_settings(alias: &str) -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "aliases": {
            alias: {}
        }
    })
}
