//! Configuration and dependency initialization.
//!
//! Settings come from environment variables (a `.env` file is loaded by the
//! binary). Every variable has a default; a value that does not parse falls
//! back to the default with a warning.

mod dependencies;

pub use dependencies::Dependencies;

use rdkafka::config::ClientConfig;
use search_sync_repository::opensearch::IndexConfig;
use search_sync_shared::QueuePriority;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::queue::{DEFAULT_LOCK_TTL_SECS, DEFAULT_MAX_BACKOFF_SECS};

const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;
const DEFAULT_DATABASE_URL: &str = "postgres://localhost/forem";
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";
const DEFAULT_KAFKA_GROUP_ID: &str = "search-sync";
const DEFAULT_KAFKA_CLIENT_ID: &str = "search-sync";
const DEFAULT_TOPIC_PREFIX: &str = "search_sync";
const DEFAULT_RECONCILIATION_INTERVAL_SECS: u64 = 3600;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection at a fixed interval until successful.
    Retry,
}

impl ConnectionMode {
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "retry".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Kafka connection and topic settings.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub broker: String,
    pub group_id: String,
    pub client_id: String,
    pub topic_prefix: String,
    /// Tiers this process consumes.
    pub tiers: Vec<QueuePriority>,
    /// SASL username (enables SASL/SSL if set)
    pub username: Option<String>,
    pub password: Option<String>,
    /// Custom CA certificate in PEM format
    pub ssl_ca_pem: Option<String>,
}

impl KafkaConfig {
    /// Base client settings shared by the producer and the consumer.
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", &self.broker);

        // SASL/SSL for managed Kafka, plaintext for local development.
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            client_config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password);

            if let Some(ca_pem) = &self.ssl_ca_pem {
                client_config.set("ssl.ca.pem", ca_pem);
            }
        }

        client_config
    }
}

/// Everything the service needs to start.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub opensearch_url: String,
    pub connection_mode: ConnectionMode,
    pub opensearch_retry_interval: Duration,
    pub index: IndexConfig,
    pub database_url: String,
    pub database_max_connections: u32,
    pub kafka: KafkaConfig,
    /// `None` disables the reconciliation scheduler.
    pub reconciliation_interval: Option<Duration>,
    pub unique_lock_ttl: Duration,
    pub max_retry_backoff: Duration,
}

impl SyncConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    /// - `INDEX_ENVIRONMENT`: Optional suffix for every index alias
    /// - `INDEX_VERSION`: Physical index version number (default: 0)
    /// - `DATABASE_URL`: PostgreSQL URL (default: postgres://localhost/forem)
    /// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_GROUP_ID`: Consumer group ID (default: search-sync)
    /// - `KAFKA_CLIENT_ID`: Producer client ID (default: search-sync)
    /// - `KAFKA_TOPIC_PREFIX`: Topic prefix (default: search_sync)
    /// - `SYNC_QUEUES`: Comma separated tiers to consume (default: all three)
    /// - `KAFKA_USERNAME`, `KAFKA_PASSWORD`, `KAFKA_SSL_CA_PEM`: Optional SASL/SSL settings
    /// - `RECONCILIATION_INTERVAL_SECS`: Scheduler period, 0 disables (default: 3600)
    /// - `UNIQUE_LOCK_TTL_SECS`: Dedup lock lifetime (default: 600)
    /// - `MAX_RETRY_BACKOFF_SECS`: Longest retry delay (default: 600)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let reconciliation_secs = parse_or(
            "RECONCILIATION_INTERVAL_SECS",
            lookup("RECONCILIATION_INTERVAL_SECS"),
            DEFAULT_RECONCILIATION_INTERVAL_SECS,
        );

        Self {
            opensearch_url: string("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            connection_mode: ConnectionMode::parse(lookup("OPENSEARCH_CONNECTION_MODE")),
            opensearch_retry_interval: Duration::from_secs(parse_or(
                "OPENSEARCH_RETRY_INTERVAL_SECS",
                lookup("OPENSEARCH_RETRY_INTERVAL_SECS"),
                DEFAULT_RETRY_INTERVAL_SECS,
            )),
            index: IndexConfig::new(
                lookup("INDEX_ENVIRONMENT"),
                parse_or("INDEX_VERSION", lookup("INDEX_VERSION"), 0),
            ),
            database_url: string("DATABASE_URL", DEFAULT_DATABASE_URL),
            database_max_connections: parse_or(
                "DATABASE_MAX_CONNECTIONS",
                lookup("DATABASE_MAX_CONNECTIONS"),
                DEFAULT_DATABASE_MAX_CONNECTIONS,
            ),
            kafka: KafkaConfig {
                broker: string("KAFKA_BROKER", DEFAULT_KAFKA_BROKER),
                group_id: string("KAFKA_GROUP_ID", DEFAULT_KAFKA_GROUP_ID),
                client_id: string("KAFKA_CLIENT_ID", DEFAULT_KAFKA_CLIENT_ID),
                topic_prefix: string("KAFKA_TOPIC_PREFIX", DEFAULT_TOPIC_PREFIX),
                tiers: parse_tiers(lookup("SYNC_QUEUES")),
                username: lookup("KAFKA_USERNAME"),
                password: lookup("KAFKA_PASSWORD"),
                ssl_ca_pem: lookup("KAFKA_SSL_CA_PEM"),
            },
            reconciliation_interval: (reconciliation_secs > 0)
                .then(|| Duration::from_secs(reconciliation_secs)),
            unique_lock_ttl: Duration::from_secs(parse_or(
                "UNIQUE_LOCK_TTL_SECS",
                lookup("UNIQUE_LOCK_TTL_SECS"),
                DEFAULT_LOCK_TTL_SECS,
            )),
            max_retry_backoff: Duration::from_secs(parse_or(
                "MAX_RETRY_BACKOFF_SECS",
                lookup("MAX_RETRY_BACKOFF_SECS"),
                DEFAULT_MAX_BACKOFF_SECS,
            )),
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(name: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(variable = name, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
    }
}

/// Parse `SYNC_QUEUES`, e.g. `high_priority,medium_priority`.
fn parse_tiers(value: Option<String>) -> Vec<QueuePriority> {
    let Some(raw) = value else {
        return QueuePriority::ALL.to_vec();
    };

    let tiers: Vec<QueuePriority> = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| {
            let tier = QueuePriority::ALL.into_iter().find(|t| t.as_str() == name);
            if tier.is_none() {
                warn!(queue = name, "Ignoring unknown queue in SYNC_QUEUES");
            }
            tier
        })
        .collect();

    if tiers.is_empty() {
        warn!("SYNC_QUEUES names no known queue, consuming all tiers");
        return QueuePriority::ALL.to_vec();
    }
    tiers
}
