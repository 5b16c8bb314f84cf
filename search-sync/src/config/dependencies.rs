//! Dependency initialization and wiring for the sync service.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use search_sync_repository::opensearch::IndexConfig;
use search_sync_repository::{OpenSearchProvider, PostgresRecordStore, SearchIndexProvider};

use crate::adapters::AdapterRegistry;
use crate::config::{ConnectionMode, SyncConfig};
use crate::dispatcher::JobDispatcher;
use crate::metrics::TracingMetricsSink;
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::queue::{KafkaJobConsumer, KafkaJobQueue, RetryPolicy, SearchSyncClient, UniqueJobLocks};
use crate::workers::{WorkerConfig, WorkerContext};
use crate::SearchSyncError;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
    /// Enqueue API sharing the orchestrator's queue and locks.
    pub client: SearchSyncClient,
}

impl Dependencies {
    /// Initialize all dependencies from the given configuration.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(SearchSyncError)` - If initialization fails (OpenSearch only in fail-fast mode)
    pub async fn new(config: SyncConfig) -> Result<Self, SearchSyncError> {
        info!(
            opensearch_url = %config.opensearch_url,
            kafka_broker = %config.kafka.broker,
            kafka_group_id = %config.kafka.group_id,
            tiers = ?config.kafka.tiers,
            connection_mode = ?config.connection_mode,
            index_environment = ?config.index.environment,
            index_version = config.index.version,
            "Initializing dependencies"
        );

        let registry = Arc::new(AdapterRegistry::standard(&config.index));

        // Exits in fail-fast mode if an index and its alias cannot be created.
        let search_provider = Self::connect_to_opensearch(
            &config.opensearch_url,
            config.index.clone(),
            &registry.aliases(),
            config.connection_mode,
            config.opensearch_retry_interval,
        )
        .await?;

        info!("OpenSearch connection established and indexes ready");

        let store = PostgresRecordStore::connect(&config.database_url, config.database_max_connections)
            .await
            .map_err(|e| SearchSyncError::config(format!("Failed to connect to PostgreSQL: {}", e)))?;

        let queue = KafkaJobQueue::new(&config.kafka).map_err(|e| {
            SearchSyncError::config(format!("Failed to create Kafka producer: {}", e))
        })?;
        let consumer = KafkaJobConsumer::new(&config.kafka).map_err(|e| {
            SearchSyncError::config(format!("Failed to create Kafka consumer: {}", e))
        })?;

        info!("Kafka producer and consumer created");

        let workers = WorkerConfig::default();
        // The orchestrator below releases these locks, so this client may
        // deduplicate against them.
        let client = SearchSyncClient::new(Arc::new(queue), workers)
            .with_shared_locks(Arc::new(UniqueJobLocks::new(config.unique_lock_ttl)));

        let ctx = WorkerContext::new(registry, Arc::new(store), Arc::new(search_provider));
        let dispatcher = JobDispatcher::new(ctx, Arc::new(TracingMetricsSink), workers);

        let orchestrator = Orchestrator::with_config(
            Arc::new(consumer),
            dispatcher,
            client.clone(),
            RetryPolicy::new(config.max_retry_backoff),
            OrchestratorConfig {
                reconciliation_interval: config.reconciliation_interval,
                ..OrchestratorConfig::default()
            },
        );

        Ok(Self {
            orchestrator,
            client,
        })
    }

    /// Connect to OpenSearch and ensure every index exists, with retry logic
    /// based on connection mode.
    async fn connect_to_opensearch(
        url: &str,
        index_config: IndexConfig,
        aliases: &[String],
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchProvider, SearchSyncError> {
        loop {
            match Self::try_connect_opensearch(url, index_config.clone(), aliases).await {
                Ok(provider) => return Ok(provider),
                Err(e) => match mode {
                    ConnectionMode::FailFast => return Err(e),
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    async fn try_connect_opensearch(
        url: &str,
        index_config: IndexConfig,
        aliases: &[String],
    ) -> Result<OpenSearchProvider, SearchSyncError> {
        let provider = OpenSearchProvider::new(url, index_config).await.map_err(|e| {
            SearchSyncError::config(format!("Failed to create OpenSearch provider: {}", e))
        })?;

        for alias in aliases {
            provider.ensure_index_exists(alias).await.map_err(|e| {
                SearchSyncError::config(format!("Failed to ensure index '{}' exists: {}", alias, e))
            })?;
        }

        Ok(provider)
    }
}
