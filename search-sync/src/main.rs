//! Search Sync Main Entry Point
//!
//! Runs the sync workers: consumes sync jobs from Kafka and applies them to
//! OpenSearch.

use dotenv::dotenv;
use search_sync::{Dependencies, SearchSyncError, SyncConfig};
use std::env;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
///
/// JSON output when `LOG_FORMAT=json` or an `AXIOM_TOKEN` is present, pretty
/// console output otherwise.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("search_sync=info,search_sync_repository=info"));

    let json_output = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
        || env::var("AXIOM_TOKEN").is_ok();

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();

        info!(
            service_name = "search-sync",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with JSON format"
        );
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .init();

        info!(
            service_name = "search-sync",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with console output"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), SearchSyncError> {
    dotenv().ok();

    init_tracing();

    info!("Starting search sync");

    let config = SyncConfig::from_env();

    let mut deps = match Dependencies::new(config).await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    match deps.orchestrator.run().await {
        Ok(()) => {
            info!("Search sync stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Search sync failed");
            Err(e.into())
        }
    }
}
