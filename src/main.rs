//! Buienradar Ingestion Service - Main Daemon
//!
//! A server-side daemon that continuously:
//! 1. Fetches the Buienradar station feed
//! 2. Fills gaps in the snapshot by nearest-neighbour imputation
//! 3. Warehouses new measurements and station metadata in PostgreSQL
//! 4. Optionally provides an HTTP endpoint for querying stored data
//!
//! Usage:
//!   cargo run --release                      # Poll every 10 minutes
//!   cargo run --release -- --endpoint 8080   # Also serve the query API on port 8080
//!   cargo run --release -- --interval-minutes 5 --log-level debug
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use buienradar_ingest::config::{self, Cli};
use buienradar_ingest::daemon::{Daemon, DaemonConfig};
use buienradar_ingest::endpoint;
use buienradar_ingest::ingest::buienradar::BuienradarClient;
use buienradar_ingest::store::PostgresStore;
use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match config::load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(config.log_level)
            .finish(),
    ) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Buienradar ingestion service starting");

    // Schema setup uses the blocking client, so it runs before the runtime exists.
    let store = match PostgresStore::from_env() {
        Ok(store) => store,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = store.ensure_schema() {
        error!(error = %e, "database initialization failed");
        return ExitCode::FAILURE;
    }
    info!("database schema ready");

    let source = match BuienradarClient::new(&config.feed_url, config.request_timeout) {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    if let Some(port) = config.endpoint_port {
        let queries = store.clone();
        std::thread::spawn(move || {
            if let Err(e) = endpoint::start_endpoint_server(port, queries) {
                warn!(error = %e, "endpoint server stopped, continuing without HTTP endpoint");
            }
        });
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    info!(
        feed = source.url(),
        interval_minutes = config.interval.as_secs() / 60,
        "starting continuous ingestion loop, press Ctrl+C to stop"
    );

    let daemon = Daemon::with_config(DaemonConfig::from(&config), source, store);
    let shutdown = CancellationToken::new();

    runtime.block_on(async {
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received interrupt, shutting down"),
                Err(e) => error!(error = %e, "failed to listen for interrupt"),
            }
            signal_token.cancel();
        });

        let summary = daemon.run(shutdown).await;
        info!(
            cycles = summary.cycles,
            store_failures = summary.store_failures,
            loop_failures = summary.loop_failures,
            "ingestion loop finished"
        );
    });

    ExitCode::SUCCESS
}
