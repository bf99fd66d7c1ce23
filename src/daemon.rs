/// Core daemon implementation for the ingestion service
///
/// This module implements:
/// 1. One ingestion cycle: fetch, parse, impute, warehouse
/// 2. The scheduling loop that runs a cycle immediately, then again one
///    interval after each cycle completes, until shut down
///
/// Failure handling per cycle:
/// - Fetch failure: logged, nothing written, retried next cycle
/// - Imputation failure: logged, unimputed values are warehoused
/// - Store failure: logged, the cycle's transaction is rolled back
/// - Anything that takes the cycle task down (a panic): logged, the loop
///   backs off before the next attempt and keeps running

use crate::config::{IngestConfig, DEFAULT_BACKOFF_SECONDS, DEFAULT_INTERVAL_MINUTES};
use crate::impute::{impute, Imputation, PassThrough};
use crate::ingest::buienradar::{parse_snapshot, SnapshotSource};
use crate::schedule::{Tick, Ticker};
use crate::store::{MeasurementStore, StoreError};
use crate::upsert::{warehouse_snapshot, WarehouseReport};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Daemon configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    /// Time from the end of one cycle to the start of the next (default: 10 minutes)
    pub interval: Duration,

    /// Pause after a cycle task fails outright (default: 60 seconds)
    pub backoff: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_MINUTES * 60),
            backoff: Duration::from_secs(DEFAULT_BACKOFF_SECONDS),
        }
    }
}

impl From<&IngestConfig> for DaemonConfig {
    fn from(config: &IngestConfig) -> Self {
        Self {
            interval: config.interval,
            backoff: config.backoff,
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle results
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("database error, cycle rolled back: {0}")]
    Store(#[from] StoreError),

    #[error("warehousing task failed: {0}")]
    Task(#[from] JoinError),
}

/// How imputation went for a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ImputationSummary {
    Imputed { filled: usize },
    Unchanged(PassThrough),
}

impl From<&Imputation> for ImputationSummary {
    fn from(imputation: &Imputation) -> Self {
        match imputation {
            Imputation::Imputed { filled, .. } => ImputationSummary::Imputed { filled: *filled },
            Imputation::Unchanged { reason, .. } => ImputationSummary::Unchanged(reason.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub stations: usize,
    pub imputation: ImputationSummary,
    pub warehouse: WarehouseReport,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The feed could not be retrieved; nothing was written.
    FetchFailed,
    /// The feed held no station measurements; nothing was written.
    Empty,
    Warehoused(CycleReport),
}

/// Counters for one `Daemon::run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub store_failures: u64,
    pub loop_failures: u64,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Main daemon state
pub struct Daemon<F, S> {
    config: DaemonConfig,
    source: Arc<F>,
    store: Arc<S>,
}

impl<F, S> Daemon<F, S>
where
    F: SnapshotSource + 'static,
    S: MeasurementStore,
{
    /// Create a new daemon with default configuration
    pub fn new(source: F, store: S) -> Self {
        Self::with_config(DaemonConfig::default(), source, store)
    }

    /// Create daemon with custom configuration
    pub fn with_config(config: DaemonConfig, source: F, store: S) -> Self {
        Self {
            config,
            source: Arc::new(source),
            store: Arc::new(store),
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one ingestion cycle to completion.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        ingest_cycle(self.source.clone(), self.store.clone()).await
    }

    /// Main daemon loop. Runs until `shutdown` is cancelled; a cycle that is
    /// in progress at that moment is allowed to finish.
    pub async fn run(&self, shutdown: CancellationToken) -> RunSummary {
        info!(
            interval_secs = self.config.interval.as_secs(),
            backoff_secs = self.config.backoff.as_secs(),
            "starting scheduler"
        );

        let mut ticker = Ticker::new(self.config.interval, self.config.backoff);
        let mut summary = RunSummary::default();

        loop {
            if ticker.wait(&shutdown).await == Tick::Stop {
                break;
            }

            summary.cycles += 1;
            let cycle = tokio::spawn(ingest_cycle(self.source.clone(), self.store.clone()));

            match cycle.await {
                Ok(Ok(_)) => ticker.completed(),
                Ok(Err(CycleError::Store(e))) => {
                    error!(error = %e, "database error, cycle rolled back");
                    summary.store_failures += 1;
                    ticker.completed();
                }
                Ok(Err(e)) => {
                    error!(error = %e, "error in scheduler loop");
                    summary.loop_failures += 1;
                    ticker.failed();
                }
                Err(e) => {
                    error!(error = %e, "error in scheduler loop");
                    summary.loop_failures += 1;
                    ticker.failed();
                }
            }

            let remaining = ticker.remaining();
            let next_update = chrono::Duration::from_std(remaining)
                .map(|d| (chrono::Local::now() + d).format("%H:%M:%S").to_string())
                .unwrap_or_default();
            info!(next_update = %next_update, "next update scheduled");
        }

        info!(cycles = summary.cycles, "scheduler stopped");
        summary
    }
}

/// One fetch-parse-impute-warehouse pass.
async fn ingest_cycle<F, S>(source: Arc<F>, store: Arc<S>) -> Result<CycleOutcome, CycleError>
where
    F: SnapshotSource + 'static,
    S: MeasurementStore,
{
    info!("starting database update");
    let start = Instant::now();

    let document = match source.fetch().await {
        Ok(document) => document,
        Err(e) => {
            error!(error = %e, "failed to fetch data, will try again next cycle");
            return Ok(CycleOutcome::FetchFailed);
        }
    };

    let mut snapshot = parse_snapshot(Some(&document), Utc::now());
    if snapshot.is_empty() {
        warn!("no measurements found in feed response");
        return Ok(CycleOutcome::Empty);
    }

    let stations = snapshot.stations.len();
    info!(measurements = snapshot.len(), stations, "processing snapshot");

    let imputation = impute(snapshot.measurements);
    match &imputation {
        Imputation::Imputed { filled, .. } => {
            info!(filled, "imputed missing values");
        }
        Imputation::Unchanged { reason: PassThrough::Failed(e), .. } => {
            warn!(error = %e, "KNN imputation failed, using original measurements");
        }
        Imputation::Unchanged { reason, .. } => {
            debug!(reason = ?reason, "imputation skipped");
        }
    }
    let imputation_summary = ImputationSummary::from(&imputation);
    snapshot.measurements = imputation.into_measurements();

    let warehouse = tokio::task::spawn_blocking(move || warehouse_snapshot(&*store, &snapshot))
        .await??;

    let elapsed = start.elapsed();
    info!(
        inserted = warehouse.inserted,
        duplicates = warehouse.duplicates,
        elapsed_secs = elapsed.as_secs_f64(),
        "database update completed"
    );

    if warehouse.inserted == 0 {
        for (station_id, timestamp) in warehouse.latest.entries() {
            debug!(station_id, latest = timestamp, "no new measurements");
        }
    }

    Ok(CycleOutcome::Warehoused(CycleReport {
        stations,
        imputation: imputation_summary,
        warehouse,
        elapsed,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
