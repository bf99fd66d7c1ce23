/// Durable storage seams.
///
/// The pipeline talks to storage only through these traits:
/// - `MeasurementStore` scopes a connection and a transaction around a
///   closure. Commit on `Ok`, rollback otherwise, connection released on
///   every exit path.
/// - `StoreTransaction` is the write-side surface used inside that scope.
/// - `StationQueries` is the read-side surface used by the HTTP endpoint.
///
/// `postgres` holds the production implementation, `memory` an in-process
/// one with the same semantics plus fault injection.
pub mod memory;
pub mod postgres;

use crate::model::{Measurement, MeasurementSummary, StationInfo, StationMeasurement};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] crate::db::DbConfigError),

    #[error("database error: {0}")]
    Database(#[from] ::postgres::Error),

    #[error("stored value could not be converted: {0}")]
    Conversion(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query parameter out of range: {0}")]
    OutOfRange(String),
}

/// Result of attempting to insert one measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// `(station_id, timestamp)` was already present.
    Conflict,
}

/// Write operations available inside one transaction.
pub trait StoreTransaction {
    /// Most recent persisted timestamp per station. Stations with no
    /// measurements are absent.
    fn latest_timestamps(&mut self) -> Result<HashMap<i32, String>, StoreError>;

    /// Insert or replace the metadata row for the station.
    fn upsert_station(&mut self, info: &StationInfo) -> Result<(), StoreError>;

    /// Insert a measurement. A uniqueness conflict is reported as
    /// `InsertOutcome::Conflict`, not as an error.
    fn insert_measurement(&mut self, measurement: &Measurement)
    -> Result<InsertOutcome, StoreError>;
}

/// A store that can run a closure inside one atomic transaction.
pub trait MeasurementStore: Send + Sync + 'static {
    fn with_transaction<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, StoreError>;
}

/// Read-only queries over persisted data.
pub trait StationQueries: Send + Sync {
    /// The `limit` most recently inserted measurements, newest first.
    fn recent_measurements(&self, limit: i64) -> Result<Vec<StationMeasurement>, StoreError>;

    /// A station's measurements recorded within the last `hours` hours,
    /// oldest first.
    fn station_history(
        &self,
        station_id: i32,
        hours: i64,
    ) -> Result<Vec<StationMeasurement>, StoreError>;

    /// Every known station, ordered by id.
    fn stations(&self) -> Result<Vec<StationInfo>, StoreError>;

    /// Extremes and averages over all stored measurements.
    fn measurement_summary(&self) -> Result<MeasurementSummary, StoreError>;
}

/// Start of a `hours`-long window ending at `now`.
pub(crate) fn history_threshold(
    now: DateTime<Utc>,
    hours: i64,
) -> Result<DateTime<Utc>, StoreError> {
    TimeDelta::try_hours(hours)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| StoreError::OutOfRange(format!("history window of {} hours", hours)))
}
