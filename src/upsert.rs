/// Incremental warehousing of a snapshot.
///
/// A measurement is admitted only if it advances its station's timeline:
/// its timestamp must sort strictly after the latest one already stored for
/// that station. Everything else is counted as a duplicate. Station
/// metadata is always rewritten. All writes of one snapshot share a single
/// transaction, so a store failure leaves no partial cycle behind.

use crate::model::Snapshot;
use crate::store::{InsertOutcome, MeasurementStore, StoreError};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Most recent persisted timestamp per station, read at the start of the
/// write phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestTimestampIndex(HashMap<i32, String>);

impl LatestTimestampIndex {
    pub fn new(latest: HashMap<i32, String>) -> Self {
        Self(latest)
    }

    /// Whether a measurement at `timestamp` is newer than anything stored
    /// for the station. Stations never seen before admit everything.
    pub fn admits(&self, station_id: i32, timestamp: &str) -> bool {
        match self.0.get(&station_id) {
            Some(latest) => timestamp > latest.as_str(),
            None => true,
        }
    }

    pub fn get(&self, station_id: i32) -> Option<&str> {
        self.0.get(&station_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries sorted by station id.
    pub fn entries(&self) -> Vec<(i32, &str)> {
        let mut entries: Vec<_> = self.0.iter().map(|(id, ts)| (*id, ts.as_str())).collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

/// What one warehousing pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub stations_written: usize,
    pub elapsed: Duration,
    /// Index as it was before this pass.
    pub latest: LatestTimestampIndex,
}

/// Writes station metadata and every admissible measurement of `snapshot`
/// in one transaction.
///
/// # Errors
/// Any store error other than a uniqueness conflict aborts the pass and
/// rolls back every write made in it.
pub fn warehouse_snapshot<S: MeasurementStore>(
    store: &S,
    snapshot: &Snapshot,
) -> Result<WarehouseReport, StoreError> {
    let start = Instant::now();

    store.with_transaction(|tx| {
        let latest = LatestTimestampIndex::new(tx.latest_timestamps()?);

        // Metadata first: measurements reference station_info.
        for info in &snapshot.stations {
            tx.upsert_station(info)?;
        }

        let mut inserted = 0;
        let mut duplicates = 0;

        for m in &snapshot.measurements {
            if !latest.admits(m.station_id, &m.timestamp) {
                debug!(
                    station_id = m.station_id,
                    timestamp = %m.timestamp,
                    "skipping duplicate measurement"
                );
                duplicates += 1;
                continue;
            }

            match tx.insert_measurement(m)? {
                InsertOutcome::Inserted => {
                    debug!(
                        station_id = m.station_id,
                        timestamp = %m.timestamp,
                        "inserted new measurement"
                    );
                    inserted += 1;
                }
                InsertOutcome::Conflict => {
                    warn!(
                        station_id = m.station_id,
                        timestamp = %m.timestamp,
                        "measurement already stored, counting as duplicate"
                    );
                    duplicates += 1;
                }
            }
        }

        Ok(WarehouseReport {
            inserted,
            duplicates,
            stations_written: snapshot.stations.len(),
            elapsed: start.elapsed(),
            latest,
        })
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
