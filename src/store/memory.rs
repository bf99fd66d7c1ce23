/// In-process store with the same transactional semantics as PostgreSQL.
///
/// A transaction works on a copy of the state and swaps it in on commit,
/// so an error (or a panic) inside the closure leaves nothing behind.
/// `fail_after_inserts` makes the Nth + 1 measurement insert of a
/// transaction fail, for exercising rollback. A poisoned lock is recovered:
/// committed state only changes after a closure has returned `Ok`.

use super::{
    history_threshold, InsertOutcome, MeasurementStore, StationQueries, StoreError,
    StoreTransaction,
};
use crate::model::{FeelGap, Measurement, MeasurementSummary, StationInfo, StationMeasurement};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    stations: BTreeMap<i32, StationInfo>,
    /// Insertion order stands in for the autoincrement id.
    measurements: Vec<Measurement>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_after_inserts: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following transaction fail on its `(n + 1)`th insert.
    pub fn fail_after_inserts(&self, n: usize) {
        *self.failure_slot() = Some(n);
    }

    pub fn clear_failure(&self) {
        *self.failure_slot() = None;
    }

    pub fn measurement_count(&self) -> usize {
        self.lock().measurements.len()
    }

    pub fn station_count(&self) -> usize {
        self.lock().stations.len()
    }

    pub fn measurements(&self) -> Vec<Measurement> {
        self.lock().measurements.clone()
    }

    pub fn station(&self, station_id: i32) -> Option<StationInfo> {
        self.lock().stations.get(&station_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failure_slot(&self) -> MutexGuard<'_, Option<usize>> {
        self.fail_after_inserts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn joined(state: &MemoryState, measurement: &Measurement) -> StationMeasurement {
        let station = state.stations.get(&measurement.station_id);
        StationMeasurement {
            measurement: measurement.clone(),
            station_name: station.and_then(|s| s.name.clone()),
            region: station.and_then(|s| s.region.clone()),
        }
    }
}

struct MemoryTransaction {
    state: MemoryState,
    inserts: usize,
    fail_after: Option<usize>,
}

impl StoreTransaction for MemoryTransaction {
    fn latest_timestamps(&mut self) -> Result<HashMap<i32, String>, StoreError> {
        let mut latest: HashMap<i32, String> = HashMap::new();
        for m in &self.state.measurements {
            let newer = latest
                .get(&m.station_id)
                .is_none_or(|current| m.timestamp > *current);
            if newer {
                latest.insert(m.station_id, m.timestamp.clone());
            }
        }
        Ok(latest)
    }

    fn upsert_station(&mut self, info: &StationInfo) -> Result<(), StoreError> {
        self.state.stations.insert(info.station_id, info.clone());
        Ok(())
    }

    fn insert_measurement(
        &mut self,
        measurement: &Measurement,
    ) -> Result<InsertOutcome, StoreError> {
        if self.fail_after.is_some_and(|n| self.inserts >= n) {
            return Err(StoreError::Unavailable(format!(
                "injected failure after {} inserts",
                self.inserts
            )));
        }

        if !self.state.stations.contains_key(&measurement.station_id) {
            return Err(StoreError::Unavailable(format!(
                "foreign key violation: station {} has no station_info row",
                measurement.station_id
            )));
        }

        let exists = self.state.measurements.iter().any(|m| {
            m.station_id == measurement.station_id && m.timestamp == measurement.timestamp
        });
        if exists {
            return Ok(InsertOutcome::Conflict);
        }

        self.state.measurements.push(measurement.clone());
        self.inserts += 1;
        Ok(InsertOutcome::Inserted)
    }
}

impl MeasurementStore for MemoryStore {
    fn with_transaction<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, StoreError>,
    {
        let fail_after = *self.failure_slot();

        let mut committed = self.lock();
        let mut tx = MemoryTransaction {
            state: committed.clone(),
            inserts: 0,
            fail_after,
        };

        let value = work(&mut tx)?;
        *committed = tx.state;
        Ok(value)
    }
}

impl StationQueries for MemoryStore {
    fn recent_measurements(&self, limit: i64) -> Result<Vec<StationMeasurement>, StoreError> {
        let state = self.lock();
        let limit = usize::try_from(limit.max(0)).unwrap_or(0);
        Ok(state
            .measurements
            .iter()
            .rev()
            .take(limit)
            .map(|m| Self::joined(&state, m))
            .collect())
    }

    fn station_history(
        &self,
        station_id: i32,
        hours: i64,
    ) -> Result<Vec<StationMeasurement>, StoreError> {
        let threshold = history_threshold(Utc::now(), hours)?;
        let state = self.lock();
        let mut rows: Vec<StationMeasurement> = state
            .measurements
            .iter()
            .filter(|m| m.station_id == station_id && m.recorded_at >= threshold)
            .map(|m| Self::joined(&state, m))
            .collect();
        rows.sort_by_key(|row| row.measurement.recorded_at);
        Ok(rows)
    }

    fn stations(&self) -> Result<Vec<StationInfo>, StoreError> {
        Ok(self.lock().stations.values().cloned().collect())
    }

    fn measurement_summary(&self) -> Result<MeasurementSummary, StoreError> {
        let state = self.lock();
        let measurements = &state.measurements;

        // Ties keep the first stored row.
        let hottest = measurements
            .iter()
            .filter_map(|m| Some((m, m.temperature?)))
            .fold(None::<(&Measurement, f64)>, |best, (m, t)| match best {
                Some((_, best_t)) if best_t >= t => best,
                _ => Some((m, t)),
            })
            .map(|(m, _)| Self::joined(&state, m));

        let largest_feel_gap = measurements
            .iter()
            .filter_map(|m| Some((m, (m.feel_temperature? - m.temperature?).abs())))
            .fold(None::<(&Measurement, f64)>, |best, (m, gap)| match best {
                Some((_, best_gap)) if best_gap >= gap => best,
                _ => Some((m, gap)),
            })
            .map(|(m, gap)| FeelGap {
                measurement: Self::joined(&state, m),
                gap,
            });

        let temperatures: Vec<f64> = measurements.iter().filter_map(|m| m.temperature).collect();
        let average_temperature = (!temperatures.is_empty())
            .then(|| temperatures.iter().sum::<f64>() / temperatures.len() as f64);

        Ok(MeasurementSummary {
            measurement_count: measurements.len(),
            hottest,
            largest_feel_gap,
            average_temperature,
            earliest_timestamp: measurements.iter().map(|m| m.timestamp.clone()).min(),
            latest_timestamp: measurements.iter().map(|m| m.timestamp.clone()).max(),
        })
    }
}
