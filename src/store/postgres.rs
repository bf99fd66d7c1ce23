/// PostgreSQL-backed store.
///
/// Every operation opens its own connection and drops it before
/// returning, so nothing is held between cycles.

use super::{
    history_threshold, InsertOutcome, MeasurementStore, StationQueries, StoreError,
    StoreTransaction,
};
use crate::db;
use crate::model::{FeelGap, Measurement, MeasurementSummary, StationInfo, StationMeasurement};
use ::postgres::{Client, Row, Transaction};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::collections::HashMap;

const MEASUREMENT_COLUMNS: &str = "m.station_id, m.timestamp, m.temperature, m.groundtemperature, \
     m.feeltemperature, m.windgusts, m.windspeed_bft, m.humidity, m.precipitation, \
     m.sunpower, m.recorded_at, s.station_name, s.regio";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    db_url: String,
}

impl PostgresStore {
    pub fn new(db_url: &str) -> Result<Self, StoreError> {
        db::validate_database_url(db_url)?;
        Ok(Self {
            db_url: db_url.to_string(),
        })
    }

    /// Store configured from DATABASE_URL (and `.env`).
    pub fn from_env() -> Result<Self, StoreError> {
        let db_url = db::database_url_from_env()?;
        Ok(Self { db_url })
    }

    fn connect(&self) -> Result<Client, StoreError> {
        Ok(db::connect(&self.db_url)?)
    }

    /// Verifies connectivity and creates missing tables.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut client = self.connect()?;
        db::ensure_schema(&mut client)?;
        Ok(())
    }
}

struct PgTransaction<'a> {
    tx: Transaction<'a>,
}

impl StoreTransaction for PgTransaction<'_> {
    fn latest_timestamps(&mut self) -> Result<HashMap<i32, String>, StoreError> {
        let rows = self.tx.query(
            "SELECT station_id, MAX(timestamp) AS latest_timestamp
             FROM station_measurements
             GROUP BY station_id",
            &[],
        )?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<_, i32>(0), row.get::<_, String>(1)))
            .collect())
    }

    fn upsert_station(&mut self, info: &StationInfo) -> Result<(), StoreError> {
        let lat = info.latitude.map(to_decimal).transpose()?;
        let lon = info.longitude.map(to_decimal).transpose()?;

        self.tx.execute(
            "INSERT INTO station_info
             (station_id, station_name, lat, lon, regio, last_updated)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (station_id) DO UPDATE SET
                station_name = EXCLUDED.station_name,
                lat = EXCLUDED.lat,
                lon = EXCLUDED.lon,
                regio = EXCLUDED.regio,
                last_updated = EXCLUDED.last_updated",
            &[
                &info.station_id,
                &info.name,
                &lat,
                &lon,
                &info.region,
                &info.last_updated,
            ],
        )?;

        Ok(())
    }

    fn insert_measurement(
        &mut self,
        m: &Measurement,
    ) -> Result<InsertOutcome, StoreError> {
        // ON CONFLICT keeps the transaction usable after a uniqueness race.
        let rows_affected = self.tx.execute(
            "INSERT INTO station_measurements
             (station_id, timestamp, temperature, groundtemperature, feeltemperature,
              windgusts, windspeed_bft, humidity, precipitation, sunpower, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (station_id, timestamp) DO NOTHING",
            &[
                &m.station_id,
                &m.timestamp,
                &m.temperature,
                &m.ground_temperature,
                &m.feel_temperature,
                &m.wind_gusts,
                &m.wind_force_bft,
                &m.humidity,
                &m.precipitation,
                &m.sun_power,
                &m.recorded_at,
            ],
        )?;

        Ok(if rows_affected == 0 {
            InsertOutcome::Conflict
        } else {
            InsertOutcome::Inserted
        })
    }
}

impl MeasurementStore for PostgresStore {
    fn with_transaction<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, StoreError>,
    {
        let mut client = self.connect()?;
        let mut tx = PgTransaction {
            tx: client.transaction()?,
        };

        // Dropping an uncommitted Transaction rolls it back.
        let value = work(&mut tx)?;
        tx.tx.commit()?;
        Ok(value)
    }
}

impl StationQueries for PostgresStore {
    fn recent_measurements(&self, limit: i64) -> Result<Vec<StationMeasurement>, StoreError> {
        let mut client = self.connect()?;
        let rows = client.query(
            &format!(
                "SELECT {}
                 FROM station_measurements m
                 JOIN station_info s ON m.station_id = s.station_id
                 ORDER BY m.id DESC
                 LIMIT $1",
                MEASUREMENT_COLUMNS
            ),
            &[&limit],
        )?;

        Ok(rows.iter().map(row_to_station_measurement).collect())
    }

    fn station_history(
        &self,
        station_id: i32,
        hours: i64,
    ) -> Result<Vec<StationMeasurement>, StoreError> {
        let threshold = history_threshold(Utc::now(), hours)?;
        let mut client = self.connect()?;
        let rows = client.query(
            &format!(
                "SELECT {}
                 FROM station_measurements m
                 JOIN station_info s ON m.station_id = s.station_id
                 WHERE m.station_id = $1 AND m.recorded_at >= $2
                 ORDER BY m.recorded_at",
                MEASUREMENT_COLUMNS
            ),
            &[&station_id, &threshold],
        )?;

        Ok(rows.iter().map(row_to_station_measurement).collect())
    }

    fn stations(&self) -> Result<Vec<StationInfo>, StoreError> {
        let mut client = self.connect()?;
        let rows = client.query(
            "SELECT station_id, station_name, lat, lon, regio, last_updated
             FROM station_info
             ORDER BY station_id",
            &[],
        )?;

        rows.iter()
            .map(|row| {
                Ok(StationInfo {
                    station_id: row.get(0),
                    name: row.get(1),
                    latitude: row.get::<_, Option<Decimal>>(2).map(from_decimal).transpose()?,
                    longitude: row.get::<_, Option<Decimal>>(3).map(from_decimal).transpose()?,
                    region: row.get(4),
                    last_updated: row.get(5),
                })
            })
            .collect()
    }

    fn measurement_summary(&self) -> Result<MeasurementSummary, StoreError> {
        let mut client = self.connect()?;

        let hottest = client
            .query_opt(
                &format!(
                    "SELECT {}
                     FROM station_measurements m
                     JOIN station_info s ON m.station_id = s.station_id
                     WHERE m.temperature IS NOT NULL
                     ORDER BY m.temperature DESC, m.id
                     LIMIT 1",
                    MEASUREMENT_COLUMNS
                ),
                &[],
            )?
            .map(|row| row_to_station_measurement(&row));

        let largest_feel_gap = client
            .query_opt(
                &format!(
                    "SELECT {}, ABS(m.feeltemperature - m.temperature) AS gap
                     FROM station_measurements m
                     JOIN station_info s ON m.station_id = s.station_id
                     WHERE m.temperature IS NOT NULL AND m.feeltemperature IS NOT NULL
                     ORDER BY gap DESC, m.id
                     LIMIT 1",
                    MEASUREMENT_COLUMNS
                ),
                &[],
            )?
            .map(|row| FeelGap {
                measurement: row_to_station_measurement(&row),
                gap: row.get(13),
            });

        let stats = client.query_one(
            "SELECT COUNT(*), AVG(temperature), MIN(timestamp), MAX(timestamp)
             FROM station_measurements",
            &[],
        )?;
        let measurement_count = usize::try_from(stats.get::<_, i64>(0))
            .map_err(|e| StoreError::Conversion(e.to_string()))?;

        Ok(MeasurementSummary {
            measurement_count,
            hottest,
            largest_feel_gap,
            average_temperature: stats.get(1),
            earliest_timestamp: stats.get(2),
            latest_timestamp: stats.get(3),
        })
    }
}

fn row_to_station_measurement(row: &Row) -> StationMeasurement {
    StationMeasurement {
        measurement: Measurement {
            station_id: row.get(0),
            timestamp: row.get(1),
            temperature: row.get(2),
            ground_temperature: row.get(3),
            feel_temperature: row.get(4),
            wind_gusts: row.get(5),
            wind_force_bft: row.get(6),
            humidity: row.get(7),
            precipitation: row.get(8),
            sun_power: row.get(9),
            recorded_at: row.get(10),
        },
        station_name: row.get(11),
        region: row.get(12),
    }
}

fn to_decimal(value: f64) -> Result<Decimal, StoreError> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(1))
        .ok_or_else(|| StoreError::Conversion(format!("{} does not fit NUMERIC", value)))
}

fn from_decimal(value: Decimal) -> Result<f64, StoreError> {
    value
        .to_f64()
        .ok_or_else(|| StoreError::Conversion(format!("{} does not fit f64", value)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
