/// Shared data types for the ingestion pipeline.
///
/// A `Snapshot` is what one fetch of the Buienradar feed turns into: two
/// parallel sequences, one `Measurement` and one `StationInfo` per station
/// entry, in feed order. Numeric observation fields are optional throughout;
/// `None` means the feed did not report the value, which is distinct from a
/// reported zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Station metadata. Overwritten wholesale every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationInfo {
    pub station_id: i32,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub region: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// One observation of one station at one feed timestamp.
///
/// `(station_id, timestamp)` is unique in the store and the record is never
/// modified after it has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub station_id: i32,
    /// ISO 8601 as published by the feed; compared lexicographically.
    pub timestamp: String,
    pub temperature: Option<f64>,
    pub ground_temperature: Option<f64>,
    pub feel_temperature: Option<f64>,
    pub wind_gusts: Option<f64>,
    pub wind_force_bft: Option<i32>,
    pub humidity: Option<i32>,
    pub precipitation: Option<f64>,
    pub sun_power: Option<i32>,
    pub recorded_at: DateTime<Utc>,
}

impl Measurement {
    /// Count of numeric fields that are missing.
    pub fn missing_fields(&self) -> usize {
        NumericField::ALL
            .iter()
            .filter(|field| field.get(self).is_none())
            .count()
    }
}

/// Everything one fetch produced. Lives for a single cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub measurements: Vec<Measurement>,
    pub stations: Vec<StationInfo>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }
}

/// A measurement joined with the name and region of its station, as
/// returned by the read-side queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationMeasurement {
    #[serde(flatten)]
    pub measurement: Measurement,
    pub station_name: Option<String>,
    pub region: Option<String>,
}

/// Overview of everything stored, for the summary route.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeasurementSummary {
    pub measurement_count: usize,
    /// Highest reported temperature.
    pub hottest: Option<StationMeasurement>,
    /// Largest distance between felt and measured temperature.
    pub largest_feel_gap: Option<FeelGap>,
    pub average_temperature: Option<f64>,
    pub earliest_timestamp: Option<String>,
    pub latest_timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeelGap {
    #[serde(flatten)]
    pub measurement: StationMeasurement,
    pub gap: f64,
}

// ---------------------------------------------------------------------------
// Numeric fields
// ---------------------------------------------------------------------------

/// The eight numeric observation fields, in feature-matrix column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    Temperature,
    GroundTemperature,
    FeelTemperature,
    WindGusts,
    WindForceBft,
    Humidity,
    Precipitation,
    SunPower,
}

impl NumericField {
    pub const ALL: [NumericField; 8] = [
        NumericField::Temperature,
        NumericField::GroundTemperature,
        NumericField::FeelTemperature,
        NumericField::WindGusts,
        NumericField::WindForceBft,
        NumericField::Humidity,
        NumericField::Precipitation,
        NumericField::SunPower,
    ];

    /// Integer-typed fields are stored as whole numbers.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            NumericField::WindForceBft | NumericField::Humidity | NumericField::SunPower
        )
    }

    /// Feed (and column) name of the field.
    pub fn name(self) -> &'static str {
        match self {
            NumericField::Temperature => "temperature",
            NumericField::GroundTemperature => "groundtemperature",
            NumericField::FeelTemperature => "feeltemperature",
            NumericField::WindGusts => "windgusts",
            NumericField::WindForceBft => "windspeedBft",
            NumericField::Humidity => "humidity",
            NumericField::Precipitation => "precipitation",
            NumericField::SunPower => "sunpower",
        }
    }

    pub fn get(self, m: &Measurement) -> Option<f64> {
        match self {
            NumericField::Temperature => m.temperature,
            NumericField::GroundTemperature => m.ground_temperature,
            NumericField::FeelTemperature => m.feel_temperature,
            NumericField::WindGusts => m.wind_gusts,
            NumericField::WindForceBft => m.wind_force_bft.map(f64::from),
            NumericField::Humidity => m.humidity.map(f64::from),
            NumericField::Precipitation => m.precipitation,
            NumericField::SunPower => m.sun_power.map(f64::from),
        }
    }

    /// Stores `value` into the field, rounded the way the field is stored:
    /// nearest integer for integer fields, one decimal otherwise.
    pub fn set(self, m: &mut Measurement, value: f64) {
        match self {
            NumericField::Temperature => m.temperature = Some(round_tenth(value)),
            NumericField::GroundTemperature => m.ground_temperature = Some(round_tenth(value)),
            NumericField::FeelTemperature => m.feel_temperature = Some(round_tenth(value)),
            NumericField::WindGusts => m.wind_gusts = Some(round_tenth(value)),
            NumericField::WindForceBft => m.wind_force_bft = Some(round_whole(value)),
            NumericField::Humidity => m.humidity = Some(round_whole(value)),
            NumericField::Precipitation => m.precipitation = Some(round_tenth(value)),
            NumericField::SunPower => m.sun_power = Some(round_whole(value)),
        }
    }
}

/// Rounds to one fractional digit, halves away from zero.
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Rounds to the nearest integer, halves away from zero.
pub fn round_whole(value: f64) -> i32 {
    value.round() as i32
}
