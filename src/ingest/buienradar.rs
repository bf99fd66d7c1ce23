/// Buienradar JSON feed client and snapshot parser.
///
/// The feed republishes the latest observation of every Dutch weather
/// station on each request:
///   https://data.buienradar.nl/2.0/feed/json
///
/// Only `actual.stationmeasurements[]` is used. See `fixtures.rs` for an
/// annotated example of the entry shape.

use crate::model::{round_tenth, round_whole, Measurement, Snapshot, StationInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const BUIENRADAR_FEED_URL: &str = "https://data.buienradar.nl/2.0/feed/json";

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Transport or decode failure. Always means "no data this cycle".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("feed returned HTTP {status}")]
    Status { status: reqwest::StatusCode },

    #[error("feed body is not valid JSON: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Anything that can produce the raw feed document.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Value, FetchError>;
}

/// HTTP client for the Buienradar feed.
pub struct BuienradarClient {
    client: reqwest::Client,
    url: String,
}

impl BuienradarClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("buienradar_ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for BuienradarClient {
    async fn fetch(&self) -> Result<Value, FetchError> {
        debug!(url = %self.url, "requesting feed");

        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: self.url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status(),
            });
        }

        response.json::<Value>().await.map_err(FetchError::Decode)
    }
}

// ---------------------------------------------------------------------------
// Serde structures for the feed document
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct Feed {
    actual: Actual,
}

#[derive(Deserialize)]
struct Actual {
    stationmeasurements: Vec<Value>,
}

/// One entry of `actual.stationmeasurements[]`. Every observation field may
/// be absent or `null`; the feed omits sensors a station does not have.
#[derive(Deserialize)]
struct StationEntry {
    stationid: i32,
    timestamp: String,
    stationname: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    regio: Option<String>,
    temperature: Option<f64>,
    groundtemperature: Option<f64>,
    feeltemperature: Option<f64>,
    windgusts: Option<f64>,
    #[serde(rename = "windspeedBft")]
    windspeed_bft: Option<f64>,
    humidity: Option<f64>,
    precipitation: Option<f64>,
    sunpower: Option<f64>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Converts a feed document into a `Snapshot`, one measurement and one
/// station row per entry, in document order.
///
/// Float fields are rounded to one decimal; integer fields are taken as
/// whole numbers. `recorded_at` and `last_updated` are both `now`.
///
/// A missing or malformed document yields an empty snapshot. Entries that
/// lack a station id or timestamp are skipped.
pub fn parse_snapshot(document: Option<&Value>, now: DateTime<Utc>) -> Snapshot {
    let Some(document) = document else {
        return Snapshot::default();
    };

    let feed = match Feed::deserialize(document) {
        Ok(feed) => feed,
        Err(e) => {
            warn!(error = %e, "feed document has no usable actual.stationmeasurements");
            return Snapshot::default();
        }
    };

    let mut snapshot = Snapshot::default();

    for (index, raw) in feed.actual.stationmeasurements.iter().enumerate() {
        let entry = match StationEntry::deserialize(raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(index, error = %e, "skipping unreadable station entry");
                continue;
            }
        };

        snapshot.measurements.push(Measurement {
            station_id: entry.stationid,
            timestamp: entry.timestamp.clone(),
            temperature: entry.temperature.map(round_tenth),
            ground_temperature: entry.groundtemperature.map(round_tenth),
            feel_temperature: entry.feeltemperature.map(round_tenth),
            wind_gusts: entry.windgusts.map(round_tenth),
            wind_force_bft: entry.windspeed_bft.map(round_whole),
            humidity: entry.humidity.map(round_whole),
            precipitation: entry.precipitation.map(round_tenth),
            sun_power: entry.sunpower.map(round_whole),
            recorded_at: now,
        });

        snapshot.stations.push(StationInfo {
            station_id: entry.stationid,
            name: entry.stationname,
            latitude: entry.lat.map(round_tenth),
            longitude: entry.lon.map(round_tenth),
            region: entry.regio,
            last_updated: now,
        });
    }

    snapshot
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap()
    }

    fn parse(json: &str) -> Snapshot {
        let document: Value = serde_json::from_str(json).expect("fixture must be valid JSON");
        parse_snapshot(Some(&document), now())
    }

    // --- Happy path ---------------------------------------------------------

    #[test]
    fn test_parse_preserves_document_order() {
        let snapshot = parse(fixture_feed_json());

        let ids: Vec<i32> = snapshot.measurements.iter().map(|m| m.station_id).collect();
        assert_eq!(ids, vec![6391, 6275, 6260]);

        let info_ids: Vec<i32> = snapshot.stations.iter().map(|s| s.station_id).collect();
        assert_eq!(info_ids, ids, "station rows must parallel measurements");
    }

    #[test]
    fn test_parse_rounds_floats_to_one_decimal() {
        let snapshot = parse(fixture_feed_json());
        let arcen = &snapshot.measurements[0];

        assert_eq!(arcen.temperature, Some(14.3));
        assert_eq!(arcen.ground_temperature, Some(13.1));
        assert_eq!(arcen.feel_temperature, Some(14.3));
        assert_eq!(arcen.wind_gusts, Some(5.2));
        assert_eq!(arcen.precipitation, Some(0.0));
        assert_eq!(arcen.timestamp, "2024-05-01T13:50:00");
    }

    #[test]
    fn test_parse_integer_fields_pass_through() {
        let snapshot = parse(fixture_feed_json());
        let arcen = &snapshot.measurements[0];

        assert_eq!(arcen.wind_force_bft, Some(2));
        assert_eq!(arcen.humidity, Some(71));
        assert_eq!(arcen.sun_power, Some(540));
    }

    #[test]
    fn test_parse_station_metadata() {
        let snapshot = parse(fixture_feed_json());
        let arcen = &snapshot.stations[0];

        assert_eq!(arcen.name.as_deref(), Some("Meetstation Arcen"));
        assert_eq!(arcen.region.as_deref(), Some("Venlo"));
        assert_eq!(arcen.latitude, Some(51.5));
        assert_eq!(arcen.longitude, Some(6.2));
    }

    #[test]
    fn test_parse_stamps_ingestion_time_not_feed_time() {
        let snapshot = parse(fixture_feed_json());
        assert!(snapshot.measurements.iter().all(|m| m.recorded_at == now()));
        assert!(snapshot.stations.iter().all(|s| s.last_updated == now()));
    }

    // --- Missing values -----------------------------------------------------

    #[test]
    fn test_absent_fields_are_missing_not_zero() {
        let snapshot = parse(fixture_feed_json());
        let hoek = snapshot
            .measurements
            .iter()
            .find(|m| m.station_id == 6275)
            .expect("Hoek van Holland should be parsed");

        assert_eq!(hoek.ground_temperature, None, "absent key must stay missing");
        assert_eq!(hoek.sun_power, None, "null must stay missing");
        assert_eq!(hoek.precipitation, Some(0.0), "a reported zero is a value");
    }

    #[test]
    fn test_entry_without_station_id_is_skipped() {
        let json = r#"{ "actual": { "stationmeasurements": [
            { "timestamp": "2024-05-01T13:50:00", "temperature": 12.0 },
            { "stationid": 6260, "timestamp": "2024-05-01T13:50:00", "temperature": 12.0 }
        ] } }"#;
        let snapshot = parse(json);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.measurements[0].station_id, 6260);
    }

    // --- Absent or malformed documents --------------------------------------

    #[test]
    fn test_absent_document_yields_empty_snapshot() {
        let snapshot = parse_snapshot(None, now());
        assert!(snapshot.is_empty());
        assert!(snapshot.stations.is_empty());
    }

    #[test]
    fn test_document_without_actual_yields_empty_snapshot() {
        let snapshot = parse(r#"{ "forecast": {} }"#);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_non_object_document_yields_empty_snapshot() {
        let snapshot = parse(r#"[1, 2, 3]"#);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_empty_measurement_list_yields_empty_snapshot() {
        let snapshot = parse(r#"{ "actual": { "stationmeasurements": [] } }"#);
        assert!(snapshot.is_empty());
    }

    // --- Client -------------------------------------------------------------

    #[test]
    fn test_client_keeps_configured_url() {
        let client = BuienradarClient::new(BUIENRADAR_FEED_URL, Duration::from_secs(5))
            .expect("client should build");
        assert_eq!(client.url(), "https://data.buienradar.nl/2.0/feed/json");
    }
}
