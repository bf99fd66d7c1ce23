/// HTTP endpoint for querying warehoused data
///
/// Provides a small read-only REST API over the store so external tools can
/// look at what the ingestion loop has written.
///
/// Endpoints:
/// - GET /health - Service health check
/// - GET /measurements/latest?limit=N - Most recent measurements, newest first
/// - GET /measurements/summary - Hottest reading, largest feel gap, averages
/// - GET /stations - Every known station
/// - GET /stations/{station_id}/history?hours=H - One station's recent measurements

use crate::store::{StationQueries, StoreError};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{error, info, warn};

pub const DEFAULT_LATEST_LIMIT: i64 = 5;
pub const MAX_LATEST_LIMIT: i64 = 500;
pub const DEFAULT_HISTORY_HOURS: i64 = 24;
/// One year.
pub const MAX_HISTORY_HOURS: i64 = 24 * 366;

const AVAILABLE_ENDPOINTS: [&str; 5] = [
    "/health",
    "/measurements/latest?limit=N",
    "/measurements/summary",
    "/stations",
    "/stations/{station_id}/history?hours=H",
];

type JsonResponse = tiny_http::Response<std::io::Cursor<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Serves requests until the listener fails. Blocks the calling thread.
pub fn start_endpoint_server<Q: StationQueries>(port: u16, queries: Q) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    info!(port, "HTTP endpoint listening");

    for request in server.incoming_requests() {
        let (status, body) = if *request.method() == tiny_http::Method::Get {
            route(&queries, request.url())
        } else {
            (405, json!({ "error": "Method not allowed" }))
        };

        if let Err(e) = request.respond(create_response(status, &body)) {
            warn!(error = %e, "failed to send response");
        }
    }

    Ok(())
}

/// Maps a request URL to a status code and JSON body.
pub fn route<Q: StationQueries>(queries: &Q, url: &str) -> (u16, Value) {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (url, HashMap::new()),
    };
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match segments.as_slice() {
        ["health"] => handle_health(),
        ["measurements", "latest"] => handle_latest(queries, &query),
        ["measurements", "summary"] => handle_summary(queries),
        ["stations"] => handle_stations(queries),
        ["stations", station_id, "history"] => handle_history(queries, station_id, &query),
        _ => (
            404,
            json!({
                "error": "Not found",
                "available_endpoints": AVAILABLE_ENDPOINTS,
            }),
        ),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn handle_health() -> (u16, Value) {
    (
        200,
        json!({
            "status": "ok",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

fn handle_latest<Q: StationQueries>(queries: &Q, query: &HashMap<&str, &str>) -> (u16, Value) {
    let limit = match positive_param(query, "limit", DEFAULT_LATEST_LIMIT) {
        Ok(limit) => limit.min(MAX_LATEST_LIMIT),
        Err(response) => return response,
    };

    match queries.recent_measurements(limit) {
        Ok(rows) => (200, json!({ "count": rows.len(), "measurements": rows })),
        Err(e) => store_failure(e),
    }
}

fn handle_summary<Q: StationQueries>(queries: &Q) -> (u16, Value) {
    match queries.measurement_summary() {
        Ok(summary) if summary.measurement_count == 0 => (
            200,
            json!({ "error": "No measurements stored yet", "measurement_count": 0 }),
        ),
        Ok(summary) => (200, json!(summary)),
        Err(e) => store_failure(e),
    }
}

fn handle_stations<Q: StationQueries>(queries: &Q) -> (u16, Value) {
    match queries.stations() {
        Ok(stations) => (200, json!({ "count": stations.len(), "stations": stations })),
        Err(e) => store_failure(e),
    }
}

fn handle_history<Q: StationQueries>(
    queries: &Q,
    station_id: &str,
    query: &HashMap<&str, &str>,
) -> (u16, Value) {
    let Ok(station_id) = station_id.parse::<i32>() else {
        return (
            400,
            json!({ "error": "station_id must be an integer", "station_id": station_id }),
        );
    };
    let hours = match positive_param(query, "hours", DEFAULT_HISTORY_HOURS) {
        Ok(hours) => hours.min(MAX_HISTORY_HOURS),
        Err(response) => return response,
    };

    match queries.station_history(station_id, hours) {
        Ok(rows) => (
            200,
            json!({
                "station_id": station_id,
                "hours": hours,
                "count": rows.len(),
                "measurements": rows,
            }),
        ),
        Err(e) => store_failure(e),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_query(query: &str) -> HashMap<&str, &str> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect()
}

/// Reads an optional positive integer parameter, or a 400 response.
fn positive_param(
    query: &HashMap<&str, &str>,
    name: &str,
    default: i64,
) -> Result<i64, (u16, Value)> {
    match query.get(name) {
        None => Ok(default),
        Some(raw) => match raw.parse::<i64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err((
                400,
                json!({ "error": format!("{} must be a positive integer", name), "value": raw }),
            )),
        },
    }
}

fn store_failure(e: StoreError) -> (u16, Value) {
    if let StoreError::OutOfRange(detail) = &e {
        return (400, json!({ "error": detail }));
    }
    error!(error = %e, "query failed");
    (500, json!({ "error": "Database query failed" }))
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: &Value) -> JsonResponse {
    let body = serde_json::to_string_pretty(json).unwrap_or_else(|_| "{}".to_string());

    let response = tiny_http::Response::from_data(body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(status_code));

    match tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Measurement, MeasurementSummary, Snapshot, StationInfo, StationMeasurement,
    };
    use crate::store::MemoryStore;
    use crate::upsert::warehouse_snapshot;
    use chrono::Utc;

    fn seeded_store() -> MemoryStore {
        let now = Utc::now();
        let mut snapshot = Snapshot::default();
        for (station_id, name) in [(6260, "De Bilt"), (6275, "Hoek van Holland")] {
            snapshot.stations.push(StationInfo {
                station_id,
                name: Some(format!("Meetstation {}", name)),
                latitude: Some(52.1),
                longitude: Some(5.18),
                region: Some("Utrecht".to_string()),
                last_updated: now,
            });
            snapshot.measurements.push(Measurement {
                station_id,
                timestamp: "2024-05-01T13:50:00".to_string(),
                temperature: Some(14.2),
                ground_temperature: None,
                feel_temperature: Some(13.9),
                wind_gusts: Some(6.4),
                wind_force_bft: Some(3),
                humidity: Some(68),
                precipitation: Some(0.0),
                sun_power: Some(410),
                recorded_at: now,
            });
        }

        let store = MemoryStore::new();
        warehouse_snapshot(&store, &snapshot).expect("seeding should succeed");
        store
    }

    struct BrokenStore;

    impl StationQueries for BrokenStore {
        fn recent_measurements(&self, _: i64) -> Result<Vec<StationMeasurement>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn station_history(&self, _: i32, _: i64) -> Result<Vec<StationMeasurement>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn stations(&self) -> Result<Vec<StationInfo>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn measurement_summary(&self) -> Result<MeasurementSummary, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_health() {
        let (status, body) = route(&MemoryStore::new(), "/health");
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
    }

    #[test]
    fn test_latest_measurements_default_limit() {
        let (status, body) = route(&seeded_store(), "/measurements/latest");
        assert_eq!(status, 200);
        assert_eq!(body["count"], 2);
        assert_eq!(body["measurements"][0]["station_id"], 6275, "newest first");
        assert_eq!(body["measurements"][0]["station_name"], "Meetstation Hoek van Holland");
        assert!(body["measurements"][0]["ground_temperature"].is_null());
    }

    #[test]
    fn test_latest_measurements_with_limit() {
        let (status, body) = route(&seeded_store(), "/measurements/latest?limit=1");
        assert_eq!(status, 200);
        assert_eq!(body["count"], 1);
    }

    #[test]
    fn test_latest_rejects_bad_limit() {
        let (status, _) = route(&seeded_store(), "/measurements/latest?limit=abc");
        assert_eq!(status, 400);

        let (status, _) = route(&seeded_store(), "/measurements/latest?limit=0");
        assert_eq!(status, 400);
    }

    #[test]
    fn test_stations() {
        let (status, body) = route(&seeded_store(), "/stations");
        assert_eq!(status, 200);
        assert_eq!(body["count"], 2);
        assert_eq!(body["stations"][0]["station_id"], 6260);
    }

    #[test]
    fn test_station_history() {
        let (status, body) = route(&seeded_store(), "/stations/6260/history?hours=6");
        assert_eq!(status, 200);
        assert_eq!(body["station_id"], 6260);
        assert_eq!(body["hours"], 6);
        assert_eq!(body["count"], 1);

        let (_, body) = route(&seeded_store(), "/stations/9999/history");
        assert_eq!(body["count"], 0);
        assert_eq!(body["hours"], DEFAULT_HISTORY_HOURS);
    }

    #[test]
    fn test_station_history_caps_oversized_window() {
        let (status, body) = route(&seeded_store(), "/stations/6260/history?hours=10000000000");
        assert_eq!(status, 200);
        assert_eq!(body["hours"], MAX_HISTORY_HOURS);
        assert_eq!(body["count"], 1);

        let url = format!("/stations/6260/history?hours={}", i64::MAX);
        let (status, body) = route(&seeded_store(), &url);
        assert_eq!(status, 200);
        assert_eq!(body["hours"], MAX_HISTORY_HOURS);
    }

    #[test]
    fn test_out_of_range_store_error_is_400() {
        let (status, _) = store_failure(StoreError::OutOfRange("window".to_string()));
        assert_eq!(status, 400);
    }

    #[test]
    fn test_summary() {
        let (status, body) = route(&seeded_store(), "/measurements/summary");
        assert_eq!(status, 200);
        assert_eq!(body["measurement_count"], 2);
        assert_eq!(body["hottest"]["station_id"], 6260, "equal temperatures keep the first row");
        assert_eq!(body["average_temperature"], 14.2);
        assert_eq!(body["latest_timestamp"], "2024-05-01T13:50:00");
    }

    #[test]
    fn test_summary_of_empty_store() {
        let (status, body) = route(&MemoryStore::new(), "/measurements/summary");
        assert_eq!(status, 200);
        assert_eq!(body["measurement_count"], 0);
        assert!(body["error"].is_string());
    }

    #[test]
    fn test_station_history_rejects_non_numeric_id() {
        let (status, _) = route(&seeded_store(), "/stations/debilt/history");
        assert_eq!(status, 400);
    }

    #[test]
    fn test_unknown_route() {
        let (status, body) = route(&MemoryStore::new(), "/site/05568500");
        assert_eq!(status, 404);
        assert!(body["available_endpoints"].is_array());
    }

    #[test]
    fn test_store_failure_is_500() {
        let (status, body) = route(&BrokenStore, "/stations");
        assert_eq!(status, 500);
        assert_eq!(body["error"], "Database query failed");
    }

    #[test]
    fn test_parse_query() {
        let query = parse_query("limit=10&flag&hours=");
        assert_eq!(query.get("limit"), Some(&"10"));
        assert_eq!(query.get("flag"), Some(&""));
        assert_eq!(query.get("hours"), Some(&""));
    }
}
