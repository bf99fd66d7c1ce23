/// buienradar_ingest: Buienradar weather-station ingestion service.
///
/// # Module structure
///
/// ```text
/// buienradar_ingest
/// ├── model       — shared data types (Measurement, StationInfo, Snapshot, NumericField)
/// ├── config      — command line, ingest.toml and defaults
/// ├── db          — DATABASE_URL handling, connection, schema
/// ├── ingest
/// │   ├── buienradar — feed client and snapshot parsing
/// │   └── fixtures (test only) — representative feed payloads
/// ├── impute      — KNN gap filling across stations
/// ├── upsert      — latest-timestamp dedup and transactional warehousing
/// ├── store
/// │   ├── postgres — production store
/// │   └── memory   — in-process store with fault injection
/// ├── schedule    — cancellable drift-accumulating ticker
/// ├── daemon      — ingestion cycle and main loop
/// └── endpoint    — read-only HTTP query API
/// ```

/// Public modules
pub mod config;
pub mod daemon;
pub mod db;
pub mod endpoint;
pub mod impute;
pub mod ingest;
pub mod model;
pub mod schedule;
pub mod store;
pub mod upsert;
