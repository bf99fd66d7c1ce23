/// Test fixtures: representative Buienradar feed payloads.
///
/// Trimmed to the fields the parser reads. Real responses also carry
/// `buienradar`, `forecast` and per-entry fields such as `winddirection`,
/// `visibility` and `airpressure`, which are ignored.
///
/// Entry shape:
///   actual.stationmeasurements[]
///     .stationid       — integer station number
///     .stationname, .regio, .lat, .lon
///     .timestamp       — local ISO 8601 without offset
///     .temperature, .groundtemperature, .feeltemperature, .windgusts,
///     .precipitation   — floats
///     .windspeedBft, .humidity, .sunpower — whole numbers
///
/// A station without a given sensor omits the key or sends `null`.

/// Three stations. Hoek van Holland has no ground temperature (key absent)
/// and no sun power (`null`).
#[cfg(test)]
pub(crate) fn fixture_feed_json() -> &'static str {
    r#"{
      "actual": {
        "actualradarurl": "https://api.buienradar.nl/image/1.0/RadarMapNL?w=500&h=512",
        "sunrise": "2024-05-01T06:13:00",
        "sunset": "2024-05-01T21:01:00",
        "stationmeasurements": [
          {
            "$id": "1",
            "stationid": 6391,
            "stationname": "Meetstation Arcen",
            "lat": 51.5,
            "lon": 6.2,
            "regio": "Venlo",
            "timestamp": "2024-05-01T13:50:00",
            "weatherdescription": "Zwaar bewolkt",
            "winddirection": "ZW",
            "temperature": 14.3,
            "groundtemperature": 13.14,
            "feeltemperature": 14.3,
            "windgusts": 5.2,
            "windspeed": 2.8,
            "windspeedBft": 2,
            "humidity": 71,
            "precipitation": 0.0,
            "sunpower": 540
          },
          {
            "$id": "2",
            "stationid": 6275,
            "stationname": "Meetstation Hoek van Holland",
            "lat": 51.98,
            "lon": 4.1,
            "regio": "Rotterdam",
            "timestamp": "2024-05-01T13:50:00",
            "temperature": 12.8,
            "feeltemperature": 10.94,
            "windgusts": 11.3,
            "windspeedBft": 4,
            "humidity": 80,
            "precipitation": 0.0,
            "sunpower": null
          },
          {
            "$id": "3",
            "stationid": 6260,
            "stationname": "Meetstation De Bilt",
            "lat": 52.1,
            "lon": 5.18,
            "regio": "Utrecht",
            "timestamp": "2024-05-01T13:50:00",
            "temperature": 15.06,
            "groundtemperature": 14.2,
            "feeltemperature": 15.1,
            "windgusts": 4.4,
            "windspeedBft": 2,
            "humidity": 66,
            "precipitation": 0.2,
            "sunpower": 612
          }
        ]
      }
    }"#
}
