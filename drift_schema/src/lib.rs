//! Wire types exchanged between the aggregation core and its collaborators.
//!
//! Readings arrive from the telemetry store, particle samples arrive from the
//! drift engine, and lander records leave towards whatever sink the run is
//! configured with.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier of a sensor location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpatialKey(pub String);

impl SpatialKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a fixed sensor position, rounded to six decimals.
    pub fn from_coordinates(lat: f64, lon: f64) -> Self {
        Self(format!("{:.6},{:.6}", lat, lon))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpatialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpatialKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Raw timestamped sensor observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub key: SpatialKey,
    pub values: HashMap<String, f64>,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, key: impl Into<SpatialKey>) -> Self {
        Self {
            timestamp,
            key: key.into(),
            values: HashMap::new(),
        }
    }

    pub fn with_value(mut self, channel: &str, value: f64) -> Self {
        self.values.insert(channel.to_string(), value);
        self
    }
}

/// A single particle evaluated by the drift engine at one time step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleSample {
    pub values: HashMap<String, f64>,
    pub lat: f64,
    pub lon: f64,
    pub simulated_time: DateTime<Utc>,
}

impl ParticleSample {
    pub fn new(lat: f64, lon: f64, simulated_time: DateTime<Utc>) -> Self {
        Self {
            values: HashMap::new(),
            lat,
            lon,
            simulated_time,
        }
    }

    pub fn with_value(mut self, channel: &str, value: f64) -> Self {
        self.values.insert(channel.to_string(), value);
        self
    }
}

/// One finalized hour of one lander cell.
///
/// Channel values are flattened into the record so the serialized object reads
/// `{"record_time": .., "salinity": .., "temperature": .., "grid_id": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanderRecord {
    pub record_time: DateTime<Utc>,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
    pub grid_id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn spatial_key_from_coordinates_is_stable() {
        let key = SpatialKey::from_coordinates(59.658233, 10.624583);
        assert_eq!(key.as_str(), "59.658233,10.624583");
        assert_eq!(key, SpatialKey::from_coordinates(59.6582330001, 10.6245829999));
    }

    #[test]
    fn lander_record_flattens_channels() {
        let mut values = BTreeMap::new();
        values.insert("salinity".to_string(), 21.5);
        values.insert("temperature".to_string(), 8.25);
        let record = LanderRecord {
            record_time: Utc.with_ymd_and_hms(2023, 4, 12, 15, 0, 0).unwrap(),
            values,
            grid_id: 7,
        };

        let json = serde_json::to_value(&record).expect("serialize record");
        assert_eq!(json["grid_id"], 7);
        assert_eq!(json["salinity"], 21.5);
        assert_eq!(json["temperature"], 8.25);
        assert_eq!(json["record_time"], "2023-04-12T15:00:00Z");

        let back: LanderRecord = serde_json::from_value(json).expect("deserialize record");
        assert_eq!(back, record);
    }

    #[test]
    fn reading_parses_from_json() {
        let json = r#"{
            "timestamp": "2023-04-12T10:15:00Z",
            "key": "59.658233,10.624583",
            "values": {"temperature": 7.5, "conductivity": 31.0}
        }"#;
        let reading: Reading = serde_json::from_str(json).expect("parse reading");
        assert_eq!(reading.key, SpatialKey::from("59.658233,10.624583"));
        assert_eq!(reading.values["conductivity"], 31.0);
    }
}
