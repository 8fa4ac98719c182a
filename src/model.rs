//! Core data types shared across the vendor client, the record builder and
//! the backend writers.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A sensor as listed by the vendor at the start of a cycle. Never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct Sensor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub battery_voltage: Option<f64>,
    #[serde(default)]
    pub rssi: Option<f64>,
}

/// A raw sample as returned by the vendor's `/samples` endpoint. Any reading
/// may be absent; callers must tolerate partial samples.
#[derive(Debug, Clone)]
pub struct Sample {
    pub sensor_id: String,
    pub observed: DateTime<Utc>,
    pub readings: HashMap<String, f64>,
}

/// A canonical, backend-agnostic measurement record. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
