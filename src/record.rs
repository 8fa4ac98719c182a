//! Transforms vendor samples and sensor metadata into canonical records.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::model::{Record, Sample, Sensor};
use crate::units::{
    abs_humidity_pressure_aware, abs_humidity_simple, dewpoint_magnus, f_to_c, ft_to_m,
    in_hg_to_mbar, kpa_to_mbar, vpd_from_rh_temp,
};

/// One record per sensor under the `<base>_V` measurement, fields
/// `{voltage, rssi}`. Missing metadata is substituted with 0.0.
pub fn build_voltage_records(
    sensors: &HashMap<String, Sensor>,
    base_measurement: &str,
    now: DateTime<Utc>,
) -> Vec<Record> {
    let measurement = format!("{base_measurement}_V");
    sensors
        .values()
        .map(|sensor| {
            let mut tags = BTreeMap::new();
            tags.insert("sensor_id".to_string(), sensor.id.clone());
            tags.insert("sensor_name".to_string(), sensor.name.clone());

            let mut fields = BTreeMap::new();
            fields.insert("voltage".to_string(), sensor.battery_voltage.unwrap_or(0.0));
            fields.insert("rssi".to_string(), sensor.rssi.unwrap_or(0.0));

            Record {
                measurement: measurement.clone(),
                tags,
                fields,
                timestamp: now,
            }
        })
        .collect()
}

/// One record per (sensor, observation). Records with no fields are
/// dropped, never returned to the caller.
pub fn process_samples(
    samples: &[Sample],
    sensor_index: &HashMap<String, Sensor>,
    base_measurement: &str,
    my_altitude: f64,
    noconvert: bool,
) -> Vec<Record> {
    samples
        .iter()
        .filter_map(|sample| build_one_record(sample, sensor_index, base_measurement, my_altitude, noconvert))
        .collect()
}

fn build_one_record(
    sample: &Sample,
    sensor_index: &HashMap<String, Sensor>,
    base_measurement: &str,
    my_altitude: f64,
    noconvert: bool,
) -> Option<Record> {
    let sensor_name = sensor_index
        .get(&sample.sensor_id)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| sample.sensor_id.clone());

    let mut tags = BTreeMap::new();
    tags.insert("sensor_id".to_string(), sample.sensor_id.clone());
    tags.insert("sensor_name".to_string(), sensor_name);

    let mut fields = BTreeMap::new();

    let humidity = sample.readings.get("humidity").copied();
    if let Some(h) = humidity {
        fields.insert("humidity".to_string(), h);
    }

    let temperature = sample
        .readings
        .get("temperature")
        .map(|f| f_to_c(*f, noconvert));
    if let Some(t) = temperature {
        fields.insert("temperature".to_string(), t);
    }

    let pressure = sample
        .readings
        .get("barometric_pressure")
        .map(|p| in_hg_to_mbar(*p, noconvert));
    if let Some(p) = pressure {
        fields.insert("pressure".to_string(), p);
    }

    // Derived absolute humidity requires both humidity and temperature;
    // the original implementation reads an unset `temperature` variable
    // here when temperature is missing, a latent bug. We guard instead:
    // skip the derived field rather than compute garbage.
    if let (Some(h), Some(t)) = (humidity, temperature) {
        let abs_humidity = match pressure {
            Some(p) => abs_humidity_pressure_aware(h, t, p),
            None => abs_humidity_simple(h, t),
        };
        fields.insert("abs_humidity".to_string(), abs_humidity);
    }

    let altitude = sample
        .readings
        .get("altitude")
        .map(|a| ft_to_m(*a, noconvert))
        .filter(|a| *a != 0.0)
        .unwrap_or(my_altitude);
    fields.insert("altitude".to_string(), altitude);

    if let Some(d) = sample.readings.get("distance") {
        fields.insert("distance".to_string(), ft_to_m(*d, noconvert));
    }

    match sample.readings.get("dewpoint") {
        Some(d) => {
            fields.insert("dewpoint".to_string(), f_to_c(*d, noconvert));
        }
        None => {
            if let (Some(h), Some(t)) = (humidity, temperature) {
                fields.insert("dewpoint".to_string(), dewpoint_magnus(h, t));
            }
        }
    }

    match sample.readings.get("vpd") {
        Some(v) => {
            fields.insert("vpd".to_string(), kpa_to_mbar(*v, noconvert));
        }
        None => {
            if let (Some(h), Some(t)) = (humidity, temperature) {
                fields.insert("vpd".to_string(), vpd_from_rh_temp(h, t, noconvert));
            }
        }
    }

    if fields.is_empty() {
        return None;
    }

    Some(Record {
        measurement: base_measurement.to_string(),
        tags,
        fields,
        timestamp: sample.observed,
    })
}
