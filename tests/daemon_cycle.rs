//! End-to-end collection cycle: mocked vendor API -> Daemon -> a recording
//! `BackendWriter`, exercising auth, voltage records and sample parsing
//! together the way `run_once` drives them in production.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sensorpushd::daemon::{CycleOptions, Daemon};
use sensorpushd::model::Record;
use sensorpushd::vendor::VendorClient;
use sensorpushd::watchdog::Watchdog;
use sensorpushd::writer::pool::WriterPool;
use sensorpushd::writer::BackendWriter;
use serde_json::json;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingWriter {
    written: Arc<Mutex<Vec<Record>>>,
}

#[async_trait]
impl BackendWriter for RecordingWriter {
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn write(&mut self, records: &[Record]) -> anyhow::Result<()> {
        self.written.lock().unwrap().extend_from_slice(records);
        Ok(())
    }

    async fn query_last_timestamp(
        &mut self,
        _measurement: &str,
        _sensor_id: Option<&str>,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        Ok(None)
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn base_opts() -> CycleOptions {
    CycleOptions {
        daemon_mode: false,
        measurement_name: "SensorPush".to_string(),
        my_altitude: 42.0,
        noconvert: false,
        dryrun: false,
        verbose: false,
        qlimit: 0,
        sensorlist: Vec::new(),
        timestep_minutes: 720,
        inter_window_delay: std::time::Duration::from_secs(0),
        poll_backlog_minutes: 10,
        backlog_minutes: 60,
        explicit_start: None,
        explicit_stop: None,
        interval_seconds: 300,
    }
}

async fn mount_vendor_mocks(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "authorization": "authz" })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/accesstoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accesstoken": "tok" })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/devices/sensors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sensor-a": { "id": "sensor-a", "name": "Cellar", "battery_voltage": 2.9, "rssi": -60.0 }
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/reports/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/samples"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sensors": {
                "sensor-a": [
                    { "observed": "2024-01-01T00:00:00+0000", "temperature": 68.0, "humidity": 45.0 }
                ]
            },
            "total_samples": 1,
            "total_sensors": 1,
            "truncated": false
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn run_once_writes_voltage_and_sample_records() {
    let server = MockServer::start().await;
    mount_vendor_mocks(&server).await;

    let vendor = VendorClient::with_base_url("user@example.com", "hunter2", server.uri()).unwrap();
    let written = Arc::new(Mutex::new(Vec::new()));
    let writer = RecordingWriter { written: written.clone() };
    let pool = WriterPool::new(vec![Box::new(writer)]);
    let (_tx, rx) = watch::channel(false);
    let watchdog = Watchdog::from_env();

    let mut daemon = Daemon::new(vendor, pool, watchdog, rx);
    daemon.run_once(base_opts()).await.unwrap();

    let records = written.lock().unwrap();
    assert!(records.iter().any(|r| r.measurement == "SensorPush_V"));
    assert!(records.iter().any(|r| r.measurement == "SensorPush" && r.fields.contains_key("temperature")));
}

#[tokio::test]
async fn cancellation_before_cycle_stops_window_iteration_cleanly() {
    let server = MockServer::start().await;
    mount_vendor_mocks(&server).await;

    let vendor = VendorClient::with_base_url("user@example.com", "hunter2", server.uri()).unwrap();
    let written = Arc::new(Mutex::new(Vec::new()));
    let writer = RecordingWriter { written: written.clone() };
    let pool = WriterPool::new(vec![Box::new(writer)]);
    let (tx, rx) = watch::channel(false);
    let watchdog = Watchdog::from_env();

    tx.send(true).unwrap();

    let mut daemon = Daemon::new(vendor, pool, watchdog, rx);
    let mut opts = base_opts();
    opts.timestep_minutes = 5;
    let result = daemon.run_once(opts).await;

    assert!(result.is_ok());
    let records = written.lock().unwrap();
    assert!(records.iter().any(|r| r.measurement == "SensorPush_V"));
    assert!(!records.iter().any(|r| r.measurement == "SensorPush" && r.fields.contains_key("temperature")));
}
