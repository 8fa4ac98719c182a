//! Integration tests for `VendorClient` against a mocked SensorPush API.

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use sensorpushd::vendor::VendorClient;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_auth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "authorization": "authz-token" })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/accesstoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accesstoken": "access-token" })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn authenticate_then_list_sensors() {
    let server = MockServer::start().await;
    mock_auth(&server).await;

    Mock::given(method("POST"))
        .and(path("/devices/sensors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sensor-a": {
                "id": "sensor-a",
                "name": "Cellar",
                "battery_voltage": 2.9,
                "rssi": -60.0
            }
        })))
        .mount(&server)
        .await;

    let mut client = VendorClient::with_base_url("user@example.com", "hunter2", server.uri()).unwrap();
    let sensors = client.get_sensors().await.unwrap();

    assert_eq!(sensors.len(), 1);
    let sensor = &sensors["sensor-a"];
    assert_eq!(sensor.name, "Cellar");
    assert_eq!(sensor.battery_voltage, Some(2.9));
}

#[tokio::test]
async fn auth_failure_surfaces_as_error_without_retrying_forever() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/authorize"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut client = VendorClient::with_base_url("user@example.com", "wrong", server.uri()).unwrap();
    let result = client.get_sensors().await;

    assert!(result.is_err());
}

#[tokio::test]
async fn get_samples_reports_truncation() {
    let server = MockServer::start().await;
    mock_auth(&server).await;

    Mock::given(method("POST"))
        .and(path("/samples"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sensors": {
                "sensor-a": [
                    { "observed": "2024-01-01T00:00:00+0000", "temperature": 77.0, "humidity": 50.0 }
                ]
            },
            "total_samples": 1,
            "total_sensors": 1,
            "truncated": true
        })))
        .mount(&server)
        .await;

    let mut client = VendorClient::with_base_url("user@example.com", "hunter2", server.uri()).unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let stop = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

    let response = client.get_samples(start, stop, 0, None).await.unwrap();

    assert!(response.truncated);
    assert_eq!(response.total_samples, 1);
    assert_eq!(response.sensors["sensor-a"].len(), 1);
}

#[tokio::test]
async fn get_gateways_returns_empty_map_when_none_registered() {
    let server = MockServer::start().await;
    mock_auth(&server).await;

    Mock::given(method("POST"))
        .and(path("/devices/gateways"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let mut client = VendorClient::with_base_url("user@example.com", "hunter2", server.uri()).unwrap();
    let gateways: HashMap<_, _> = client.get_gateways().await.unwrap();
    assert!(gateways.is_empty());
}
