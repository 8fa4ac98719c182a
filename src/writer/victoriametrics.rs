//! VictoriaMetrics backend writer: one JSON object per (sensor, field,
//! timestamp) posted as newline-delimited JSON to the native import
//! endpoint. Last-timestamp via a MetricsQL `tslast_over_time()` query.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde_json::json;
use tracing::info;

use super::{BackendWriter, LOOKBACK_DAYS};
use crate::model::Record;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub url: String,
}

pub struct VmWriter {
    config: VmConfig,
    http: Option<Client>,
    http_query: Option<Client>,
}

impl VmWriter {
    pub fn new(config: VmConfig) -> Self {
        Self {
            config,
            http: None,
            http_query: None,
        }
    }

    fn http(&self) -> anyhow::Result<&Client> {
        self.http
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("victoriametrics writer used before connect()"))
    }

    fn http_query(&self) -> anyhow::Result<&Client> {
        self.http_query
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("victoriametrics writer used before connect()"))
    }

    fn to_json_lines(record: &Record) -> Vec<String> {
        let timestamp_ms = record.timestamp.timestamp_millis();
        record
            .fields
            .iter()
            .map(|(field_name, field_value)| {
                let mut metric = serde_json::Map::new();
                metric.insert(
                    "__name__".to_string(),
                    json!(format!("{}_{}", record.measurement, field_name)),
                );
                for (tag_key, tag_value) in &record.tags {
                    metric.insert(tag_key.clone(), json!(tag_value));
                }
                json!({
                    "metric": metric,
                    "values": [field_value],
                    "timestamps": [timestamp_ms],
                })
                .to_string()
            })
            .collect()
    }
}

#[async_trait]
impl BackendWriter for VmWriter {
    async fn connect(&mut self) -> anyhow::Result<()> {
        if self.http.is_some() {
            return Ok(());
        }
        self.http = Some(Client::builder().timeout(std::time::Duration::from_secs(15)).build()?);
        self.http_query = Some(Client::builder().timeout(std::time::Duration::from_secs(60)).build()?);
        info!(url = %self.config.url, "VictoriaMetrics writer ready");
        Ok(())
    }

    async fn write(&mut self, records: &[Record]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let http = self.http()?;
        let lines: Vec<String> = records.iter().flat_map(Self::to_json_lines).collect();
        if lines.is_empty() {
            return Ok(());
        }

        let url = format!("{}/api/v1/import", self.config.url);
        let resp = http
            .post(url)
            .header("Content-Type", "application/json")
            .body(lines.join("\n"))
            .send()
            .await?;
        resp.error_for_status_ref()?;
        Ok(())
    }

    async fn query_last_timestamp(
        &mut self,
        measurement: &str,
        sensor_id: Option<&str>,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        let http = self.http_query()?;
        let selector = match sensor_id {
            Some(id) => format!(r#"{measurement}_temperature{{sensor_id="{id}"}}[{LOOKBACK_DAYS}d]"#),
            None => format!("{measurement}_temperature[{LOOKBACK_DAYS}d]"),
        };
        let query = format!("tslast_over_time({selector})");

        let url = format!("{}/api/v1/query", self.config.url);
        let resp = http
            .get(url)
            .query(&[("query", query.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Ok(None);
        }

        let body: serde_json::Value = resp.json().await?;
        let results = body
            .get("data")
            .and_then(|d| d.get("result"))
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        let ts = results
            .first()
            .and_then(|r| r.get("value"))
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.get(1))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok());

        Ok(ts.and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single()))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.http = None;
        self.http_query = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "victoriametrics"
    }
}
