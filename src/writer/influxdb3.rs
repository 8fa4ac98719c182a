//! InfluxDB 3.x backend writer. Talks directly over HTTP: line-protocol
//! writes to `/api/v3/write_lp`, last-timestamp via `/api/v3/query_sql`.
//! There is no registry-stable async InfluxDB 3 client in the reference
//! corpus, so this follows the same bespoke-HTTP pattern the corpus uses
//! for VictoriaMetrics and the vendor client itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::info;

use super::BackendWriter;
use crate::model::Record;

const LOOKBACK_DAYS: i64 = super::LOOKBACK_DAYS;

#[derive(Debug, Clone)]
pub struct InfluxDb3Config {
    pub host: String,
    pub database: String,
    pub token: String,
}

pub struct InfluxDb3Writer {
    config: InfluxDb3Config,
    http: Option<Client>,
    http_query: Option<Client>,
}

impl InfluxDb3Writer {
    pub fn new(config: InfluxDb3Config) -> Self {
        Self {
            config,
            http: None,
            http_query: None,
        }
    }

    fn http(&self) -> anyhow::Result<&Client> {
        self.http
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("influxdb3 writer used before connect()"))
    }

    fn http_query(&self) -> anyhow::Result<&Client> {
        self.http_query
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("influxdb3 writer used before connect()"))
    }

    fn base_url(&self) -> String {
        if self.config.host.starts_with("http") {
            self.config.host.clone()
        } else {
            format!("https://{}", self.config.host)
        }
    }

    fn to_line_protocol(record: &Record) -> String {
        let tags: String = record
            .tags
            .iter()
            .map(|(k, v)| format!(",{}={}", escape_key(k), escape_tag_value(v)))
            .collect();
        let fields: String = record
            .fields
            .iter()
            .map(|(k, v)| format!("{}={v}", escape_key(k)))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}{} {} {}",
            escape_key(&record.measurement),
            tags,
            fields,
            record.timestamp.timestamp_nanos_opt().unwrap_or(0)
        )
    }
}

fn escape_key(s: &str) -> String {
    s.replace(' ', "\\ ").replace(',', "\\,").replace('=', "\\=")
}

fn escape_tag_value(s: &str) -> String {
    escape_key(s)
}

#[async_trait]
impl BackendWriter for InfluxDb3Writer {
    async fn connect(&mut self) -> anyhow::Result<()> {
        if self.http.is_some() {
            return Ok(());
        }
        self.http = Some(Client::builder().timeout(std::time::Duration::from_secs(15)).build()?);
        self.http_query = Some(Client::builder().timeout(std::time::Duration::from_secs(60)).build()?);
        info!(host = %self.config.host, "connected to InfluxDB 3");
        Ok(())
    }

    async fn write(&mut self, records: &[Record]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let http = self.http()?;
        let body = records
            .iter()
            .map(Self::to_line_protocol)
            .collect::<Vec<_>>()
            .join("\n");

        let url = format!("{}/api/v3/write_lp", self.base_url());
        let resp = http
            .post(url)
            .query(&[("db", self.config.database.as_str())])
            .bearer_auth(&self.config.token)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
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
        let sensor_filter = sensor_id
            .map(|id| format!(" AND sensor_id = '{id}'"))
            .unwrap_or_default();
        let sql = format!(
            r#"SELECT max(time) AS last_time FROM "{measurement}" WHERE time > now() - INTERVAL '{LOOKBACK_DAYS} days'{sensor_filter}"#
        );

        let url = format!("{}/api/v3/query_sql", self.base_url());
        let resp = http
            .post(url)
            .bearer_auth(&self.config.token)
            .json(&serde_json::json!({ "db": self.config.database, "q": sql, "format": "json" }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Ok(None);
        }

        let rows: Vec<serde_json::Value> = resp.json().await.unwrap_or_default();
        let last = rows
            .first()
            .and_then(|row| row.get("last_time"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Ok(last)
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.http = None;
        self.http_query = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "influxdb3"
    }
}
