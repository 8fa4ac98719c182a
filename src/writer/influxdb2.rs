//! InfluxDB 2.x backend writer: line-protocol writes via the `influxdb2`
//! crate, last-timestamp queries via Flux `last()`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use futures::stream;
use influxdb2::models::Query;
use influxdb2::{Client, FromDataPoint};
use tracing::info;

use super::{BackendWriter, LOOKBACK_DAYS};
use crate::model::Record;

const WRITE_TIMEOUT: Duration = Duration::from_secs(60);
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct InfluxDb2Config {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

pub struct InfluxDb2Writer {
    config: InfluxDb2Config,
    client: Option<Client>,
}

impl InfluxDb2Writer {
    pub fn new(config: InfluxDb2Config) -> Self {
        Self { config, client: None }
    }

    fn client(&self) -> anyhow::Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("influxdb2 writer used before connect()"))
    }
}

#[derive(Debug, Default, FromDataPoint)]
struct LastTimeRow {
    #[allow(dead_code)]
    time: DateTime<FixedOffset>,
}

#[async_trait]
impl BackendWriter for InfluxDb2Writer {
    async fn connect(&mut self) -> anyhow::Result<()> {
        if self.client.is_some() {
            return Ok(());
        }
        let client = Client::new(&self.config.url, &self.config.org, &self.config.token);
        self.client = Some(client);
        info!(url = %self.config.url, "connected to InfluxDB 2");
        Ok(())
    }

    async fn write(&mut self, records: &[Record]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let client = self.client()?;
        let bucket = self.config.bucket.clone();

        let points = records
            .iter()
            .map(|record| {
                let mut builder = influxdb2::models::DataPoint::builder(record.measurement.clone());
                for (k, v) in &record.tags {
                    builder = builder.tag(k.clone(), v.clone());
                }
                for (k, v) in &record.fields {
                    builder = builder.field(k.clone(), *v);
                }
                builder
                    .timestamp(record.timestamp.timestamp_nanos_opt().unwrap_or(0))
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        tokio::time::timeout(WRITE_TIMEOUT, client.write(&bucket, stream::iter(points)))
            .await
            .map_err(|_| anyhow::anyhow!("influxdb2 write timed out after {WRITE_TIMEOUT:?}"))??;
        Ok(())
    }

    async fn query_last_timestamp(
        &mut self,
        measurement: &str,
        sensor_id: Option<&str>,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        let client = self.client()?;
        let sensor_filter = sensor_id
            .map(|id| format!(r#" and r.sensor_id == "{id}""#))
            .unwrap_or_default();
        let flux = format!(
            r#"from(bucket: "{bucket}")
                |> range(start: -{days}d)
                |> filter(fn: (r) => r._measurement == "{measurement}" and r._field == "temperature"{sensor_filter})
                |> keep(columns: ["_time"])
                |> last()"#,
            bucket = self.config.bucket,
            days = LOOKBACK_DAYS,
        );

        let rows: Vec<LastTimeRow> = tokio::time::timeout(QUERY_TIMEOUT, client.query(Some(Query::new(flux))))
            .await
            .map_err(|_| anyhow::anyhow!("influxdb2 query timed out after {QUERY_TIMEOUT:?}"))?
            .unwrap_or_default();
        Ok(rows.into_iter().next().map(|r| r.time.with_timezone(&Utc)))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.client = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "influxdb2"
    }
}
