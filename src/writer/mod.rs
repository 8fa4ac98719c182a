//! The `BackendWriter` contract and its three concrete implementations.

pub mod influxdb2;
pub mod influxdb3;
pub mod pool;
pub mod victoriametrics;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::Record;

/// 30-day lookback window shared by every writer's last-timestamp query.
pub const LOOKBACK_DAYS: i64 = 30;

/// Contract every concrete backend writer implements. `connect`/`close` are
/// idempotent. `write` is an atomic best-effort batch write; re-sending a
/// point with the same (measurement, tag-set, timestamp) either overwrites
/// or is a no-op (idempotent upsert semantics).
#[async_trait]
pub trait BackendWriter: Send + Sync {
    async fn connect(&mut self) -> anyhow::Result<()>;

    async fn write(&mut self, records: &[Record]) -> anyhow::Result<()>;

    /// Newest timestamp with the given measurement (and, if supplied, tag
    /// `sensor_id == sensor_id`) within the shared lookback window. `None`
    /// if no matching data exists.
    async fn query_last_timestamp(
        &mut self,
        measurement: &str,
        sensor_id: Option<&str>,
    ) -> anyhow::Result<Option<DateTime<Utc>>>;

    async fn close(&mut self) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}
