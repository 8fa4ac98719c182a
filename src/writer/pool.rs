//! Owns the configured set of backend writers: connection bookkeeping,
//! write fan-out with independent retry, and reconnection.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::BackendWriter;
use crate::error::{Result, SensorpushdError};
use crate::model::{Record, Sensor};

const CONNECT_BACKOFF: [u64; 5] = [10, 30, 60, 120, 300];
const WRITE_RETRY_DELAYS: [u64; 2] = [5, 10];
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

struct PooledWriter {
    writer: Box<dyn BackendWriter>,
    connected: bool,
    consecutive_failures: u32,
}

pub struct WriterPool {
    writers: Vec<PooledWriter>,
}

impl WriterPool {
    pub fn new(writers: Vec<Box<dyn BackendWriter>>) -> Self {
        Self {
            writers: writers
                .into_iter()
                .map(|writer| PooledWriter {
                    writer,
                    connected: false,
                    consecutive_failures: 0,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Connect every writer using the `{10,30,60,120,300}`s back-off
    /// schedule. Succeeds if at least one writer connects.
    pub async fn connect_all(&mut self) -> Result<()> {
        for pooled in &mut self.writers {
            let name = pooled.writer.name().to_string();
            let mut last_err: Option<anyhow::Error> = None;
            for (attempt, delay) in CONNECT_BACKOFF.iter().enumerate() {
                match pooled.writer.connect().await {
                    Ok(()) => {
                        pooled.connected = true;
                        break;
                    }
                    Err(e) => {
                        warn!(backend = %name, attempt = attempt + 1, error = %e, "backend connect failed");
                        last_err = Some(e);
                        if attempt + 1 < CONNECT_BACKOFF.len() {
                            tokio::time::sleep(Duration::from_secs(*delay)).await;
                        }
                    }
                }
            }
            if !pooled.connected {
                let err = SensorpushdError::BackendConnect {
                    backend: name,
                    source: last_err.unwrap_or_else(|| anyhow::anyhow!("connect() never invoked")),
                };
                error!(error = %err, "giving up on backend after exhausting connect back-off");
            }
        }

        if self.writers.iter().any(|p| p.connected) {
            Ok(())
        } else {
            Err(SensorpushdError::NoBackendAvailable)
        }
    }

    /// Write `records` to every connected writer; reconnect disconnected
    /// writers once per call. Returns `Err` only when every writer failed.
    pub async fn write(&mut self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut any_succeeded = false;

        for pooled in &mut self.writers {
            let name = pooled.writer.name().to_string();

            if !pooled.connected {
                match pooled.writer.connect().await {
                    Ok(()) => pooled.connected = true,
                    Err(e) => {
                        warn!(backend = %name, error = %e, "reconnect attempt failed, skipping this cycle");
                        continue;
                    }
                }
            }

            let mut wrote = false;
            for (attempt, delay) in WRITE_RETRY_DELAYS.iter().enumerate() {
                match pooled.writer.write(records).await {
                    Ok(()) => {
                        wrote = true;
                        pooled.consecutive_failures = 0;
                        break;
                    }
                    Err(e) => {
                        warn!(backend = %name, attempt = attempt + 1, error = %e, "write failed");
                        tokio::time::sleep(Duration::from_secs(*delay)).await;
                    }
                }
            }

            if wrote {
                any_succeeded = true;
            } else {
                pooled.consecutive_failures += 1;
                error!(
                    backend = %name,
                    consecutive_failures = pooled.consecutive_failures,
                    "write failed after retries"
                );
                if pooled.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    warn!(backend = %name, "marking backend disconnected for reconnect next cycle");
                    pooled.connected = false;
                }
            }
        }

        if any_succeeded {
            Ok(())
        } else {
            Err(SensorpushdError::BackendWrite {
                backend: "all".to_string(),
                source: anyhow::anyhow!("every configured backend failed to write this batch"),
            })
        }
    }

    /// Query every connected writer's last-temperature timestamp for every
    /// sensor. Used by the daemon's gap-fill window computation.
    pub async fn query_last_timestamps(
        &mut self,
        measurement: &str,
        sensors: &HashMap<String, Sensor>,
    ) -> Vec<Option<DateTime<Utc>>> {
        let mut results = Vec::new();
        for pooled in &mut self.writers {
            if !pooled.connected {
                continue;
            }
            for sensor_id in sensors.keys() {
                match pooled.writer.query_last_timestamp(measurement, Some(sensor_id)).await {
                    Ok(ts) => results.push(ts),
                    Err(e) => {
                        warn!(backend = %pooled.writer.name(), error = %e, "last-timestamp query failed");
                        results.push(None);
                    }
                }
            }
        }
        results
    }

    pub async fn close_all(&mut self) {
        for pooled in &mut self.writers {
            if let Err(e) = pooled.writer.close().await {
                warn!(backend = %pooled.writer.name(), error = %e, "error closing backend");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn consecutive_failures(&self, index: usize) -> u32 {
        self.writers[index].consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FakeWriter {
        label: &'static str,
        fail_writes: Arc<AtomicU32>,
        write_calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl BackendWriter for FakeWriter {
        async fn connect(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn write(&mut self, _records: &[Record]) -> anyhow::Result<()> {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) > 0 {
                self.fail_writes.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("synthetic failure");
            }
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
            self.label
        }
    }

    fn sample_record() -> Record {
        let mut tags = std::collections::BTreeMap::new();
        tags.insert("sensor_id".to_string(), "s1".to_string());
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("temperature".to_string(), 21.0);
        Record {
            measurement: "SensorPush".to_string(),
            tags,
            fields,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn partial_backend_outage_completes_cycle() {
        let writer1_calls = Arc::new(AtomicU32::new(0));
        let writer2_calls = Arc::new(AtomicU32::new(0));

        let writer1 = FakeWriter {
            label: "writer1",
            fail_writes: Arc::new(AtomicU32::new(2)),
            write_calls: writer1_calls.clone(),
        };
        let writer2 = FakeWriter {
            label: "writer2",
            fail_writes: Arc::new(AtomicU32::new(0)),
            write_calls: writer2_calls.clone(),
        };

        let mut pool = WriterPool::new(vec![Box::new(writer1), Box::new(writer2)]);
        pool.connect_all().await.unwrap();

        let result = pool.write(&[sample_record()]).await;
        assert!(result.is_ok());
        assert_eq!(pool.consecutive_failures(0), 1);
        assert_eq!(pool.consecutive_failures(1), 0);
        assert_eq!(writer1_calls.load(Ordering::SeqCst), 2);
        assert_eq!(writer2_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn all_backends_failing_is_an_error() {
        let writer1 = FakeWriter {
            label: "writer1",
            fail_writes: Arc::new(AtomicU32::new(100)),
            write_calls: Arc::new(AtomicU32::new(0)),
        };
        let mut pool = WriterPool::new(vec![Box::new(writer1)]);
        pool.connect_all().await.unwrap();
        let result = pool.write(&[sample_record()]).await;
        assert!(result.is_err());
    }
}
