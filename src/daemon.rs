//! Scheduling loop, gap detection, cycle orchestration, signal handling and
//! watchdog notification. This is the core of the collection engine.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::{Result, SensorpushdError};
use crate::model::Sensor;
use crate::record::{build_voltage_records, process_samples};
use crate::vendor::{parse_sample, VendorClient};
use crate::watchdog::Watchdog;
use crate::window::build_windows;
use crate::writer::pool::WriterPool;

const MAXRETRY: u32 = 3;
const RETRYWAIT: StdDuration = StdDuration::from_secs(60);
const WATCHDOG_SLEEP_TICK: StdDuration = StdDuration::from_secs(60);
const MAX_CONSECUTIVE_CYCLE_FAILURES: u32 = 50;
const GAP_FILL_SAFETY_OVERLAP: Duration = Duration::hours(1);

pub struct CycleOptions {
    pub daemon_mode: bool,
    pub measurement_name: String,
    pub my_altitude: f64,
    pub noconvert: bool,
    pub dryrun: bool,
    pub verbose: bool,
    pub qlimit: u32,
    pub sensorlist: Vec<String>,
    pub timestep_minutes: i64,
    pub inter_window_delay: StdDuration,
    pub poll_backlog_minutes: i64,
    pub backlog_minutes: i64,
    pub explicit_start: Option<DateTime<Utc>>,
    pub explicit_stop: Option<DateTime<Utc>>,
    /// Seconds to sleep between daemon cycles (ignored in one-shot mode).
    pub interval_seconds: u64,
}

pub struct Daemon {
    vendor: VendorClient,
    pool: WriterPool,
    watchdog: Watchdog,
    cancel: watch::Receiver<bool>,
}

impl Daemon {
    pub fn new(vendor: VendorClient, pool: WriterPool, watchdog: Watchdog, cancel: watch::Receiver<bool>) -> Self {
        Self { vendor, pool, watchdog, cancel }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Sleep in ≤1s increments so a cancellation is observed within a
    /// second; pings the watchdog every 60s of elapsed sleep.
    async fn interruptible_sleep(&mut self, total: StdDuration) {
        let mut remaining = total;
        let mut since_last_ping = StdDuration::ZERO;
        let tick = StdDuration::from_secs(1);

        while remaining > StdDuration::ZERO {
            if self.is_cancelled() {
                return;
            }
            let step = remaining.min(tick);
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = self.cancel.changed() => {
                    if self.is_cancelled() {
                        return;
                    }
                }
            }
            remaining = remaining.saturating_sub(step);
            since_last_ping += step;
            if since_last_ping >= WATCHDOG_SLEEP_TICK {
                self.watchdog.ping();
                since_last_ping = StdDuration::ZERO;
            }
        }
    }

    pub async fn run_once(&mut self, opts: CycleOptions) -> Result<()> {
        self.pool.connect_all().await?;
        self.watchdog.ready();
        let result = self.collect_cycle(&opts).await;
        self.pool.close_all().await;
        result
    }

    pub async fn run_forever(&mut self, opts: CycleOptions) -> Result<()> {
        self.pool.connect_all().await?;
        self.watchdog.ready();

        let mut consecutive_failures = 0u32;

        while !self.is_cancelled() {
            self.watchdog.ping();
            match self.collect_cycle(&opts).await {
                Ok(()) => {
                    consecutive_failures = 0;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    error!(
                        consecutive_failures,
                        max = MAX_CONSECUTIVE_CYCLE_FAILURES,
                        error = %e,
                        "collection cycle failed"
                    );
                    if consecutive_failures >= MAX_CONSECUTIVE_CYCLE_FAILURES {
                        error!("too many consecutive failures, exiting");
                        self.pool.close_all().await;
                        return Err(e);
                    }
                }
            }

            if self.is_cancelled() {
                break;
            }
            self.interruptible_sleep(StdDuration::from_secs(opts.interval_seconds)).await;
        }

        self.pool.close_all().await;
        info!("daemon stopped");
        Ok(())
    }

    async fn collect_cycle(&mut self, opts: &CycleOptions) -> Result<()> {
        let now = Utc::now();

        self.vendor.ensure_auth().await?;

        let sensors = self.vendor.get_sensors().await?;
        let voltage_records = build_voltage_records(&sensors, &opts.measurement_name, now);
        if opts.dryrun {
            log_dryrun(&voltage_records, opts.verbose);
        } else {
            self.pool.write(&voltage_records).await?;
        }

        match self.vendor.get_reports().await {
            Ok(reports) if !reports.files.is_empty() => {
                info!(count = reports.files.len(), "bulk reports available");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to fetch reports"),
        }

        let (start, stop) = if opts.daemon_mode {
            self.compute_daemon_window(now, opts, &sensors).await
        } else {
            compute_oneshot_window(now, opts)
        };

        let windows = build_windows(start, stop, opts.timestep_minutes);
        let iterations = windows.len();
        info!(start = %start, stop = %stop, iterations, "collection window computed");

        for (i, (window_start, window_end)) in windows.into_iter().enumerate() {
            if self.is_cancelled() {
                info!("shutdown requested, stopping collection");
                break;
            }
            self.fetch_and_write_window(
                window_start,
                window_end,
                i + 1,
                iterations,
                &sensors,
                opts,
            )
            .await?;

            if iterations > 1 && i + 1 < iterations {
                if opts.daemon_mode {
                    self.interruptible_sleep(opts.inter_window_delay).await;
                } else {
                    tokio::time::sleep(opts.inter_window_delay).await;
                }
            }
        }

        Ok(())
    }

    async fn compute_daemon_window(
        &mut self,
        now: DateTime<Utc>,
        opts: &CycleOptions,
        sensors: &HashMap<String, Sensor>,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let timestamps = self
            .pool
            .query_last_timestamps(&opts.measurement_name, sensors)
            .await;

        let oldest = timestamps.into_iter().flatten().min();

        let start = match oldest {
            Some(oldest_ts) => {
                let gap = now - oldest_ts;
                if gap > Duration::minutes(opts.poll_backlog_minutes) {
                    info!(oldest = %oldest_ts, gap_minutes = gap.num_minutes(), "gap detected, fetching backlog");
                    oldest_ts - GAP_FILL_SAFETY_OVERLAP
                } else {
                    now - Duration::minutes(opts.poll_backlog_minutes)
                }
            }
            None => {
                info!(poll_backlog = opts.poll_backlog_minutes, "no existing data found, using poll backlog");
                now - Duration::minutes(opts.poll_backlog_minutes)
            }
        };

        (start, now)
    }

    async fn fetch_and_write_window(
        &mut self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        iteration: usize,
        iterations: usize,
        sensors: &HashMap<String, Sensor>,
        opts: &CycleOptions,
    ) -> Result<()> {
        let sensor_ids: Option<Vec<String>> = if opts.sensorlist.is_empty() {
            None
        } else {
            Some(opts.sensorlist.clone())
        };

        let mut retry_count = 0u32;
        loop {
            info!(iteration, iterations, "fetching samples for window");
            let fetch_result = self
                .vendor
                .get_samples(window_start, window_end, opts.qlimit, sensor_ids.as_deref())
                .await;

            match fetch_result {
                Ok(response) => {
                    info!(
                        truncated = response.truncated,
                        total_samples = response.total_samples,
                        total_sensors = response.total_sensors,
                        "samples fetched"
                    );

                    let mut samples = Vec::new();
                    for (sensor_id, dtos) in &response.sensors {
                        for dto in dtos {
                            match parse_sample(sensor_id, dto) {
                                Ok(sample) => samples.push(sample),
                                Err(e) => warn!(error = %e, "skipping unparseable sample"),
                            }
                        }
                    }

                    let records = process_samples(
                        &samples,
                        sensors,
                        &opts.measurement_name,
                        opts.my_altitude,
                        opts.noconvert,
                    );

                    if opts.dryrun {
                        log_dryrun(&records, opts.verbose);
                    } else {
                        self.pool.write(&records).await?;
                    }

                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    error!(iteration, iterations, error = %e, "error fetching window");

                    if retry_count >= MAXRETRY {
                        if opts.daemon_mode {
                            error!(iteration, "max retries reached, skipping window");
                            return Ok(());
                        } else {
                            return Err(SensorpushdError::TransientApi(format!(
                                "max retries ({MAXRETRY}) reached, stopping: {e}"
                            )));
                        }
                    }
                    info!(retry_count, max = MAXRETRY, "retrying after wait");
                    self.interruptible_sleep(RETRYWAIT).await;
                }
            }
        }
    }
}

fn compute_oneshot_window(now: DateTime<Utc>, opts: &CycleOptions) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = opts
        .explicit_start
        .unwrap_or_else(|| now - Duration::minutes(opts.backlog_minutes));
    let stop = opts.explicit_stop.unwrap_or(now);
    (start, stop)
}

fn log_dryrun(records: &[crate::model::Record], verbose: bool) {
    info!("--- data that would have been written ---");
    let shown = if verbose { records.len() } else { records.len().min(5) };
    for record in &records[..shown] {
        info!(?record, "record");
    }
    if !verbose && records.len() > shown {
        info!(more = records.len() - shown, "additional records omitted");
    }
    info!("--- end of dryrun data ---");
}
