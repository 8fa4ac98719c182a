use std::collections::HashMap;

use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use sensorpushd::cli::Cli;
use sensorpushd::config::{self, Config};
use sensorpushd::daemon::{CycleOptions, Daemon};
use sensorpushd::error::SensorpushdError;
use sensorpushd::logging;
use sensorpushd::model;
use sensorpushd::vendor::{self, VendorClient};
use sensorpushd::watchdog::Watchdog;
use sensorpushd::window::parse_backlog;
use sensorpushd::writer::influxdb2::{InfluxDb2Config, InfluxDb2Writer};
use sensorpushd::writer::influxdb3::{InfluxDb3Config, InfluxDb3Writer};
use sensorpushd::writer::pool::WriterPool;
use sensorpushd::writer::victoriametrics::{VmConfig, VmWriter};
use sensorpushd::writer::BackendWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.log_level, cli.log_file.as_ref()) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let config = Config::load(&config_path)?;

    let backend_names: Vec<&str> = match cli.backend.as_deref() {
        Some(name) => vec![name],
        None => config.backends.enabled_names(),
    };

    let login = config.vendor.login.clone().expect("validated at config load");
    let password = config.vendor.password.clone().expect("validated at config load");
    let mut vendor = VendorClient::new(login, password)?;

    if cli.list_sensors || cli.list_gateways {
        vendor.ensure_auth().await?;
        if cli.list_sensors {
            let sensors = vendor.get_sensors().await?;
            print_sensors(&sensors);
        }
        if cli.list_gateways {
            let gateways = vendor.get_gateways().await?;
            print_gateways(&gateways);
        }
        return Ok(());
    }

    if backend_names.is_empty() {
        return Err(SensorpushdError::Configuration(
            "no backend enabled; add an [influxdb2], [influxdb3] or [victoriametrics] section \
             or pass --backend"
                .to_string(),
        )
        .into());
    }

    // Every enabled section becomes its own writer; WriterPool fans the same
    // record batch out to all of them with independent retry/reconnect.
    let mut writers: Vec<Box<dyn BackendWriter>> = Vec::with_capacity(backend_names.len());
    let mut measurement_name: Option<String> = None;
    for &name in &backend_names {
        let (measurement, writer) = build_writer(name, &config)?;
        measurement_name.get_or_insert(measurement);
        writers.push(writer);
    }
    let measurement_name = measurement_name.expect("backend_names is non-empty");

    let pool = WriterPool::new(writers);
    let watchdog = Watchdog::from_env();
    let (cancel_tx, cancel_rx) = watch::channel(false);

    install_signal_handlers(cancel_tx);

    let mut daemon_handle = Daemon::new(vendor, pool, watchdog, cancel_rx);

    let backlog_minutes = parse_backlog(&cli.backlog)?;
    let poll_backlog_minutes = parse_backlog(&config.daemon.poll_backlog)?;
    let interval_seconds = cli.interval.unwrap_or(config.daemon.interval);

    let explicit_start = parse_optional_timestamp(cli.start.as_deref())?;
    let explicit_stop = parse_optional_timestamp(cli.stop.as_deref())?;

    let opts = CycleOptions {
        daemon_mode: cli.daemon,
        measurement_name,
        my_altitude: config.misc.my_altitude,
        noconvert: cli.noconvert,
        dryrun: cli.dryrun,
        verbose: cli.verbose,
        qlimit: cli.qlimit,
        sensorlist: cli.sensorlist,
        timestep_minutes: cli.timestep,
        inter_window_delay: std::time::Duration::from_secs(cli.delay),
        poll_backlog_minutes,
        backlog_minutes,
        explicit_start,
        explicit_stop,
        interval_seconds,
    };

    if cli.daemon {
        info!(interval_seconds, "starting sensorpushd daemon");
        daemon_handle.run_forever(opts).await?;
    } else {
        daemon_handle.run_once(opts).await?;
    }

    Ok(())
}

/// Build the writer for one enabled backend section, returning its
/// configured measurement name alongside it.
fn build_writer(name: &str, config: &Config) -> Result<(String, Box<dyn BackendWriter>), SensorpushdError> {
    match name {
        "influxdb2" => {
            let section = config
                .backends
                .influxdb2
                .clone()
                .ok_or_else(|| SensorpushdError::Configuration("missing [influxdb2] section".into()))?;
            let measurement = section.measurement_name.clone();
            let cfg = InfluxDb2Config {
                url: section.url,
                token: section.token,
                org: section.org,
                bucket: section.bucket,
            };
            Ok((measurement, Box::new(InfluxDb2Writer::new(cfg))))
        }
        "influxdb3" => {
            let section = config
                .backends
                .influxdb3
                .clone()
                .ok_or_else(|| SensorpushdError::Configuration("missing [influxdb3] section".into()))?;
            let measurement = section.measurement_name.clone();
            let cfg = InfluxDb3Config {
                host: section.host,
                database: section.database,
                token: section.token,
            };
            Ok((measurement, Box::new(InfluxDb3Writer::new(cfg))))
        }
        "victoriametrics" => {
            let section = config
                .backends
                .victoriametrics
                .clone()
                .ok_or_else(|| SensorpushdError::Configuration("missing [victoriametrics] section".into()))?;
            let measurement = section.measurement_name.clone();
            let cfg = VmConfig { url: section.url };
            Ok((measurement, Box::new(VmWriter::new(cfg))))
        }
        other => Err(SensorpushdError::Configuration(format!("unknown backend '{other}'"))),
    }
}

fn parse_optional_timestamp(s: Option<&str>) -> Result<Option<DateTime<Utc>>, SensorpushdError> {
    match s {
        None => Ok(None),
        Some(s) => DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z")
            .or_else(|_| DateTime::parse_from_rfc3339(s))
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| SensorpushdError::InvalidTimestamp(s.to_string(), e.to_string())),
    }
}

fn install_signal_handlers(cancel_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
            .expect("failed to install SIGHUP handler");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("received SIGINT, shutting down gracefully");
                    let _ = cancel_tx.send(true);
                    return;
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down gracefully");
                    let _ = cancel_tx.send(true);
                    return;
                }
                _ = sighup.recv() => {
                    info!("received SIGHUP, deferring (no hot reload in this revision)");
                }
            }
        }
    });
}

fn print_sensors(sensors: &HashMap<String, model::Sensor>) {
    for sensor in sensors.values() {
        println!("---------------{}---------------", sensor.name);
        println!("id: {}", sensor.id);
        println!("battery_voltage: {:?}", sensor.battery_voltage);
        println!("rssi: {:?}", sensor.rssi);
    }
}

fn print_gateways(gateways: &HashMap<String, vendor::types::GatewayDto>) {
    for (id, gateway) in gateways {
        println!("---------------{}---------------", gateway.name);
        println!("id: {id}");
        println!("last_seen: {:?}", gateway.last_seen);
        println!("last_alert: {:?}", gateway.last_alert);
        println!("paired: {:?}", gateway.paired);
        println!("version: {:?}", gateway.version);
    }
}
