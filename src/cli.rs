//! Command-line surface: flags mirror the original `parse_args()`, with
//! `--daemon` switching between one-shot and continuous operation.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "sensorpushd",
    about = "Polls the SensorPush cloud API and fans readings out to InfluxDB 2, InfluxDB 3 or VictoriaMetrics"
)]
pub struct Cli {
    /// Path to the config file (default: $XDG_CONFIG_HOME/sensorpushd/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Explicit start time (RFC3339), overrides --backlog
    #[arg(short = 's', long)]
    pub start: Option<String>,

    /// Explicit stop time (RFC3339), defaults to now
    #[arg(short = 'p', long)]
    pub stop: Option<String>,

    /// Historical data to fetch in one-shot mode, e.g. "1d", "12h"
    #[arg(short, long, default_value = "1d")]
    pub backlog: String,

    /// Time slice per vendor query, in minutes
    #[arg(short, long, default_value_t = 720)]
    pub timestep: i64,

    /// Max samples per sensor per query (0 = unlimited)
    #[arg(short = 'q', long = "querylimit", default_value_t = 0)]
    pub qlimit: u32,

    /// Delay in seconds between successive window fetches within a cycle
    #[arg(short, long, default_value_t = 60)]
    pub delay: u64,

    /// Print the sensor list and exit
    #[arg(short = 'l', long)]
    pub list_sensors: bool,

    /// Print the gateway list and exit
    #[arg(short = 'g', long)]
    pub list_gateways: bool,

    /// Restrict collection to these sensor IDs
    #[arg(short = 'i', long)]
    pub sensorlist: Vec<String>,

    /// Skip unit conversion (report vendor units as-is)
    #[arg(short = 'n', long)]
    pub noconvert: bool,

    /// Don't write anything; log what would have been written
    #[arg(short = 'x', long)]
    pub dryrun: bool,

    /// Show full record output in --dryrun (do not truncate)
    #[arg(short, long)]
    pub verbose: bool,

    /// Restrict collection to this single backend, overriding the config
    /// file's set of enabled backend sections (which are fanned out to by
    /// default, one writer per configured section)
    #[arg(long, value_parser = ["influxdb2", "influxdb3", "victoriametrics"])]
    pub backend: Option<String>,

    /// Run as a continuous daemon instead of one-shot
    #[arg(long)]
    pub daemon: bool,

    /// Polling interval in seconds for daemon mode, overrides the config file
    #[arg(long)]
    pub interval: Option<u64>,

    /// Logging verbosity
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log to a file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
