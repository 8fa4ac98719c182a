//! Unified TOML configuration, the Rust analogue of the original's
//! `~/.sensorpushd.conf`. Secrets (vendor login/password) may be supplied
//! via environment variables instead of the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SensorpushdError};

#[derive(Debug, Clone, Deserialize)]
pub struct VendorConfig {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfluxDb2Section {
    #[serde(default = "default_measurement_name")]
    pub measurement_name: String,
    #[serde(default = "default_influxdb2_url")]
    pub url: String,
    pub token: String,
    pub org: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfluxDb3Section {
    #[serde(default = "default_measurement_name")]
    pub measurement_name: String,
    #[serde(default = "default_influxdb3_host")]
    pub host: String,
    #[serde(default = "default_bucket")]
    pub database: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VictoriaMetricsSection {
    #[serde(default = "default_measurement_name")]
    pub measurement_name: String,
    #[serde(default = "default_vm_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSection {
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_poll_backlog")]
    pub poll_backlog: String,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            poll_backlog: default_poll_backlog(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MiscSection {
    #[serde(default)]
    pub my_altitude: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Backends {
    #[serde(default)]
    pub influxdb2: Option<InfluxDb2Section>,
    #[serde(default)]
    pub influxdb3: Option<InfluxDb3Section>,
    #[serde(default)]
    pub victoriametrics: Option<VictoriaMetricsSection>,
}

/// Every backend section present in the config file is an enabled writer —
/// there is no separate "active backend" selector. This lets the daemon fan
/// out to N backends at once, per the pool's `WriterPool` contract; `--backend`
/// on the CLI restricts the set down to one, for operators who only want that.
impl Backends {
    pub fn enabled_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.influxdb2.is_some() {
            names.push("influxdb2");
        }
        if self.influxdb3.is_some() {
            names.push("influxdb3");
        }
        if self.victoriametrics.is_some() {
            names.push("victoriametrics");
        }
        names
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub vendor: VendorConfig,
    #[serde(flatten)]
    pub backends: Backends,
    #[serde(default)]
    pub daemon: DaemonSection,
    #[serde(default)]
    pub misc: MiscSection,
}

fn default_measurement_name() -> String {
    "SensorPush".to_string()
}
fn default_bucket() -> String {
    "sensorpush".to_string()
}
fn default_influxdb2_url() -> String {
    "http://localhost:8086".to_string()
}
fn default_influxdb3_host() -> String {
    "localhost:8181".to_string()
}
fn default_vm_url() -> String {
    "http://localhost:8428".to_string()
}
fn default_interval() -> u64 {
    300
}
fn default_poll_backlog() -> String {
    "10m".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SensorpushdError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config: Config = toml::from_str(&raw)
            .map_err(|e| SensorpushdError::Configuration(format!("invalid config: {e}")))?;

        if config.vendor.login.is_none() {
            config.vendor.login = std::env::var("SENSORPUSHD_LOGIN").ok();
        }
        if config.vendor.password.is_none() {
            config.vendor.password = std::env::var("SENSORPUSHD_PASSWORD").ok();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.vendor.login.is_none() || self.vendor.password.is_none() {
            return Err(SensorpushdError::Configuration(
                "vendor login/password must be set in the config file or via \
                 SENSORPUSHD_LOGIN / SENSORPUSHD_PASSWORD"
                    .to_string(),
            ));
        }

        if self.backends.enabled_names().is_empty() {
            return Err(SensorpushdError::Configuration(
                "no backend configured; add an [influxdb2], [influxdb3] or \
                 [victoriametrics] section"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sensorpushd")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_config_with_no_backend_section() {
        let toml_str = r#"
            [vendor]
            login = "me@example.com"
            password = "hunter2"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_victoriametrics_config() {
        let toml_str = r#"
            [vendor]
            login = "me@example.com"
            password = "hunter2"

            [victoriametrics]
            url = "http://localhost:8428"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.backends.enabled_names(), vec!["victoriametrics"]);
    }

    #[test]
    fn multiple_backend_sections_are_all_enabled_simultaneously() {
        let toml_str = r#"
            [vendor]
            login = "me@example.com"
            password = "hunter2"

            [influxdb2]
            token = "tok"
            org = "org"

            [victoriametrics]
            url = "http://localhost:8428"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.backends.enabled_names(), vec!["influxdb2", "victoriametrics"]);
    }
}
