//! Structured logging setup, the Rust analogue of the original's
//! `setup_logging()`: a configurable level, optional log file, and (unlike
//! the original) a `RUST_LOG` env-filter escape hatch for per-module tuning.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

pub fn init(level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            subscriber.with_writer(file).init();
        }
        None => {
            subscriber.with_writer(std::io::stderr).init();
        }
    }

    Ok(())
}
