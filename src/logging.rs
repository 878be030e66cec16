//! Per-run log file.
//!
//! Every run writes `<log_dir>/<YYYYMMDD_HHMMSS>_export.log` through a
//! non-blocking writer.  The terminal is left to [`crate::ui`]; nothing here
//! prints.  `RUST_LOG` replaces the default filter.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "mail_export=debug";

/// Keeps the background writer alive; dropping it flushes the file.
pub struct LogHandle {
    _guard: WorkerGuard,
    pub path: PathBuf,
}

/// `<YYYYMMDD_HHMMSS>_export.log`
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("{}_export.log", started.format("%Y%m%d_%H%M%S"))
}

fn open_log_file(log_dir: &Path, started: DateTime<Local>) -> Result<(RollingFileAppender, PathBuf)> {
    fs::create_dir_all(log_dir).with_context(|| format!("creating {}", log_dir.display()))?;
    let stamp = started.format("%Y%m%d_%H%M%S");
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(format!("{stamp}_export"))
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("opening log file in {}", log_dir.display()))?;
    Ok((appender, log_dir.join(log_file_name(started))))
}

/// Install the global subscriber and record the start-up prelude.
pub fn init(log_dir: &Path) -> Result<LogHandle> {
    let (appender, path) = open_log_file(log_dir, Local::now())?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow!(e))
        .context("installing the log subscriber")?;

    tracing::info!(
        app = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "starting"
    );

    Ok(LogHandle { _guard: guard, path })
}
