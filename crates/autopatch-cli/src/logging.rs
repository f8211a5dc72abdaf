use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

pub(crate) fn default_app_dir() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows data directory")?;
        return Ok(PathBuf::from(app_data).join("Autopatch"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve data directory")?;
    Ok(PathBuf::from(home).join(".autopatch"))
}

pub(crate) fn default_log_dir() -> Result<PathBuf> {
    Ok(default_app_dir()?.join("logs"))
}

pub(crate) fn default_config_path() -> Result<PathBuf> {
    Ok(default_app_dir()?.join("config.toml"))
}

/// Shared suffix for the log file and the report of one run.
pub(crate) fn run_stamp(started_at: DateTime<Local>) -> String {
    started_at.format("%Y%m%d_%H%M%S").to_string()
}

pub(crate) fn log_file_path(log_dir: &Path, stamp: &str) -> PathBuf {
    log_dir.join(format!("update_log_{stamp}.log"))
}

pub(crate) fn report_file_path(log_dir: &Path, stamp: &str) -> PathBuf {
    log_dir.join(format!("run_report_{stamp}.json"))
}

/// Installs the process-wide subscriber: human-readable events on stderr and
/// a plain copy of every event in `log_file`. `RUST_LOG` overrides the level.
pub(crate) fn init_logging(log_file: &Path) -> Result<()> {
    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
    }
    let file = File::create(log_file)
        .with_context(|| format!("failed to create log file: {}", log_file.display()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .try_init()
        .context("failed to install log subscriber")?;
    Ok(())
}
