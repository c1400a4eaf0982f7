//! Logging setup for the warehouse loader
//!
//! Logs go to stderr and, unless disabled, to two daily-rolling files:
//!
//! - `games-warehouse.<date>.log`: everything at or above the active level
//! - `error.<date>.log`: warnings and errors only
//!
//! ```no_run
//! use games_warehouse::config::LogSettings;
//! use games_warehouse::logging;
//!
//! logging::init(&LogSettings::default()).expect("Failed to initialize logging");
//! tracing::info!(rows = 42, "Loaded extract");
//! ```

use crate::config::LogSettings;
use anyhow::{Context as _, Result};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const APP_DIR: &str = "games-warehouse";

/// Resolves the log directory, creating it if needed.
///
/// Without an override this is `<data dir>/games-warehouse/logs`, e.g.
/// `~/.local/share/games-warehouse/logs` on Linux.
pub fn get_log_dir(settings: &LogSettings) -> Result<PathBuf> {
    let log_dir = match &settings.dir {
        Some(dir) => dir.clone(),
        None => dirs::data_dir()
            .context("Failed to determine data directory")?
            .join(APP_DIR)
            .join("logs"),
    };

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }

    Ok(log_dir)
}

fn env_filter(default_level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("Failed to create env filter")
}

/// Installs the global subscriber. Call once, before any pipeline work.
///
/// # Errors
///
/// Returns error if the log directory cannot be created or a file appender
/// fails to open.
pub fn init(settings: &LogSettings) -> Result<()> {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(false)
        .compact();

    if !settings.file_logging {
        tracing_subscriber::registry()
            .with(env_filter(&settings.level)?)
            .with(console_layer)
            .init();
        return Ok(());
    }

    let log_dir = get_log_dir(settings)?;

    let all_logs_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix(APP_DIR)
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create all-logs file appender")?;

    let error_logs_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix("error")
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create error-logs file appender")?;

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(all_logs_appender);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(error_logs_appender)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter(&settings.level)?)
        .with(console_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .init();

    tracing::debug!("Logging initialized, log directory: {}", log_dir.display());

    Ok(())
}
