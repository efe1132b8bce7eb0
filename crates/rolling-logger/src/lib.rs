//! Rolling Logger
//!
//! Installs a global `tracing` subscriber that writes human readable lines to
//! stderr and to a bounded, size-rotated set of files in the log directory:
//! `<app>.log` is the live file, `<app>.1.log` the previous one and so on up
//! to [`DEFAULT_MAX_FILES`]. Records emitted through the `log` facade are
//! bridged into the same subscriber.

mod writer;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

pub use writer::RollingWriter;

/// Rotate once the live file would grow past this size
pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Live file plus rotated files kept on disk
pub const DEFAULT_MAX_FILES: usize = 5;

/// Errors raised while installing or using the logger
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("failed to prepare log file in {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("a global logger is already installed")]
    AlreadyInitialized,
    #[error("logger has not been initialized")]
    NotInitialized,
}

static INSTALLED: OnceLock<String> = OnceLock::new();

/// Install the global logger for `app_name`, writing files under `log_dir`.
#[cfg(not(target_os = "android"))]
pub fn init_logger(log_dir: impl AsRef<Path>, app_name: &str) -> Result<(), LoggerError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let writer = RollingWriter::open(log_dir, app_name, DEFAULT_MAX_BYTES, DEFAULT_MAX_FILES)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)?;

    INSTALLED
        .set(app_name.to_string())
        .map_err(|_| LoggerError::AlreadyInitialized)?;
    tracing::info!(app = app_name, "logger initialized");
    Ok(())
}

/// Android has no writable log directory we control; route to logcat instead.
#[cfg(target_os = "android")]
pub fn init_logger(_log_dir: impl AsRef<Path>, app_name: &str) -> Result<(), LoggerError> {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Info)
            .with_tag(app_name),
    );
    INSTALLED
        .set(app_name.to_string())
        .map_err(|_| LoggerError::AlreadyInitialized)?;
    log::info!("logger initialized");
    Ok(())
}

/// Write a single informational line tagged with the application name
pub fn info(message: &str) -> Result<(), LoggerError> {
    let app = INSTALLED.get().ok_or(LoggerError::NotInitialized)?;
    tracing::info!(app = %app, "{}", message);
    Ok(())
}

/// Write a single error line tagged with the application name
pub fn error(message: &str) -> Result<(), LoggerError> {
    let app = INSTALLED.get().ok_or(LoggerError::NotInitialized)?;
    tracing::error!(app = %app, "{}", message);
    Ok(())
}
