use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{ForgeError, Result};

/// Base name of the daily-rolled service log
pub const SERVICE_LOG_NAME: &str = "clipforge.log";

/// Service log directory, relative to `base`
pub fn log_dir(base: &Path) -> PathBuf {
    base.join(".clipforge").join("log")
}

/// Filter used when `RUST_LOG` is unset.
///
/// Verbose mode opens up this crate and the HTTP layer only; dependencies
/// stay at info.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "info,clipforge=debug,tower_http=debug"
    } else {
        "info"
    }
}

/// Install console and rolling-file output.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the lifetime of the process.
pub fn init(verbose: bool, base: &Path) -> Result<WorkerGuard> {
    let dir = log_dir(base);
    std::fs::create_dir_all(&dir)?;

    let (file_writer, guard) = non_blocking(rolling::daily(&dir, SERVICE_LOG_NAME));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let console = fmt::layer().with_target(verbose).with_thread_ids(verbose);
    let file = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| ForgeError::Config(format!("Failed to initialize logging: {}", e)))?;

    info!("Logging to {}", dir.join(SERVICE_LOG_NAME).display());
    Ok(guard)
}
