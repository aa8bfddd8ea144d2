//! Tracing subscriber setup.
//!
//! Logs go to a daily-rolling file under `${DECKCHAT_HOME}/logs` so the
//! interactive terminal output stays clean. The filter comes from
//! `DECKCHAT_LOG`, then `RUST_LOG`, then the configured level.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Env var consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "DECKCHAT_LOG";

/// Installs the global subscriber writing to `logs_dir`.
///
/// Keep the returned guard alive for the lifetime of the process; dropping
/// it flushes and stops the background writer. Calling this twice leaves the
/// first subscriber in place.
///
/// # Errors
/// Returns an error if the log directory cannot be created.
pub fn init(logs_dir: &Path, default_level: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("create log directory {}", logs_dir.display()))?;

    let appender = tracing_appender::rolling::daily(logs_dir, "deckchat.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_ansi(false)
        .with_target(true)
        .with_writer(writer)
        .try_init();

    Ok(guard)
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}
