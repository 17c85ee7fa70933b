use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with a daily-rotating file appender plus a console
/// layer for interactive use.
///
/// Honors `RUST_LOG` when set, otherwise falls back to `debug` or `info`
/// depending on `debug_mode`. Returns a guard that must stay alive for
/// the lifetime of the process so buffered log lines are flushed.
pub fn init(log_dir: &str, debug_mode: bool) -> Result<WorkerGuard> {
    let dir = Utf8Path::new(log_dir);
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {log_dir}"))?;
    }

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, "botdeck"));

    let default_level = if debug_mode { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::info!(log_dir, debug_mode, "logging initialized");

    Ok(guard)
}
