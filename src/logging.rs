use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

pub const LOG_FILE_NAME: &str = "dbrelay.log";

/// Default log directory under the platform config dir
pub fn default_log_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dbrelay")
        .join("logs")
}

/// Install the global subscriber: console output plus, when `log_dir` is
/// given, a daily-rolling file. Filter comes from `RUST_LOG`, default `info`.
///
/// Keep the returned guard alive for as long as file logging is needed.
pub fn init(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let console = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_target(false);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(console)
            .with(filter)
            .try_init()?;
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(console)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(non_blocking),
        )
        .with(filter)
        .try_init()?;

    tracing::info!("Logging to {:?}", log_dir.join(LOG_FILE_NAME));
    Ok(Some(guard))
}
