//! Logging infrastructure for auditflow
//!
//! Logs go to stdout by default, which is what a platform log drain expects.
//! When `logging.directory` is configured they are written to a daily-rotated
//! `auditflow.log` in that directory instead.

use crate::config::LoggingConfig;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_FILE_NAME: &str = "auditflow.log";

/// Initialize the logging system
///
/// Sets up tracing with:
/// - stdout output, or file output with daily rotation when a directory is set
/// - Configurable log level via config or RUST_LOG env var
pub fn init(config: &LoggingConfig) -> crate::error::Result<LoggingGuard> {
    // Build the filter from config or env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let guard = match &config.directory {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;

            let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);

            // Non-blocking writer so stages never stall on disk IO
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .init();

            tracing::info!(
                log_dir = %log_dir.display(),
                level = %config.level,
                "Logging initialized"
            );
            Some(guard)
        }
        None => {
            let stdout_layer = fmt::layer().with_target(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .init();

            tracing::info!(level = %config.level, "Logging initialized");
            None
        }
    };

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests (logs to stdout)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}
