//! Logging initialization using the `tracing` ecosystem.
//!
//! Provides:
//! - Console output (colored, human-readable)
//! - File output (daily rotation via `tracing-appender`, written off-thread)
//! - Configurable log level via env var `RUST_LOG` or explicit parameter

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start. When `log_dir` is configured the
/// returned guard must be held for the lifetime of the process, otherwise
/// buffered file output is lost on exit.
///
/// # Parameters
///
/// - `log_level`: default level if `RUST_LOG` env var is not set (e.g. `"info"`)
/// - `config`: log directory and file prefix
pub fn init_logging(log_level: &str, config: &LogConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer().with_target(true).with_thread_ids(true).with_ansi(true);

    match config.log_dir.as_deref() {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, &config.module_name);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true).with_thread_ids(true);

            tracing_subscriber::registry().with(env_filter).with(console_layer).with(file_layer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(env_filter).with(console_layer).init();
            None
        }
    }
}
