//! Logging setup for the console server
//!
//! Events go to a log file (by default next to the executable) and to stderr.

use crate::config::LoggingConfig;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Get the directory containing the executable
fn get_executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Directory the log file is written to.
pub fn log_directory(config: &LoggingConfig) -> PathBuf {
    config.directory.clone().unwrap_or_else(get_executable_dir)
}

/// Filter from `RUST_LOG`, falling back to the configured level.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize file and stderr logging.
///
/// Returns a guard that must be kept alive for the duration of the program
/// to ensure all logs are flushed to disk.
pub fn init_logging(config: &LoggingConfig) -> WorkerGuard {
    let log_dir = log_directory(config);

    let file_appender = tracing_appender::rolling::never(&log_dir, &config.file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_directory_wins() {
        let config = LoggingConfig {
            directory: Some(PathBuf::from("/var/log/console")),
            ..Default::default()
        };
        assert_eq!(log_directory(&config), PathBuf::from("/var/log/console"));
    }

    #[test]
    fn test_invalid_level_falls_back() {
        // Must not panic on a nonsense directive.
        let _ = env_filter("not a [valid filter");
    }
}
