//! Tracing subscriber setup.
//!
//! `HEXTOK_LOG` overrides the configured filter. When file logging is enabled
//! a daily-rotated log is written under `${HEXTOK_HOME}/logs`; the returned
//! guard must stay alive for buffered lines to be flushed.

use std::{fs, io};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, paths};

const LOG_ENV: &str = "HEXTOK_LOG";
const LOG_FILE_PREFIX: &str = "hextok.log";

fn build_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Safe to call more than once; later calls
/// are no-ops.
///
/// # Errors
/// Returns an error if the log directory cannot be created.
pub fn init(config: &Config) -> Result<Option<WorkerGuard>> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);

    if !config.log_to_file {
        let _ = tracing_subscriber::registry()
            .with(build_filter(config))
            .with(stderr_layer)
            .try_init();
        return Ok(None);
    }

    let dir = paths::logs_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(build_filter(config))
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_falls_back_to_info() {
        let config = Config {
            log_level: "not a [valid filter".to_string(),
            ..Config::default()
        };
        // Must not panic on a malformed directive.
        let filter = build_filter(&config);
        assert!(!filter.to_string().is_empty());
    }
}
