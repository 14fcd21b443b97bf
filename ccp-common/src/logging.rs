//! Tracing subscriber setup shared by CCP binaries

use crate::{Error, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// File name stem of the daily error log; the appender adds a `.YYYY-MM-DD` suffix
pub const ERROR_LOG_FILE: &str = "ccp-sync-errors.log";

/// Build the default filter directive for a set of crate targets
///
/// `default_directive("info", &["ccp_sync", "ccp_common"])` yields
/// `ccp_sync=info,ccp_common=info`.
pub fn default_directive(level: &str, targets: &[&str]) -> String {
    targets
        .iter()
        .map(|t| format!("{}={}", t, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Error-level layer appending to a daily-rolling file under `dir`
///
/// Events are written by a background worker; keep the guard alive until
/// exit or buffered lines are lost.
pub fn error_file_layer(
    dir: &Path,
) -> Result<(Box<dyn Layer<Registry> + Send + Sync>, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, ERROR_LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR)
        .boxed();
    Ok((layer, guard))
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured directive. With an
/// `error_log_dir`, error events are also appended to a dated file there and
/// the returned guard must be held for the life of the process.
pub fn init_tracing(directive: &str, error_log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directive, e)))?;

    let (file_layer, guard) = match error_log_dir {
        Some(dir) => {
            let (layer, guard) = error_file_layer(dir)?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {}", e)))?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(
            default_directive("debug", &["ccp_sync", "ccp_common"]),
            "ccp_sync=debug,ccp_common=debug"
        );
    }

    #[test]
    fn test_default_directive_single_target() {
        assert_eq!(default_directive("warn", &["ccp_sync"]), "ccp_sync=warn");
    }
}
