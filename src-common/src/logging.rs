//! Platform-specific logging directory resolution and subscriber setup.

use crate::config::LoggingConfig;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "scbridge";

/// Returns the platform-appropriate directory for log files.
///
/// | Platform | Directory |
/// |----------|-----------|
/// | Linux | `$XDG_STATE_HOME/scbridge/logs` or `~/.local/state/scbridge/logs` |
/// | macOS | `~/Library/Logs/scbridge` |
/// | Windows | `%LOCALAPPDATA%\scbridge\logs` |
///
/// Returns `None` when no home directory can be determined.
pub fn log_dir() -> Option<PathBuf> {
    let base = directories::ProjectDirs::from("", "", APP_NAME)?;

    #[cfg(target_os = "linux")]
    {
        Some(
            base.state_dir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| base.data_local_dir().join("state"))
                .join("logs"),
        )
    }

    #[cfg(target_os = "macos")]
    {
        // data_local_dir is ~/Library/Application Support/scbridge
        let library = base
            .data_local_dir()
            .parent()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| base.data_local_dir().to_path_buf());
        Some(library.join("Logs").join(APP_NAME))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Some(base.data_local_dir().join("logs"))
    }
}

/// Ensures the log directory exists, creating it if necessary.
pub fn ensure_log_dir() -> Result<PathBuf, std::io::Error> {
    let dir = log_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine log directory",
        )
    })?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Build the filter: `RUST_LOG` wins, otherwise the configured level.
fn env_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = if verbose { "debug" } else { config.level.as_str() };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr. When `config.file` is set, a daily rolling file
/// (`scbridge.YYYY-MM-DD.log`) is also written to [`log_dir`]; the returned
/// guard must be kept alive to flush it. Calling this twice is harmless, the
/// second call leaves the first subscriber in place.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = if config.file {
        match ensure_log_dir() {
            Ok(dir) => {
                let appender = tracing_appender::rolling::daily(dir, format!("{}.log", APP_NAME));
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!("Failed to create log directory: {}", e);
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter(config, verbose))
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    guard
}
