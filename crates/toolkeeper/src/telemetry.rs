//! Structured telemetry initialisation.
//!
//! Records go to stderr in the configured format and are appended to the log
//! sink so `logs` can read them back later.

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

use toolkeeper_config::{Config, LogFormat};

static TELEMETRY_GUARD: OnceCell<PathBuf> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryHandle {
    log_path: PathBuf,
}

impl TelemetryHandle {
    /// File receiving a copy of every record.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to open the log sink.
    #[error("failed to open log file '{path}': {source}")]
    LogFile {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[source] TryInitError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent and report the sink chosen by the first
/// call.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid, the log file cannot
/// be opened, or another subscriber is already installed.
pub fn initialise(config: &Config, log_path: &Path) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| {
            install_subscriber(config, log_path)?;
            Ok(log_path.to_path_buf())
        })
        .map(|path| TelemetryHandle {
            log_path: path.clone(),
        })
}

fn install_subscriber(config: &Config, log_path: &Path) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let sink = open_sink(log_path)?;
    let ansi = io::stderr().is_terminal();
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format() {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(io::stderr)
                    .with_timer(UtcTime::rfc_3339()),
            )
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(sink)
                    .with_timer(UtcTime::rfc_3339()),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_writer(io::stderr)
                    .with_ansi(ansi)
                    .with_timer(UtcTime::rfc_3339()),
            )
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(sink)
                    .with_timer(UtcTime::rfc_3339()),
            )
            .try_init(),
    };
    installed.map_err(TelemetryError::Subscriber)
}

fn open_sink(path: &Path) -> Result<Arc<File>, TelemetryError> {
    let log_error = |source| TelemetryError::LogFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(log_error)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_error)?;
    Ok(Arc::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn initialisation_is_idempotent_and_writes_the_sink() {
        let dir = TempDir::new().expect("create temp dir");
        let log_path = dir.path().join("logs").join("browser-tools.log");
        let config = Config::default();

        let first = initialise(&config, &log_path).expect("first initialisation");
        let second = initialise(&config, &dir.path().join("ignored.log"))
            .expect("second initialisation");
        tracing::info!(target: "toolkeeper::telemetry", "telemetry smoke record");

        assert_eq!(first, second);
        let written = std::fs::read_to_string(&log_path).expect("read sink");
        assert!(written.contains("telemetry smoke record"));
    }
}
