//! Errors surfaced by the CLI runtime.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use toolkeeper::{LogBookError, SetupError, TelemetryError};

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to prepare the supervisor: {0}")]
    Setup(#[from] SetupError),
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to build the async runtime: {0}")]
    Runtime(#[source] io::Error),
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),
    #[error(transparent)]
    Logs(#[from] LogBookError),
    #[error("failed to serialise status: {0}")]
    SerialiseStatus(#[source] serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
    #[error("stop could not remove every PID file")]
    StopIncomplete,
    #[error("failed to remove the entry from the host configuration")]
    UninstallFailed,
}
