//! Failures that end a start attempt.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use toolkeeper_config::RuntimePathsError;

use crate::host_config::HostConfigError;
use crate::probe::Occupant;
use crate::process::{ExitRecord, SpawnError};
use crate::toolchain::RuntimeVersion;

/// Why a start attempt failed.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The server port stayed occupied.
    #[error("port {port} is occupied{}", describe_occupant(.occupant.as_ref()))]
    PortOccupied {
        /// Server port.
        port: u16,
        /// Listener details, when known.
        occupant: Option<Occupant>,
    },
    /// A managed process could not be launched.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// Nothing signalled readiness in time.
    #[error("server on port {port} did not become ready within {}s", .waited.as_secs())]
    ReadinessTimeout {
        /// Server port.
        port: u16,
        /// How long the race ran.
        waited: Duration,
    },
    /// The server exited during startup.
    #[error("server exited during startup ({exit})")]
    ServerExited {
        /// How it ended.
        exit: ExitRecord,
    },
    /// The server reported that it could not bind.
    #[error("server could not bind port {port}: {line}")]
    BindFailure {
        /// Server port.
        port: u16,
        /// The offending output line.
        line: String,
    },
    /// The host config is missing and the host asked for manual setup.
    #[error("host configuration '{path}' is missing")]
    ConfigMissing {
        /// Config file path.
        path: PathBuf,
    },
    /// The host config is unusable and the host asked for manual repair.
    #[error("host configuration '{path}' is corrupted")]
    ConfigCorrupted {
        /// Config file path.
        path: PathBuf,
        /// What was wrong with it.
        #[source]
        source: HostConfigError,
    },
    /// Reading or writing the host config failed.
    #[error(transparent)]
    Config(#[from] HostConfigError),
    /// A required program or package is unavailable.
    #[error("{package} is unavailable")]
    DependencyUnavailable {
        /// What is missing.
        package: String,
    },
    /// The runtime is older than supported.
    #[error("Node.js {found} is not supported; {required} or newer is required")]
    VersionIncompatible {
        /// Installed version.
        found: RuntimeVersion,
        /// Minimum version.
        required: RuntimeVersion,
    },
}

fn describe_occupant(occupant: Option<&Occupant>) -> String {
    occupant.map_or_else(String::new, |occupant| format!(" by {occupant}"))
}

/// Errors raised while building an orchestrator.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The runtime directory could not be prepared.
    #[error(transparent)]
    RuntimePaths(#[from] RuntimePathsError),
    /// The readiness HTTP client could not be built.
    #[error("failed to build readiness probe client: {0}")]
    HttpClient(#[source] reqwest::Error),
}
