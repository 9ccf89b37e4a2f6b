//! Error surface for spawning and tracking managed processes.

use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;

use super::spawn::ExitRecord;

/// Errors raised while reading or writing a PID file.
#[derive(Debug, Error)]
pub enum PidFileError {
    /// Reading the PID file failed.
    #[error("failed to read pid file '{path}': {source}")]
    Read {
        /// PID file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The PID file did not contain a decimal integer.
    #[error("pid file '{path}' does not contain a valid pid: {source}")]
    Parse {
        /// PID file path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: ParseIntError,
    },
    /// Writing the PID file failed.
    #[error("failed to write pid file '{path}': {source}")]
    Write {
        /// PID file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing the PID file failed.
    #[error("failed to remove pid file '{path}': {source}")]
    Remove {
        /// PID file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Errors raised while launching a managed process.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The OS refused to create the process.
    #[error("failed to launch '{program}': {source}")]
    Launch {
        /// Program that could not be started.
        program: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// No PID materialised within the acquisition window.
    #[error("'{program}' reported no pid after {attempts} attempts")]
    PidUnavailable {
        /// Program that was started.
        program: String,
        /// Number of polls performed.
        attempts: u32,
    },
    /// The process ended before it reported a PID.
    #[error("'{program}' exited before reporting a pid ({exit})")]
    ExitedBeforePid {
        /// Program that was started.
        program: String,
        /// How the process ended.
        exit: ExitRecord,
    },
    /// Persisting the PID failed; the child has been killed.
    #[error("failed to record pid for '{program}': {source}")]
    PidFile {
        /// Program that was started.
        program: String,
        /// Underlying PID file error.
        #[source]
        source: PidFileError,
    },
}
