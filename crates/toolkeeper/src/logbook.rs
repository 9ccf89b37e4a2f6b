//! Read-back and truncation of the shared log sink.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while reading or clearing the log sink.
#[derive(Debug, Error)]
pub enum LogBookError {
    /// Reading failed.
    #[error("failed to read log '{path}': {source}")]
    Read {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Truncating failed.
    #[error("failed to clear log '{path}': {source}")]
    Clear {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// The append-only log file written by telemetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBook {
    path: PathBuf,
}

impl LogBook {
    /// Wraps the log at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the log.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entire log contents; empty when nothing has been logged yet.
    ///
    /// # Errors
    ///
    /// Returns [`LogBookError::Read`] for IO failures other than a missing
    /// file.
    pub fn read(&self) -> Result<String, LogBookError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(LogBookError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Truncates the log in place so open appenders keep working.
    ///
    /// # Errors
    ///
    /// Returns [`LogBookError::Clear`] for IO failures other than a missing
    /// file.
    pub fn clear(&self) -> Result<(), LogBookError> {
        match OpenOptions::new().write(true).open(&self.path) {
            Ok(file) => file.set_len(0).map_err(|source| LogBookError::Clear {
                path: self.path.clone(),
                source,
            }),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LogBookError::Clear {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
