use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing the host configuration file.
#[derive(Debug, Error)]
pub enum HostConfigError {
    /// The file does not exist.
    #[error("host configuration '{path}' does not exist")]
    Missing {
        /// Config file path.
        path: PathBuf,
    },
    /// The file is not valid JSON.
    #[error("host configuration '{path}' is not valid JSON: {source}")]
    Corrupted {
        /// Config file path.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
    /// The JSON parsed but has the wrong structure.
    #[error("host configuration '{path}' has an unexpected shape: {detail}")]
    UnexpectedShape {
        /// Config file path.
        path: PathBuf,
        /// What was wrong.
        detail: String,
    },
    /// Reading the file failed.
    #[error("failed to read host configuration '{path}': {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the file failed.
    #[error("failed to write host configuration '{path}': {source}")]
    Write {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Copying the original aside failed.
    #[error("failed to back up '{path}' to '{backup}': {source}")]
    Backup {
        /// Config file path.
        path: PathBuf,
        /// Intended backup location.
        backup: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Rendering the document failed.
    #[error("failed to serialise host configuration '{path}': {source}")]
    Serialise {
        /// Config file path.
        path: PathBuf,
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },
}

impl HostConfigError {
    /// Whether the file exists but cannot be used as a config document.
    #[must_use]
    pub const fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted { .. } | Self::UnexpectedShape { .. })
    }
}
