//! Derives runtime artefact paths shared by the CLI and the supervisor library.
//!
//! The runtime directory houses the PID files of both managed processes and
//! the shared log sink. Every invocation needs to agree on this layout so a
//! later `stop` or `status` can find what an earlier `start` wrote.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;
use crate::defaults::LOG_FILE_NAME;

const SERVER_PID_FILE: &str = "browser-tools-server.pid";
const CLIENT_PID_FILE: &str = "browser-tools-mcp.pid";

/// Canonical paths for runtime artefacts written by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    server_pid_path: PathBuf,
    client_pid_path: PathBuf,
    log_path: PathBuf,
}

impl RuntimePaths {
    /// Derives runtime paths from the shared configuration, creating the
    /// runtime directory when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimePathsError::RuntimeDirectory`] when the directory
    /// cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        let runtime_dir = config.runtime_dir().to_path_buf();
        fs::create_dir_all(&runtime_dir).map_err(|source| RuntimePathsError::RuntimeDirectory {
            path: runtime_dir.clone(),
            source,
        })?;
        let log_path = config
            .log_file()
            .map_or_else(|| runtime_dir.join(LOG_FILE_NAME), Path::to_path_buf);
        Ok(Self {
            server_pid_path: runtime_dir.join(SERVER_PID_FILE),
            client_pid_path: runtime_dir.join(CLIENT_PID_FILE),
            log_path,
            runtime_dir,
        })
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// PID file of the collection server.
    #[must_use]
    pub fn server_pid_path(&self) -> &Path {
        self.server_pid_path.as_path()
    }

    /// PID file of the bridge client.
    #[must_use]
    pub fn client_pid_path(&self) -> &Path {
        self.client_pid_path.as_path()
    }

    /// Append-only log sink read back by `logs`.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        self.log_path.as_path()
    }
}

/// Errors raised while deriving runtime paths.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// Creating the runtime directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
