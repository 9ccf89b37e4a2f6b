use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::PROCESS_TARGET;
use super::errors::PidFileError;
use super::signal::is_alive;

/// Plain-text file holding the decimal PID of a managed process.
///
/// Presence plus a successful liveness probe together mean "running"; the file
/// is what lets a later invocation find a process started by an earlier one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Wraps the PID file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `pid`, replacing previous contents.
    ///
    /// # Errors
    ///
    /// Returns [`PidFileError::Write`] when the file cannot be written.
    pub fn write(&self, pid: u32) -> Result<(), PidFileError> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let write_error = |source| PidFileError::Write {
            path: self.path.clone(),
            source,
        };
        let mut file = options.open(&self.path).map_err(write_error)?;
        writeln!(file, "{pid}").map_err(write_error)?;
        file.sync_all().map_err(write_error)?;
        info!(
            target: PROCESS_TARGET,
            pid,
            file = %self.path.display(),
            "pid file written"
        );
        Ok(())
    }

    /// Reads the recorded PID.
    ///
    /// A missing or empty file yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`PidFileError::Read`] on IO failure and
    /// [`PidFileError::Parse`] when the contents are not a PID.
    pub fn read(&self) -> Result<Option<u32>, PidFileError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PidFileError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<u32>()
            .map(Some)
            .map_err(|source| PidFileError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    /// The recorded PID when that process is still alive.
    ///
    /// # Errors
    ///
    /// Propagates [`PidFile::read`] failures.
    pub fn live_pid(&self) -> Result<Option<u32>, PidFileError> {
        Ok(self.read()?.filter(|pid| is_alive(*pid)))
    }

    /// Deletes the file; a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PidFileError::Remove`] for any other IO failure.
    pub fn remove(&self) -> Result<(), PidFileError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PidFileError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Deletes the file only while it still names `pid`.
    ///
    /// Exit observers use this so a late exit never erases the PID file of a
    /// replacement process.
    pub fn release(&self, pid: u32) {
        let outcome = match self.read() {
            Ok(Some(recorded)) if recorded == pid => self.remove(),
            Ok(_) => Ok(()),
            Err(error) => Err(error),
        };
        if let Err(error) = outcome {
            warn!(
                target: PROCESS_TARGET,
                pid,
                file = %self.path.display(),
                error = %error,
                "failed to release pid file"
            );
        }
    }
}
