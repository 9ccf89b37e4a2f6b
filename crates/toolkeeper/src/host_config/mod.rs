//! Host configuration reconciliation.
//!
//! The host reads a JSON document listing the services it may launch. Two
//! generations of that document exist: the current one keeps services under
//! `mcpServers`, the older one under `mcp`. [`ConfigReconciler`] keeps the
//! managed entry under exactly one of them, never disturbing anything else
//! the file holds.

mod document;
mod entry;
mod errors;
mod files;
mod guide;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use toolkeeper_config::SchemaPreference;
use tracing::info;

pub use document::{ConfigDocument, EntryPlacement, SchemaVariant};
pub use entry::ServiceEntry;
pub use errors::HostConfigError;

const CONFIG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host_config");

/// Loads, repairs, and rewrites the host configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigReconciler {
    path: PathBuf,
    service: String,
    preference: SchemaPreference,
}

impl ConfigReconciler {
    /// Manages the `service` entry in the file at `path`.
    pub fn new(
        path: impl Into<PathBuf>,
        service: impl Into<String>,
        preference: SchemaPreference,
    ) -> Self {
        Self {
            path: path.into(),
            service: service.into(),
            preference,
        }
    }

    /// Config file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the managed entry.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service
    }

    /// Reads and parses the file.
    ///
    /// # Errors
    ///
    /// [`HostConfigError::Missing`] when the file does not exist,
    /// [`HostConfigError::Corrupted`] or [`HostConfigError::UnexpectedShape`]
    /// when its contents are unusable, and [`HostConfigError::Read`] for other
    /// IO failures.
    pub fn load(&self) -> Result<ConfigDocument, HostConfigError> {
        let bytes = fs::read(&self.path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                HostConfigError::Missing {
                    path: self.path.clone(),
                }
            } else {
                HostConfigError::Read {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|source| HostConfigError::Corrupted {
                path: self.path.clone(),
                source,
            })?;
        ConfigDocument::from_value(value).map_err(|detail| HostConfigError::UnexpectedShape {
            path: self.path.clone(),
            detail,
        })
    }

    /// Key the entry belongs under for `doc`.
    #[must_use]
    pub fn target(&self, doc: &ConfigDocument) -> SchemaVariant {
        match self.preference {
            SchemaPreference::Primary => SchemaVariant::Primary,
            SchemaPreference::Legacy => SchemaVariant::Legacy,
            SchemaPreference::Auto if doc.has_entries(SchemaVariant::Primary) => {
                SchemaVariant::Primary
            }
            SchemaPreference::Auto => SchemaVariant::Legacy,
        }
    }

    /// Places `entry` under exactly one key. Pure and idempotent.
    #[must_use]
    pub fn reconcile(&self, doc: &ConfigDocument, entry: &ServiceEntry) -> ConfigDocument {
        doc.with_entry(&self.service, entry, self.target(doc))
    }

    /// Where the managed entry currently lives.
    #[must_use]
    pub fn placement(&self, doc: &ConfigDocument) -> EntryPlacement {
        doc.placement(&self.service)
    }

    /// Whether exactly one key holds the managed entry.
    #[must_use]
    pub fn validate(&self, doc: &ConfigDocument) -> bool {
        matches!(self.placement(doc), EntryPlacement::Only(_))
    }

    /// Removes the managed entry from both keys.
    #[must_use]
    pub fn remove_entry(&self, doc: &ConfigDocument) -> ConfigDocument {
        doc.without_entry(&self.service)
    }

    /// Writes `doc` as pretty JSON with a trailing newline, atomically.
    ///
    /// # Errors
    ///
    /// [`HostConfigError::Serialise`] or [`HostConfigError::Write`].
    pub fn persist(&self, doc: &ConfigDocument) -> Result<(), HostConfigError> {
        let mut rendered = serde_json::to_string_pretty(doc.as_map()).map_err(|source| {
            HostConfigError::Serialise {
                path: self.path.clone(),
                source,
            }
        })?;
        rendered.push('\n');
        files::write_atomically(&self.path, rendered.as_bytes()).map_err(|source| {
            HostConfigError::Write {
                path: self.path.clone(),
                source,
            }
        })?;
        info!(
            target: CONFIG_TARGET,
            file = %self.path.display(),
            "host configuration written"
        );
        Ok(())
    }

    /// Copies the current file aside and replaces it with a fresh document
    /// holding only the managed entry. Returns the backup location.
    ///
    /// # Errors
    ///
    /// [`HostConfigError::Backup`] when the copy fails; nothing is written in
    /// that case. Otherwise as [`ConfigReconciler::persist`].
    pub fn backup_and_reset(&self, entry: &ServiceEntry) -> Result<PathBuf, HostConfigError> {
        let backup = files::backup_path(&self.path, SystemTime::now());
        fs::copy(&self.path, &backup).map_err(|source| HostConfigError::Backup {
            path: self.path.clone(),
            backup: backup.clone(),
            source,
        })?;
        info!(
            target: CONFIG_TARGET,
            file = %self.path.display(),
            backup = %backup.display(),
            "host configuration backed up"
        );
        let fresh = self.reconcile(&ConfigDocument::empty(), entry);
        self.persist(&fresh)?;
        Ok(backup)
    }

    /// Instructions for adding `entry` by hand.
    ///
    /// Uses the key reconciliation would pick for the current file, or for an
    /// empty one when the file cannot be read.
    #[must_use]
    pub fn manual_guide(&self, entry: &ServiceEntry) -> String {
        let doc = self.load().unwrap_or_default();
        guide::render(&self.path, self.target(&doc), &self.service, entry)
    }
}
