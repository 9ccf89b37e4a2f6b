//! Decisions the host may be asked to make during a start.

use std::path::Path;

use crate::host_config::HostConfigError;

/// Answer when the host config file does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingConfigChoice {
    /// Write a new file holding the entry.
    #[default]
    Create,
    /// Leave the file absent and carry on.
    Skip,
    /// Show manual instructions and fail the start.
    ShowGuide,
}

/// Answer when the host config file cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorruptedConfigChoice {
    /// Copy the file aside and write a fresh one.
    #[default]
    BackupAndReset,
    /// Show manual instructions and fail the start.
    ShowGuide,
}

/// Answer when the file is valid but lacks the managed entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingEntryChoice {
    /// Add the entry.
    #[default]
    Repair,
    /// Leave the file as it is.
    Skip,
}

/// Host-side UI hooks. Every method has a non-interactive answer in
/// [`AutomaticPrompts`].
#[cfg_attr(test, mockall::automock)]
pub trait HostPrompts {
    /// The config file at `path` is missing.
    fn missing_config(&self, path: &Path) -> MissingConfigChoice;

    /// The config file at `path` is unusable.
    fn corrupted_config(&self, path: &Path, error: &HostConfigError) -> CorruptedConfigChoice;

    /// The config file at `path` lacks the managed entry.
    fn missing_entry(&self, path: &Path) -> MissingEntryChoice;

    /// Displays manual configuration instructions.
    fn show_guide(&self, guide: &str);
}

/// Takes the default answer to every question and logs the guide.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutomaticPrompts;

impl HostPrompts for AutomaticPrompts {
    fn missing_config(&self, _path: &Path) -> MissingConfigChoice {
        MissingConfigChoice::default()
    }

    fn corrupted_config(&self, _path: &Path, _error: &HostConfigError) -> CorruptedConfigChoice {
        CorruptedConfigChoice::default()
    }

    fn missing_entry(&self, _path: &Path) -> MissingEntryChoice {
        MissingEntryChoice::default()
    }

    fn show_guide(&self, guide: &str) {
        tracing::info!(target: concat!(env!("CARGO_PKG_NAME"), "::prompts"), "{guide}");
    }
}
