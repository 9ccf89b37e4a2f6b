//! Shared configuration for the toolkeeper supervisor and its CLI.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an optional
//! TOML file passed with `--config-path`, then `TOOLKEEPER_*` environment
//! variables, then command-line flags.

mod defaults;
mod logging;
mod runtime;
mod schema;

use std::path::{Path, PathBuf};

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_BROWSER_DEBUG_PORT, DEFAULT_LOG_FILTER, DEFAULT_SERVER_PORT, DEFAULT_SERVICE_NAME,
    default_browser_debug_port, default_host_config_path, default_log_filter,
    default_log_filter_string, default_log_format, default_package_root, default_runtime_dir,
    default_schema_preference, default_server_port, default_service_name,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimePaths, RuntimePathsError};
pub use schema::SchemaPreference;

/// Resolved supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TOOLKEEPER")]
pub struct Config {
    /// Port the collection server is told to listen on.
    #[serde(default = "defaults::default_server_port")]
    pub server_port: u16,
    /// Port probed to decide whether a debuggable browser is running.
    #[serde(default = "defaults::default_browser_debug_port")]
    pub browser_debug_port: u16,
    /// `tracing` filter directive.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Output format for log records.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
    /// Explicit log sink; defaults to a file inside the runtime directory.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Directory holding PID files.
    #[serde(default = "defaults::default_runtime_dir")]
    pub runtime_dir: PathBuf,
    /// The host's MCP configuration document.
    #[serde(default = "defaults::default_host_config_path")]
    pub host_config_path: PathBuf,
    /// Directory where `node_modules` lookup begins.
    #[serde(default = "defaults::default_package_root")]
    pub package_root: PathBuf,
    /// Placement policy for the managed config entry.
    #[serde(default = "defaults::default_schema_preference")]
    pub schema_preference: SchemaPreference,
    /// Name of the managed entry in the host config.
    #[serde(default = "defaults::default_service_name")]
    pub service_name: String,
}

impl Config {
    /// Port the collection server is told to listen on.
    #[must_use]
    pub const fn server_port(&self) -> u16 {
        self.server_port
    }

    /// Port probed for a debuggable browser.
    #[must_use]
    pub const fn browser_debug_port(&self) -> u16 {
        self.browser_debug_port
    }

    /// Configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Configured log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Explicit log sink, when one was configured.
    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Directory holding PID files.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// The host's MCP configuration document.
    #[must_use]
    pub fn host_config_path(&self) -> &Path {
        &self.host_config_path
    }

    /// Directory where `node_modules` lookup begins.
    #[must_use]
    pub fn package_root(&self) -> &Path {
        &self.package_root
    }

    /// Placement policy for the managed config entry.
    #[must_use]
    pub const fn schema_preference(&self) -> SchemaPreference {
        self.schema_preference
    }

    /// Name of the managed entry in the host config.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: default_server_port(),
            browser_debug_port: default_browser_debug_port(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            log_file: None,
            runtime_dir: default_runtime_dir(),
            host_config_path: default_host_config_path(),
            package_root: default_package_root(),
            schema_preference: default_schema_preference(),
            service_name: default_service_name(),
        }
    }
}
