use std::env;
use std::path::PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use nix::unistd::geteuid;

use crate::logging::LogFormat;
use crate::schema::SchemaPreference;

/// Port the collection server listens on unless overridden.
pub const DEFAULT_SERVER_PORT: u16 = 3025;

/// Port a browser exposes its remote debugging endpoint on.
pub const DEFAULT_BROWSER_DEBUG_PORT: u16 = 9222;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Service name under which the bridge client is registered in the host config.
pub const DEFAULT_SERVICE_NAME: &str = "browser-tools";

/// File name of the shared log sink inside the runtime directory.
pub const LOG_FILE_NAME: &str = "browser-tools.log";

const RUNTIME_NAMESPACE: &str = "toolkeeper";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format. The log file is read back by people, so compact wins.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Default collection server port.
#[must_use]
pub const fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

/// Default browser debugging port.
#[must_use]
pub const fn default_browser_debug_port() -> u16 {
    DEFAULT_BROWSER_DEBUG_PORT
}

/// Default schema placement policy.
#[must_use]
pub const fn default_schema_preference() -> SchemaPreference {
    SchemaPreference::Auto
}

/// Owned service name for serde defaults.
#[must_use]
pub fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_owned()
}

/// Location of the host's MCP configuration document.
#[must_use]
pub fn default_host_config_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(env::temp_dir);
    path.push(".cursor");
    path.push("mcp.json");
    path
}

/// Directory from which `node_modules` resolution starts.
#[must_use]
pub fn default_package_root() -> PathBuf {
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Computes the per-user runtime directory for PID files and logs.
#[must_use]
pub fn default_runtime_dir() -> PathBuf {
    #[cfg(unix)]
    {
        if let Some(mut dir) = runtime_dir() {
            dir.push(RUNTIME_NAMESPACE);
            return dir;
        }
        let mut dir = env::temp_dir();
        dir.push(RUNTIME_NAMESPACE);
        dir.push(format!("uid-{}", geteuid()));
        dir
    }

    #[cfg(not(unix))]
    {
        let mut dir = env::temp_dir();
        dir.push(RUNTIME_NAMESPACE);
        dir
    }
}
