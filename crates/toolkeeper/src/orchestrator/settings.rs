//! Everything the orchestrator needs to know, resolved once from [`Config`].

use std::path::PathBuf;
use std::time::Duration;

use toolkeeper_config::{Config, RuntimePaths, RuntimePathsError, SchemaPreference};

use crate::poll::PollSchedule;
use crate::process::{PID_POLL_ATTEMPTS, PID_POLL_INTERVAL};

/// Timers and bounds used during start and stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// How long to wait for a reclaimed port to free.
    pub port_free_timeout: Duration,
    /// Interval between port checks while waiting.
    pub port_poll: Duration,
    /// Connect timeout for port probes.
    pub connect_timeout: Duration,
    /// Grace between the graceful and forced signal sent to a port occupant.
    pub occupant_grace: Duration,
    /// Interval between readiness probes.
    pub probe_interval: Duration,
    /// Request timeout for each readiness probe.
    pub probe_timeout: Duration,
    /// When the readiness race falls back to its final probe.
    pub readiness_timeout: Duration,
    /// How long a silent client is given before it is presumed started.
    pub client_grace: Duration,
    /// Grace between the graceful and forced signal during stop.
    pub stop_grace: Duration,
    /// Bound on PID acquisition after spawn.
    pub pid_schedule: PollSchedule,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            port_free_timeout: Duration::from_secs(10),
            port_poll: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
            occupant_grace: Duration::from_secs(2),
            probe_interval: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(5),
            readiness_timeout: Duration::from_secs(5),
            client_grace: Duration::from_secs(5),
            stop_grace: Duration::from_secs(2),
            pid_schedule: PollSchedule::attempts(PID_POLL_ATTEMPTS, PID_POLL_INTERVAL),
        }
    }
}

/// Output fragments that drive the readiness races.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessMarkers {
    /// Stdout fragments meaning the server is up.
    pub server_ready: Vec<String>,
    /// Stderr fragments meaning the server could not bind.
    pub bind_failure: Vec<String>,
    /// Output fragments meaning the client connected.
    pub client_ready: Vec<String>,
}

impl ReadinessMarkers {
    /// Markers for a server told to listen on `port`.
    #[must_use]
    pub fn for_port(port: u16) -> Self {
        let mut server_ready: Vec<String> = [
            "Browser Tools Server Started",
            "listening on",
            "Available on the following network addresses",
            "For local access use:",
            "Server running",
            "Started",
            "Ready",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();
        server_ready.push(port.to_string());
        Self {
            server_ready,
            bind_failure: owned(&["EADDRINUSE", "address already in use", "listen"]),
            client_ready: owned(&["MCP client started", "connected"]),
        }
    }

    /// Whether `line` announces a ready server.
    #[must_use]
    pub fn is_server_ready(&self, line: &str) -> bool {
        contains_any(line, &self.server_ready)
    }

    /// Whether `line` reports a failed bind.
    #[must_use]
    pub fn is_bind_failure(&self, line: &str) -> bool {
        contains_any(line, &self.bind_failure)
    }

    /// Whether `line` announces a connected client.
    #[must_use]
    pub fn is_client_ready(&self, line: &str) -> bool {
        contains_any(line, &self.client_ready)
    }
}

fn owned(markers: &[&str]) -> Vec<String> {
    markers.iter().copied().map(str::to_owned).collect()
}

fn contains_any(line: &str, markers: &[String]) -> bool {
    markers.iter().any(|marker| line.contains(marker.as_str()))
}

/// Resolved orchestrator context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Port the server listens on.
    pub server_port: u16,
    /// Port of the browser's remote debugging endpoint.
    pub browser_debug_port: u16,
    /// PID files and log sink.
    pub paths: RuntimePaths,
    /// Host configuration file.
    pub host_config_path: PathBuf,
    /// Name of the managed entry.
    pub service_name: String,
    /// Placement policy for the managed entry.
    pub schema_preference: SchemaPreference,
    /// Timers and bounds.
    pub timings: Timings,
    /// Readiness fragments.
    pub markers: ReadinessMarkers,
}

impl OrchestratorSettings {
    /// Resolves settings from `config` with default timings.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimePathsError`] when the runtime directory cannot be
    /// created.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        Ok(Self {
            server_port: config.server_port(),
            browser_debug_port: config.browser_debug_port(),
            paths: RuntimePaths::from_config(config)?,
            host_config_path: config.host_config_path().to_path_buf(),
            service_name: config.service_name().to_owned(),
            schema_preference: config.schema_preference(),
            timings: Timings::default(),
            markers: ReadinessMarkers::for_port(config.server_port()),
        })
    }

    /// Replaces the timings.
    #[must_use]
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }
}
