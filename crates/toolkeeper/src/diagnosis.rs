//! Failure diagnosis.
//!
//! Runs a fixed set of independent checks after a failed start and maps every
//! finding onto one suggestion. Nothing here changes the system.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::probe::PortProbe;
use crate::toolchain::{CLIENT_PACKAGE, MINIMUM_RUNTIME, Package, SERVER_PACKAGE, Toolchain};

const DIAGNOSIS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::diagnosis");

/// How many ports above the configured one are searched for an alternative.
const ALTERNATIVE_PORT_SPAN: u16 = 20;

/// Offered when no check finds anything.
pub const GENERIC_SUGGESTIONS: [&str; 2] = [
    "Check the logs for more detail",
    "Restart the host application and try again",
];

/// Category of a diagnosed problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The runtime is missing or too old.
    RuntimeVersion,
    /// A package is neither installed nor fetchable.
    MissingPackage,
    /// Something else listens on the server port.
    PortBusy,
    /// No browser answers on the debugging port.
    UpstreamUnavailable,
    /// A directory the supervisor writes to is not writable.
    Permission,
}

impl IssueKind {
    /// Remedy for this kind of problem.
    #[must_use]
    pub const fn suggestion(self) -> &'static str {
        match self {
            Self::RuntimeVersion => "Install or upgrade Node.js to version 18.0.0 or newer",
            Self::MissingPackage => {
                "Run `npm install` to install the browser-tools packages, or make `npx` available"
            }
            Self::PortBusy => {
                "Stop the process using the port, or configure a different server port"
            }
            Self::UpstreamUnavailable => {
                "Start Chrome with remote debugging enabled: chrome --remote-debugging-port=9222"
            }
            Self::Permission => "Check filesystem permissions for the listed directories",
        }
    }
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Category.
    pub kind: IssueKind,
    /// What was found.
    pub description: String,
}

impl Issue {
    fn new(kind: IssueKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Suggestions for `issues`, one each, or the generic pair when empty.
#[must_use]
pub fn suggestions_for(issues: &[Issue]) -> Vec<String> {
    if issues.is_empty() {
        return GENERIC_SUGGESTIONS.iter().copied().map(str::to_owned).collect();
    }
    issues
        .iter()
        .map(|issue| issue.kind.suggestion().to_owned())
        .collect()
}

/// What diagnosis inspects.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosisScope<'a> {
    /// Port the server should listen on.
    pub server_port: u16,
    /// Browser debugging port.
    pub browser_debug_port: u16,
    /// Directory holding PID files.
    pub runtime_dir: &'a Path,
    /// Directory holding the host config file.
    pub config_dir: &'a Path,
}

/// Runs every check and returns what failed.
pub async fn diagnose<T: Toolchain>(
    toolchain: &T,
    ports: &PortProbe,
    scope: &DiagnosisScope<'_>,
) -> Vec<Issue> {
    let mut issues = Vec::new();

    match toolchain.runtime_version().await {
        Some(version) if version >= MINIMUM_RUNTIME => {}
        Some(version) => issues.push(Issue::new(
            IssueKind::RuntimeVersion,
            format!("Node.js {version} is too old; {MINIMUM_RUNTIME} or newer is required"),
        )),
        None => issues.push(Issue::new(
            IssueKind::RuntimeVersion,
            "Node.js was not found on PATH",
        )),
    }

    for package in [SERVER_PACKAGE, CLIENT_PACKAGE] {
        if let Some(issue) = check_package(toolchain, &package).await {
            issues.push(issue);
        }
    }

    if let Some(issue) = check_port(ports, scope.server_port).await {
        issues.push(issue);
    }

    if !ports.is_occupied(scope.browser_debug_port).await {
        issues.push(Issue::new(
            IssueKind::UpstreamUnavailable,
            format!(
                "No browser is listening for remote debugging on port {}",
                scope.browser_debug_port
            ),
        ));
    }

    for (label, dir) in [
        ("runtime directory", scope.runtime_dir),
        ("host configuration directory", scope.config_dir),
    ] {
        if !is_writable(dir) {
            issues.push(Issue::new(
                IssueKind::Permission,
                format!("The {label} '{}' is not writable", dir.display()),
            ));
        }
    }

    if issues.is_empty() {
        info!(target: DIAGNOSIS_TARGET, "diagnosis found no issues");
    }
    for (index, issue) in issues.iter().enumerate() {
        warn!(
            target: DIAGNOSIS_TARGET,
            number = index + 1,
            kind = ?issue.kind,
            "{issue}"
        );
    }
    issues
}

async fn check_package<T: Toolchain>(toolchain: &T, package: &Package) -> Option<Issue> {
    if toolchain.locate(package).await.is_available() {
        return None;
    }
    Some(Issue::new(
        IssueKind::MissingPackage,
        format!("{package} is not installed and cannot be fetched"),
    ))
}

async fn check_port(ports: &PortProbe, port: u16) -> Option<Issue> {
    let state = ports.port_state(port).await;
    if !state.occupied {
        return None;
    }
    let mut description = match state.occupant {
        Some(occupant) => format!("Port {port} is in use by {occupant}"),
        None => format!("Port {port} is in use"),
    };
    let search = port.saturating_add(1)..=port.saturating_add(ALTERNATIVE_PORT_SPAN);
    if let Some(free) = ports.find_available_port(search).await {
        description.push_str(&format!("; port {free} is free"));
    }
    Some(Issue::new(IssueKind::PortBusy, description))
}

/// Whether a file can be created in `dir`, or in its nearest existing
/// ancestor when `dir` does not exist yet.
fn is_writable(dir: &Path) -> bool {
    let Some(existing) = dir.ancestors().find(|candidate| candidate.is_dir()) else {
        return false;
    };
    tempfile::Builder::new()
        .prefix(".toolkeeper-probe")
        .tempfile_in(existing)
        .is_ok()
}
