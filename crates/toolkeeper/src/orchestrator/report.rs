//! What start, status, and failure handling hand back to the host.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;

use super::errors::StartupError;
use super::readiness::{ClientOutcome, ReadySignal};
use crate::diagnosis::{Issue, suggestions_for};

/// Outcome of a failed start, with diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartupResult {
    /// Always `false`; kept so hosts can serialise the record as is.
    pub success: bool,
    /// Short error message.
    pub error: String,
    /// One line per diagnosed problem.
    pub diagnosed_issues: Vec<String>,
    /// One remedy per problem, or generic advice when none were found.
    pub suggestions: Vec<String>,
}

impl StartupResult {
    /// Builds the record for `error` and the issues diagnosis found.
    #[must_use]
    pub fn from_failure(error: &StartupError, issues: &[Issue]) -> Self {
        Self {
            success: false,
            error: format!("Startup failed: {error}"),
            diagnosed_issues: issues.iter().map(|issue| issue.description.clone()).collect(),
            suggestions: suggestions_for(issues),
        }
    }

    /// Error message followed by numbered issues and suggestions.
    #[must_use]
    pub fn detailed_message(&self) -> String {
        let mut message = self.error.clone();
        append_numbered(&mut message, "Issues found", &self.diagnosed_issues);
        append_numbered(&mut message, "Suggestions", &self.suggestions);
        message
    }
}

fn append_numbered(message: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    message.push_str("\n\n");
    message.push_str(heading);
    message.push(':');
    for (index, item) in items.iter().enumerate() {
        // Writing to a String cannot fail.
        write!(message, "\n{}. {item}", index + 1).ok();
    }
}

/// What happened to the host configuration during a start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ConfigOutcome {
    /// A new file was written.
    Created,
    /// The entry was added, moved, or refreshed.
    Updated,
    /// The file already matched.
    Unchanged,
    /// The unusable file was copied aside and replaced.
    Reset {
        /// Where the original went.
        backup: PathBuf,
    },
    /// The host declined the change.
    Skipped,
}

/// Fate of the client during a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientStatus {
    /// The client was spawned and its race finished.
    Spawned {
        /// Client PID.
        pid: u32,
        /// Race result.
        outcome: ClientOutcome,
    },
    /// The client could not be launched.
    NotStarted {
        /// Why.
        reason: String,
    },
}

/// Summary of a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyReport {
    /// Server PID.
    pub server_pid: u32,
    /// What proved the server ready.
    pub server_signal: ReadySignal,
    /// Host configuration outcome.
    pub config: ConfigOutcome,
    /// Client outcome.
    pub client: ClientStatus,
}

/// Point-in-time view of the managed services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// A live PID is recorded for the server.
    pub server_running: bool,
    /// A live PID is recorded for the client.
    pub client_running: bool,
    /// Something listens on the server port.
    pub port_occupied: bool,
    /// The host config holds the entry under exactly one key.
    pub config_valid: bool,
    /// A browser listens on the debugging port.
    pub browser_debugging: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::{GENERIC_SUGGESTIONS, IssueKind};

    #[test]
    fn failure_without_issues_gets_generic_advice() {
        let error = StartupError::DependencyUnavailable {
            package: "npx".to_owned(),
        };
        let result = StartupResult::from_failure(&error, &[]);

        assert!(!result.success);
        assert_eq!(result.error, "Startup failed: npx is unavailable");
        assert!(result.diagnosed_issues.is_empty());
        assert_eq!(result.suggestions, GENERIC_SUGGESTIONS);
        assert_eq!(
            result.detailed_message(),
            "Startup failed: npx is unavailable\n\n\
             Suggestions:\n\
             1. Check the logs for more detail\n\
             2. Restart the host application and try again"
        );
    }

    #[test]
    fn issues_and_suggestions_are_numbered_in_step() {
        let error = StartupError::BindFailure {
            port: 3025,
            line: "EADDRINUSE".to_owned(),
        };
        let issues = [Issue {
            kind: IssueKind::PortBusy,
            description: "Port 3025 is in use; port 3026 is free".to_owned(),
        }];

        let message = StartupResult::from_failure(&error, &issues).detailed_message();

        assert!(message.contains("Issues found:\n1. Port 3025 is in use; port 3026 is free"));
        assert!(message.contains(&format!("Suggestions:\n1. {}", IssueKind::PortBusy.suggestion())));
    }

    #[test]
    fn status_serialises_flat() {
        let status = ServiceStatus {
            server_running: true,
            client_running: false,
            port_occupied: true,
            config_valid: true,
            browser_debugging: false,
        };
        let json = serde_json::to_value(status).expect("serialise status");
        assert_eq!(json["server_running"], true);
        assert_eq!(json["browser_debugging"], false);
    }
}
