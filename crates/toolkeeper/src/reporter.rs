//! Structured reporting of orchestrator lifecycle events.

use std::path::Path;
use std::sync::Arc;

use crate::orchestrator::{ClientOutcome, ConfigOutcome, Phase, ReadySignal, StartupResult};
use crate::probe::Occupant;

const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Observer for lifecycle events.
pub trait LifecycleReporter: Send + Sync {
    /// The orchestrator moved between phases.
    fn phase_changed(&self, from: Phase, to: Phase);

    /// Something held the server port and was asked to leave.
    fn port_reclaimed(&self, port: u16, occupant: Option<&Occupant>, freed: bool);

    /// The server passed its readiness race.
    fn server_ready(&self, pid: u32, signal: &ReadySignal);

    /// The host configuration was brought in line.
    fn config_reconciled(&self, path: &Path, outcome: &ConfigOutcome);

    /// The client race finished.
    fn client_settled(&self, pid: Option<u32>, outcome: &ClientOutcome);

    /// A start attempt failed.
    fn startup_failed(&self, result: &StartupResult);

    /// Both processes were stopped.
    fn stopped(&self, signalled: usize);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn phase_changed(&self, from: Phase, to: Phase) {
        (**self).phase_changed(from, to);
    }

    fn port_reclaimed(&self, port: u16, occupant: Option<&Occupant>, freed: bool) {
        (**self).port_reclaimed(port, occupant, freed);
    }

    fn server_ready(&self, pid: u32, signal: &ReadySignal) {
        (**self).server_ready(pid, signal);
    }

    fn config_reconciled(&self, path: &Path, outcome: &ConfigOutcome) {
        (**self).config_reconciled(path, outcome);
    }

    fn client_settled(&self, pid: Option<u32>, outcome: &ClientOutcome) {
        (**self).client_settled(pid, outcome);
    }

    fn startup_failed(&self, result: &StartupResult) {
        (**self).startup_failed(result);
    }

    fn stopped(&self, signalled: usize) {
        (**self).stopped(signalled);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredReporter;

impl StructuredReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredReporter {
    fn phase_changed(&self, from: Phase, to: Phase) {
        tracing::debug!(
            target: LIFECYCLE_TARGET,
            event = "phase_changed",
            %from,
            %to,
            "phase changed"
        );
    }

    fn port_reclaimed(&self, port: u16, occupant: Option<&Occupant>, freed: bool) {
        let occupant = occupant.map_or_else(|| "unknown".to_owned(), ToString::to_string);
        if freed {
            tracing::info!(
                target: LIFECYCLE_TARGET,
                event = "port_reclaimed",
                port,
                %occupant,
                "server port reclaimed"
            );
        } else {
            tracing::warn!(
                target: LIFECYCLE_TARGET,
                event = "port_reclaimed",
                port,
                %occupant,
                "server port still occupied, spawning anyway"
            );
        }
    }

    fn server_ready(&self, pid: u32, signal: &ReadySignal) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "server_ready",
            pid,
            signal = ?signal,
            "server ready"
        );
    }

    fn config_reconciled(&self, path: &Path, outcome: &ConfigOutcome) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "config_reconciled",
            file = %path.display(),
            outcome = ?outcome,
            "host configuration reconciled"
        );
    }

    fn client_settled(&self, pid: Option<u32>, outcome: &ClientOutcome) {
        match outcome {
            ClientOutcome::Failed { exit } => tracing::warn!(
                target: LIFECYCLE_TARGET,
                event = "client_settled",
                pid,
                exit = %exit,
                "client exited during startup; server remains available"
            ),
            ClientOutcome::Confirmed | ClientOutcome::LikelyStarted => tracing::info!(
                target: LIFECYCLE_TARGET,
                event = "client_settled",
                pid,
                outcome = ?outcome,
                "client started"
            ),
        }
    }

    fn startup_failed(&self, result: &StartupResult) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "startup_failed",
            error = %result.error,
            issues = result.diagnosed_issues.len(),
            "startup failed"
        );
    }

    fn stopped(&self, signalled: usize) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "stopped",
            signalled,
            "services stopped"
        );
    }
}
