use std::fmt;

use serde::Serialize;

/// Orchestrator lifecycle.
///
/// `start` walks the phases in declaration order up to [`Phase::Ready`]; any
/// phase after [`Phase::Idle`] may fall into [`Phase::Failed`], and
/// [`Phase::Stopping`] always returns to [`Phase::Idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing running.
    Idle,
    /// Checking the runtime and packages.
    PreflightChecking,
    /// Clearing the server port.
    ResolvingPort,
    /// Launching the server.
    SpawningServer,
    /// Racing readiness signals.
    AwaitingServerReady,
    /// Bringing the host config in line.
    ReconcilingConfig,
    /// Launching the client.
    SpawningClient,
    /// Server up, config written.
    Ready,
    /// The last start failed.
    Failed,
    /// Tearing down.
    Stopping,
}

impl Phase {
    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn permits(self, next: Self) -> bool {
        use Phase::{
            AwaitingServerReady, Failed, Idle, PreflightChecking, Ready, ReconcilingConfig,
            ResolvingPort, SpawningClient, SpawningServer, Stopping,
        };
        match (self, next) {
            (_, Stopping) => true,
            (Stopping, Idle) => true,
            (Idle, _) => matches!(next, PreflightChecking),
            (PreflightChecking, ResolvingPort)
            | (ResolvingPort, SpawningServer)
            | (SpawningServer, AwaitingServerReady)
            | (AwaitingServerReady, ReconcilingConfig)
            | (ReconcilingConfig, SpawningClient)
            | (SpawningClient, Ready) => true,
            (Ready | Failed | Stopping, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::PreflightChecking => "preflight_checking",
            Self::ResolvingPort => "resolving_port",
            Self::SpawningServer => "spawning_server",
            Self::AwaitingServerReady => "awaiting_server_ready",
            Self::ReconcilingConfig => "reconciling_config",
            Self::SpawningClient => "spawning_client",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

/// Lifecycle of one managed process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Not running.
    #[default]
    Stopped,
    /// Spawned, not yet confirmed.
    Starting,
    /// Confirmed running.
    Running,
    /// Being signalled.
    Stopping,
    /// Did not come up.
    Failed,
}

impl ServiceState {
    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn permits(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Stopped | Self::Failed, Self::Starting)
                | (Self::Starting, Self::Running | Self::Failed | Self::Stopping)
                | (Self::Running, Self::Stopping)
                | (Self::Stopping | Self::Failed, Self::Stopped)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::begin(Phase::Idle, Phase::PreflightChecking, true)]
    #[case::skip_ahead(Phase::Idle, Phase::Ready, false)]
    #[case::happy_path(Phase::SpawningClient, Phase::Ready, true)]
    #[case::fail_mid_start(Phase::AwaitingServerReady, Phase::Failed, true)]
    #[case::idle_cannot_fail(Phase::Idle, Phase::Failed, false)]
    #[case::stop_from_ready(Phase::Ready, Phase::Stopping, true)]
    #[case::stop_from_failed(Phase::Failed, Phase::Stopping, true)]
    #[case::stop_finishes(Phase::Stopping, Phase::Idle, true)]
    #[case::no_backtrack(Phase::ReconcilingConfig, Phase::SpawningServer, false)]
    #[case::ready_is_settled(Phase::Ready, Phase::Failed, false)]
    fn phase_transitions(#[case] from: Phase, #[case] to: Phase, #[case] allowed: bool) {
        assert_eq!(from.permits(to), allowed);
    }

    #[rstest]
    #[case::spawn(ServiceState::Stopped, ServiceState::Starting, true)]
    #[case::confirm(ServiceState::Starting, ServiceState::Running, true)]
    #[case::fail(ServiceState::Starting, ServiceState::Failed, true)]
    #[case::running_cannot_fail(ServiceState::Running, ServiceState::Failed, false)]
    #[case::stop(ServiceState::Running, ServiceState::Stopping, true)]
    #[case::stopped(ServiceState::Stopping, ServiceState::Stopped, true)]
    #[case::no_resurrection(ServiceState::Stopping, ServiceState::Running, false)]
    fn service_transitions(
        #[case] from: ServiceState,
        #[case] to: ServiceState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.permits(to), allowed);
    }

    #[test]
    fn phases_display_in_snake_case() {
        assert_eq!(Phase::AwaitingServerReady.to_string(), "awaiting_server_ready");
    }
}
