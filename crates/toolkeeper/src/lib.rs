//! Supervisor for the browser-tools collection server and its bridge client.
//!
//! The [`Orchestrator`] brings the server up on a known port, reclaiming the
//! port from stale occupants first, waits for it to prove readiness, writes
//! the bridge client's entry into the host application's MCP configuration,
//! and then launches the client. Both processes are tracked through PID files
//! so a later invocation can stop them or report on them.
//!
//! Failed starts are diagnosed: a fixed set of checks inspects the runtime,
//! the packages, the ports, and filesystem permissions, and each finding is
//! paired with a remedy in the returned [`StartupResult`].
//!
//! Configuration is layered through [`toolkeeper_config`] and telemetry goes
//! through `tracing`, with a copy of every record appended to the log sink
//! that [`Orchestrator::get_logs`] reads back.

pub mod diagnosis;
pub mod host_config;
mod logbook;
mod orchestrator;
pub mod poll;
pub mod probe;
pub mod process;
pub mod prompts;
pub mod race;
pub mod reporter;
mod telemetry;
pub mod toolchain;

pub use logbook::{LogBook, LogBookError};
pub use orchestrator::{
    ClientOutcome, ClientStatus, ConfigOutcome, HttpProbe, Orchestrator, OrchestratorSettings,
    Phase, ReadinessMarkers, ReadinessProbe, ReadyReport, ReadySignal, ServerReadiness,
    ServiceState, ServiceStatus, SetupError, StartupError, StartupResult, Timings, await_client,
    await_server,
};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

#[cfg(test)]
mod tests;
