//! Startup and shutdown orchestration.
//!
//! [`Orchestrator`] owns both managed processes. A start clears the stage
//! with a full stop, checks prerequisites, reclaims the server port, spawns
//! the server and races its readiness signals, reconciles the host
//! configuration, and finally spawns the client. Every public operation takes
//! `&mut self` or `&self`, so two starts can never overlap.

mod errors;
mod readiness;
mod report;
mod settings;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use toolkeeper_config::Config;
use tracing::{info, warn};

pub use errors::{SetupError, StartupError};
pub use readiness::{
    ClientOutcome, HttpProbe, ReadinessProbe, ReadySignal, ServerReadiness, await_client,
    await_server,
};
pub use report::{ClientStatus, ConfigOutcome, ReadyReport, ServiceStatus, StartupResult};
pub use settings::{OrchestratorSettings, ReadinessMarkers, Timings};
pub use state::{Phase, ServiceState};

use crate::diagnosis::{self, DiagnosisScope, Issue};
use crate::host_config::{
    ConfigDocument, ConfigReconciler, EntryPlacement, HostConfigError, ServiceEntry,
};
use crate::logbook::{LogBook, LogBookError};
use crate::probe::PortProbe;
use crate::process::{
    ExitRecord, PidFile, ProcessHandle, ProcessSupervisor, ServiceRole, is_alive, terminate,
    terminate_with_grace,
};
use crate::prompts::{
    AutomaticPrompts, CorruptedConfigChoice, HostPrompts, MissingConfigChoice, MissingEntryChoice,
};
use crate::reporter::{LifecycleReporter, StructuredReporter};
use crate::toolchain::{
    CLIENT_PACKAGE, MINIMUM_RUNTIME, NodeToolchain, PackageSource, SERVER_PACKAGE, Toolchain,
};

const ORCHESTRATOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::orchestrator");

/// Interval at which an evicted port occupant is checked for exit.
const EVICTION_POLL: Duration = Duration::from_millis(100);

struct ServiceSlot {
    role: ServiceRole,
    state: ServiceState,
    handle: Option<ProcessHandle>,
    pid_file: PidFile,
}

impl ServiceSlot {
    fn new(role: ServiceRole, pid_path: &Path) -> Self {
        Self {
            role,
            state: ServiceState::Stopped,
            handle: None,
            pid_file: PidFile::new(pid_path),
        }
    }

    fn transition(&mut self, next: ServiceState) {
        if self.state != next && !self.state.permits(next) {
            warn!(
                target: ORCHESTRATOR_TARGET,
                role = %self.role,
                from = ?self.state,
                to = ?next,
                "unexpected service transition"
            );
        }
        self.state = next;
    }

    fn running_pid(&self) -> Option<u32> {
        self.handle
            .as_ref()
            .filter(|handle| !handle.has_exited())
            .map(ProcessHandle::pid)
    }
}

/// Supervises the collection server and the bridge client.
pub struct Orchestrator<T = NodeToolchain, P = HttpProbe> {
    settings: OrchestratorSettings,
    toolchain: T,
    readiness_probe: P,
    ports: PortProbe,
    supervisor: ProcessSupervisor,
    reconciler: ConfigReconciler,
    logbook: LogBook,
    prompts: Box<dyn HostPrompts>,
    reporter: Arc<dyn LifecycleReporter>,
    phase: Phase,
    server: ServiceSlot,
    client: ServiceSlot,
    last_failure: Option<StartupResult>,
}

impl Orchestrator {
    /// Builds a production orchestrator from the shared configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] when the runtime directory cannot be created or
    /// the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, SetupError> {
        let settings = OrchestratorSettings::from_config(config)?;
        let probe =
            HttpProbe::new(settings.timings.probe_timeout).map_err(SetupError::HttpClient)?;
        Ok(Self::new(
            settings,
            NodeToolchain::new(config.package_root()),
            probe,
        ))
    }
}

impl<T: Toolchain, P: ReadinessProbe> Orchestrator<T, P> {
    /// Assembles an orchestrator from explicit collaborators.
    pub fn new(settings: OrchestratorSettings, toolchain: T, readiness_probe: P) -> Self {
        let timings = settings.timings;
        let reconciler = ConfigReconciler::new(
            settings.host_config_path.clone(),
            settings.service_name.clone(),
            settings.schema_preference,
        );
        let server = ServiceSlot::new(ServiceRole::Server, settings.paths.server_pid_path());
        let client = ServiceSlot::new(ServiceRole::Client, settings.paths.client_pid_path());
        let logbook = LogBook::new(settings.paths.log_path());
        Self {
            toolchain,
            readiness_probe,
            ports: PortProbe::new(timings.connect_timeout, timings.port_poll),
            supervisor: ProcessSupervisor::new(timings.pid_schedule),
            reconciler,
            logbook,
            prompts: Box::new(AutomaticPrompts),
            reporter: Arc::new(StructuredReporter),
            phase: Phase::Idle,
            server,
            client,
            last_failure: None,
            settings,
        }
    }

    /// Routes host decisions through `prompts`.
    #[must_use]
    pub fn with_prompts(mut self, prompts: impl HostPrompts + 'static) -> Self {
        self.prompts = Box::new(prompts);
        self
    }

    /// Sends lifecycle events to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn LifecycleReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Resolved settings.
    #[must_use]
    pub const fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Record of the most recent failed start, cleared by the next start.
    #[must_use]
    pub const fn last_failure(&self) -> Option<&StartupResult> {
        self.last_failure.as_ref()
    }

    /// PID of the server this orchestrator spawned, while it runs.
    #[must_use]
    pub fn server_pid(&self) -> Option<u32> {
        self.server.running_pid()
    }

    /// PID of the client this orchestrator spawned, while it runs.
    #[must_use]
    pub fn client_pid(&self) -> Option<u32> {
        self.client.running_pid()
    }

    /// Starts both services; `true` once the server is ready and the config
    /// has been handled.
    pub async fn start(&mut self) -> bool {
        self.start_detailed().await.is_ok()
    }

    /// Starts both services.
    ///
    /// # Errors
    ///
    /// Returns the diagnosed [`StartupResult`] when the server could not be
    /// brought up or the host declined config handling. Processes spawned by
    /// the attempt are torn down first.
    pub async fn start_detailed(&mut self) -> Result<ReadyReport, StartupResult> {
        self.stop().await;
        self.last_failure = None;
        match self.run_startup().await {
            Ok(report) => {
                self.enter(Phase::Ready);
                info!(
                    target: ORCHESTRATOR_TARGET,
                    port = self.settings.server_port,
                    server_pid = report.server_pid,
                    "browser tools ready"
                );
                Ok(report)
            }
            Err(error) => Err(self.fail(&error).await),
        }
    }

    async fn run_startup(&mut self) -> Result<ReadyReport, StartupError> {
        let port = self.settings.server_port;

        self.enter(Phase::PreflightChecking);
        let server_source = self.preflight().await?;

        self.enter(Phase::ResolvingPort);
        self.resolve_port().await;

        self.enter(Phase::SpawningServer);
        let spec = self
            .toolchain
            .launch_spec(&SERVER_PACKAGE, &server_source, port)
            .ok_or_else(|| StartupError::DependencyUnavailable {
                package: SERVER_PACKAGE.spec(),
            })?;
        self.server.transition(ServiceState::Starting);
        let mut handle = match self
            .supervisor
            .spawn(ServiceRole::Server, &spec, &self.server.pid_file)
            .await
        {
            Ok(handle) => handle,
            Err(error) => {
                self.server.transition(ServiceState::Failed);
                return Err(error.into());
            }
        };
        let server_pid = handle.pid();

        self.enter(Phase::AwaitingServerReady);
        let readiness = await_server(
            handle.events(),
            &self.readiness_probe,
            port,
            &self.settings.markers,
            &self.settings.timings,
        )
        .await;
        handle.events().close();
        self.server.handle = Some(handle);
        let signal = match readiness {
            ServerReadiness::Ready(signal) => signal,
            failure => {
                self.server.transition(ServiceState::Failed);
                return Err(self.readiness_failure(failure).await);
            }
        };
        self.server.transition(ServiceState::Running);
        self.reporter.server_ready(server_pid, &signal);

        self.enter(Phase::ReconcilingConfig);
        let client_source = self.toolchain.locate(&CLIENT_PACKAGE).await;
        let entry = self.client_entry(&client_source);
        let config = self.reconcile_config(&entry)?;

        self.enter(Phase::SpawningClient);
        let client = self.start_client(&client_source).await;

        Ok(ReadyReport {
            server_pid,
            server_signal: signal,
            config,
            client,
        })
    }

    async fn preflight(&self) -> Result<PackageSource, StartupError> {
        match self.toolchain.runtime_version().await {
            Some(found) if found >= MINIMUM_RUNTIME => {
                info!(target: ORCHESTRATOR_TARGET, version = %found, "runtime version accepted");
            }
            Some(found) => {
                return Err(StartupError::VersionIncompatible {
                    found,
                    required: MINIMUM_RUNTIME,
                });
            }
            None => {
                return Err(StartupError::DependencyUnavailable {
                    package: "Node.js runtime".to_owned(),
                });
            }
        }

        let source = self.toolchain.locate(&SERVER_PACKAGE).await;
        if !source.is_available() {
            return Err(StartupError::DependencyUnavailable {
                package: SERVER_PACKAGE.spec(),
            });
        }

        let debug_port = self.settings.browser_debug_port;
        if !self.ports.is_occupied(debug_port).await {
            warn!(
                target: ORCHESTRATOR_TARGET,
                port = debug_port,
                "no browser is listening for remote debugging; browser features stay unavailable until one is"
            );
        }
        Ok(source)
    }

    async fn resolve_port(&self) {
        let port = self.settings.server_port;
        let state = self.ports.port_state(port).await;
        if !state.occupied {
            return;
        }
        let occupied = StartupError::PortOccupied {
            port,
            occupant: state.occupant.clone(),
        };
        warn!(target: ORCHESTRATOR_TARGET, "{occupied}; reclaiming");
        if let Some(occupant) = &state.occupant {
            self.evict(occupant.pid).await;
        }
        let freed = self
            .ports
            .wait_until_free(port, self.settings.timings.port_free_timeout)
            .await;
        self.reporter
            .port_reclaimed(port, state.occupant.as_ref(), freed);
    }

    async fn evict(&self, pid: u32) {
        if pid == std::process::id() {
            warn!(target: ORCHESTRATOR_TARGET, pid, "port held by this process; not signalling");
            return;
        }
        let outcome =
            terminate_with_grace(pid, self.settings.timings.occupant_grace, EVICTION_POLL).await;
        info!(target: ORCHESTRATOR_TARGET, pid, ?outcome, "port occupant handled");
    }

    async fn readiness_failure(&self, failure: ServerReadiness) -> StartupError {
        let port = self.settings.server_port;
        match failure {
            ServerReadiness::BindFailure(line) => {
                let state = self.ports.port_state(port).await;
                if state.occupied {
                    StartupError::PortOccupied {
                        port,
                        occupant: state.occupant,
                    }
                } else {
                    StartupError::BindFailure { port, line }
                }
            }
            ServerReadiness::Exited(exit) => StartupError::ServerExited { exit },
            ServerReadiness::TimedOut | ServerReadiness::Ready(_) => {
                StartupError::ReadinessTimeout {
                    port,
                    waited: self.settings.timings.readiness_timeout,
                }
            }
        }
    }

    fn client_entry(&self, source: &PackageSource) -> ServiceEntry {
        let port = self.settings.server_port;
        let source = if source.is_available() {
            source.clone()
        } else {
            PackageSource::Runner
        };
        self.toolchain
            .launch_spec(&CLIENT_PACKAGE, &source, port)
            .map_or_else(
                || ServiceEntry {
                    command: "npx".to_owned(),
                    args: vec![
                        "-y".to_owned(),
                        CLIENT_PACKAGE.spec(),
                        "--port".to_owned(),
                        port.to_string(),
                    ],
                    env: [("NODE_ENV".to_owned(), "production".to_owned())].into(),
                },
                |spec| ServiceEntry::from_launch(&spec),
            )
    }

    fn reconcile_config(&self, entry: &ServiceEntry) -> Result<ConfigOutcome, StartupError> {
        let path = self.reconciler.path().to_path_buf();
        let outcome = match self.reconciler.load() {
            Ok(doc) => self.reconcile_loaded(&path, &doc, entry)?,
            Err(HostConfigError::Missing { .. }) => match self.prompts.missing_config(&path) {
                MissingConfigChoice::Create => {
                    let fresh = self.reconciler.reconcile(&ConfigDocument::empty(), entry);
                    self.reconciler.persist(&fresh)?;
                    ConfigOutcome::Created
                }
                MissingConfigChoice::Skip => ConfigOutcome::Skipped,
                MissingConfigChoice::ShowGuide => {
                    self.prompts.show_guide(&self.reconciler.manual_guide(entry));
                    return Err(StartupError::ConfigMissing { path });
                }
            },
            Err(error) if error.is_corrupted() => {
                match self.prompts.corrupted_config(&path, &error) {
                    CorruptedConfigChoice::BackupAndReset => ConfigOutcome::Reset {
                        backup: self.reconciler.backup_and_reset(entry)?,
                    },
                    CorruptedConfigChoice::ShowGuide => {
                        self.prompts.show_guide(&self.reconciler.manual_guide(entry));
                        return Err(StartupError::ConfigCorrupted {
                            path,
                            source: error,
                        });
                    }
                }
            }
            Err(error) => return Err(error.into()),
        };
        self.reporter.config_reconciled(&path, &outcome);
        Ok(outcome)
    }

    fn reconcile_loaded(
        &self,
        path: &Path,
        doc: &ConfigDocument,
        entry: &ServiceEntry,
    ) -> Result<ConfigOutcome, StartupError> {
        if self.reconciler.placement(doc) == EntryPlacement::Absent
            && self.prompts.missing_entry(path) == MissingEntryChoice::Skip
        {
            return Ok(ConfigOutcome::Skipped);
        }
        let next = self.reconciler.reconcile(doc, entry);
        if next == *doc {
            return Ok(ConfigOutcome::Unchanged);
        }
        self.reconciler.persist(&next)?;
        Ok(ConfigOutcome::Updated)
    }

    async fn start_client(&mut self, source: &PackageSource) -> ClientStatus {
        let port = self.settings.server_port;
        let Some(spec) = self.toolchain.launch_spec(&CLIENT_PACKAGE, source, port) else {
            let reason = format!("{} is unavailable", CLIENT_PACKAGE.spec());
            warn!(target: ORCHESTRATOR_TARGET, "{reason}; server remains available");
            return ClientStatus::NotStarted { reason };
        };
        self.client.transition(ServiceState::Starting);
        let mut handle = match self
            .supervisor
            .spawn(ServiceRole::Client, &spec, &self.client.pid_file)
            .await
        {
            Ok(handle) => handle,
            Err(error) => {
                self.client.transition(ServiceState::Failed);
                warn!(
                    target: ORCHESTRATOR_TARGET,
                    error = %error,
                    "client failed to launch; server remains available"
                );
                return ClientStatus::NotStarted {
                    reason: error.to_string(),
                };
            }
        };
        let outcome = await_client(
            handle.events(),
            &self.settings.markers,
            self.settings.timings.client_grace,
        )
        .await;
        handle.events().close();
        let pid = handle.pid();
        self.client.handle = Some(handle);
        self.client.transition(match outcome {
            ClientOutcome::Failed { .. } => ServiceState::Failed,
            ClientOutcome::Confirmed | ClientOutcome::LikelyStarted => ServiceState::Running,
        });
        self.reporter.client_settled(Some(pid), &outcome);
        ClientStatus::Spawned { pid, outcome }
    }

    async fn fail(&mut self, error: &StartupError) -> StartupResult {
        self.enter(Phase::Failed);
        warn!(target: ORCHESTRATOR_TARGET, error = %error, "startup failed; tearing down");
        self.shut_down_processes().await;
        let issues = self.diagnose().await;
        let result = StartupResult::from_failure(error, &issues);
        self.reporter.startup_failed(&result);
        self.last_failure = Some(result.clone());
        result
    }

    /// Stops both services, including ones started by another invocation
    /// and recorded in the PID files.
    ///
    /// Returns `false` only when a PID file could not be removed.
    pub async fn stop(&mut self) -> bool {
        self.enter(Phase::Stopping);
        let clean = self.shut_down_processes().await;
        self.enter(Phase::Idle);
        clean
    }

    async fn shut_down_processes(&mut self) -> bool {
        let own_pid = std::process::id();
        let mut clean = true;
        let mut targets: Vec<u32> = Vec::new();
        for slot in [&mut self.server, &mut self.client] {
            let recorded = match slot.pid_file.live_pid() {
                Ok(pid) => pid,
                Err(error) => {
                    warn!(
                        target: ORCHESTRATOR_TARGET,
                        role = %slot.role,
                        error = %error,
                        "ignoring unreadable pid file"
                    );
                    None
                }
            };
            for pid in slot.running_pid().into_iter().chain(recorded) {
                if pid != own_pid && !targets.contains(&pid) {
                    targets.push(pid);
                }
            }
            if slot.handle.is_some() {
                slot.transition(ServiceState::Stopping);
            }
        }

        for pid in &targets {
            terminate(*pid, false);
        }
        for slot in [&self.server, &self.client] {
            if let Err(error) = slot.pid_file.remove() {
                warn!(
                    target: ORCHESTRATOR_TARGET,
                    role = %slot.role,
                    error = %error,
                    "failed to remove pid file"
                );
                clean = false;
            }
        }
        if !targets.is_empty() {
            sleep(self.settings.timings.stop_grace).await;
            for pid in targets.iter().copied().filter(|pid| is_alive(*pid)) {
                warn!(target: ORCHESTRATOR_TARGET, pid, "process survived SIGTERM; forcing");
                terminate(pid, true);
            }
        }
        for slot in [&mut self.server, &mut self.client] {
            slot.handle = None;
            slot.state = ServiceState::Stopped;
        }
        self.reporter.stopped(targets.len());
        clean
    }

    /// Liveness, port, config, and browser state right now.
    pub async fn get_status(&self) -> ServiceStatus {
        let live = |slot: &ServiceSlot| slot.pid_file.live_pid().ok().flatten().is_some();
        let config_valid = self
            .reconciler
            .load()
            .is_ok_and(|doc| self.reconciler.validate(&doc));
        ServiceStatus {
            server_running: live(&self.server),
            client_running: live(&self.client),
            port_occupied: self.ports.is_occupied(self.settings.server_port).await,
            config_valid,
            browser_debugging: self
                .ports
                .is_occupied(self.settings.browser_debug_port)
                .await,
        }
    }

    /// Runs every failure check against the current system.
    pub async fn diagnose(&self) -> Vec<Issue> {
        let config_dir = self
            .settings
            .host_config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let scope = DiagnosisScope {
            server_port: self.settings.server_port,
            browser_debug_port: self.settings.browser_debug_port,
            runtime_dir: self.settings.paths.runtime_dir(),
            config_dir,
        };
        diagnosis::diagnose(&self.toolchain, &self.ports, &scope).await
    }

    /// Removes the managed entry from the host config.
    ///
    /// A missing file counts as success; an unusable one does not.
    pub fn uninstall_cleanup_config(&self) -> bool {
        let doc = match self.reconciler.load() {
            Ok(doc) => doc,
            Err(HostConfigError::Missing { .. }) => return true,
            Err(error) => {
                warn!(
                    target: ORCHESTRATOR_TARGET,
                    error = %error,
                    "cannot remove entry from host configuration"
                );
                return false;
            }
        };
        let cleaned = self.reconciler.remove_entry(&doc);
        if cleaned == doc {
            return true;
        }
        match self.reconciler.persist(&cleaned) {
            Ok(()) => {
                info!(
                    target: ORCHESTRATOR_TARGET,
                    file = %self.reconciler.path().display(),
                    "removed managed entry from host configuration"
                );
                true
            }
            Err(error) => {
                warn!(target: ORCHESTRATOR_TARGET, error = %error, "failed to rewrite host configuration");
                false
            }
        }
    }

    /// Manual configuration instructions for the current setup.
    pub async fn config_guide(&self) -> String {
        let source = self.toolchain.locate(&CLIENT_PACKAGE).await;
        self.reconciler.manual_guide(&self.client_entry(&source))
    }

    /// Everything logged so far.
    ///
    /// # Errors
    ///
    /// Returns [`LogBookError`] when the log cannot be read.
    pub fn get_logs(&self) -> Result<String, LogBookError> {
        self.logbook.read()
    }

    /// Empties the log.
    ///
    /// # Errors
    ///
    /// Returns [`LogBookError`] when the log cannot be truncated.
    pub fn clear_logs(&self) -> Result<(), LogBookError> {
        self.logbook.clear()
    }

    /// Location of the log sink.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.logbook.path().to_path_buf()
    }

    /// Resolves when the spawned server exits; `None` when no server is
    /// running under this orchestrator.
    pub async fn wait_for_server_exit(&self) -> Option<ExitRecord> {
        match &self.server.handle {
            Some(handle) => handle.exited().await,
            None => None,
        }
    }

    fn enter(&mut self, next: Phase) {
        let from = self.phase;
        if from == next {
            return;
        }
        if !from.permits(next) {
            warn!(
                target: ORCHESTRATOR_TARGET,
                %from,
                to = %next,
                "unexpected phase transition"
            );
        }
        self.reporter.phase_changed(from, next);
        self.phase = next;
    }
}
