//! Fakes shared by the orchestrator suites.
//!
//! Managed processes are stood in for by `sh -c` scripts, so the suites
//! exercise real spawning, PID files, and signals without Node.js.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tempfile::TempDir;
use toolkeeper_config::{Config, SchemaPreference};

use crate::orchestrator::{
    ClientOutcome, ConfigOutcome, Orchestrator, OrchestratorSettings, Phase, ReadinessProbe,
    ReadySignal, StartupResult, Timings,
};
use crate::poll::PollSchedule;
use crate::probe::Occupant;
use crate::process::LaunchSpec;
use crate::reporter::LifecycleReporter;
use crate::toolchain::{Package, PackageSource, RuntimeVersion, SERVER_PACKAGE, Toolchain};

/// Announces readiness, then idles.
pub const READY_SERVER: &str = r#"echo "Browser Tools Server Started on port $2"; exec sleep 30"#;
/// Reports a failed bind on stderr, then idles.
pub const CLASHING_SERVER: &str =
    r#"echo "Error: listen EADDRINUSE: address already in use :::$2" >&2; exec sleep 30"#;
/// Announces its connection, then idles.
pub const READY_CLIENT: &str = r#"echo "MCP client started"; exec sleep 30"#;

/// Runs each package as a shell script.
#[derive(Debug, Clone)]
pub struct ScriptToolchain {
    pub version: Option<RuntimeVersion>,
    pub server: Option<String>,
    pub client: Option<String>,
}

impl ScriptToolchain {
    pub fn healthy() -> Self {
        Self {
            version: Some(RuntimeVersion::new(20, 11, 1)),
            server: Some(READY_SERVER.to_owned()),
            client: Some(READY_CLIENT.to_owned()),
        }
    }

    fn script(&self, package: &Package) -> Option<&str> {
        if *package == SERVER_PACKAGE {
            self.server.as_deref()
        } else {
            self.client.as_deref()
        }
    }
}

impl Toolchain for ScriptToolchain {
    async fn runtime_version(&self) -> Option<RuntimeVersion> {
        self.version
    }

    async fn locate(&self, package: &Package) -> PackageSource {
        if self.script(package).is_some() {
            PackageSource::Runner
        } else {
            PackageSource::Unavailable
        }
    }

    fn launch_spec(
        &self,
        package: &Package,
        source: &PackageSource,
        port: u16,
    ) -> Option<LaunchSpec> {
        if !source.is_available() {
            return None;
        }
        let script = self.script(package)?;
        Some(LaunchSpec::new("sh").args([
            "-c".to_owned(),
            script.to_owned(),
            package.name.to_owned(),
            "--port".to_owned(),
            port.to_string(),
        ]))
    }
}

/// A server that never answers HTTP.
#[derive(Debug, Clone, Copy)]
pub struct SilentProbe;

impl ReadinessProbe for SilentProbe {
    async fn answers(&self, _port: u16) -> bool {
        false
    }
}

/// Captures every phase change.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    phases: Mutex<Vec<Phase>>,
    failures: Mutex<Vec<StartupResult>>,
}

impl RecordingReporter {
    pub fn phases(&self) -> Vec<Phase> {
        self.phases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn failures(&self) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl LifecycleReporter for RecordingReporter {
    fn phase_changed(&self, _from: Phase, to: Phase) {
        self.phases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(to);
    }

    fn port_reclaimed(&self, _port: u16, _occupant: Option<&Occupant>, _freed: bool) {}

    fn server_ready(&self, _pid: u32, _signal: &ReadySignal) {}

    fn config_reconciled(&self, _path: &Path, _outcome: &ConfigOutcome) {}

    fn client_settled(&self, _pid: Option<u32>, _outcome: &ClientOutcome) {}

    fn startup_failed(&self, result: &StartupResult) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
    }

    fn stopped(&self, _signalled: usize) {}
}

/// Short timers so failures surface quickly.
pub fn quick_timings() -> Timings {
    Timings {
        port_free_timeout: Duration::from_secs(6),
        port_poll: Duration::from_millis(100),
        connect_timeout: Duration::from_millis(200),
        occupant_grace: Duration::from_millis(500),
        probe_interval: Duration::from_millis(250),
        probe_timeout: Duration::from_millis(250),
        readiness_timeout: Duration::from_secs(3),
        client_grace: Duration::from_secs(1),
        stop_grace: Duration::from_millis(300),
        pid_schedule: PollSchedule::attempts(15, Duration::from_millis(20)),
    }
}

/// An unused loopback port.
pub fn free_port() -> u16 {
    TcpListener::bind(("127.0.0.1", 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("bind ephemeral port")
}

/// Temporary runtime directory and host config location.
pub struct Sandbox {
    pub dir: TempDir,
    pub settings: OrchestratorSettings,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let config = Config {
            server_port: free_port(),
            browser_debug_port: free_port(),
            runtime_dir: dir.path().join("run"),
            host_config_path: dir.path().join("host").join("mcp.json"),
            package_root: dir.path().to_path_buf(),
            schema_preference: SchemaPreference::Auto,
            ..Config::default()
        };
        let settings = OrchestratorSettings::from_config(&config)
            .expect("resolve settings")
            .with_timings(quick_timings());
        Self { dir, settings }
    }

    pub fn host_config(&self) -> PathBuf {
        self.settings.host_config_path.clone()
    }

    pub fn seed_host_config(&self, contents: &str) {
        let path = self.host_config();
        std::fs::create_dir_all(path.parent().expect("config has parent"))
            .expect("create host dir");
        std::fs::write(path, contents).expect("seed host config");
    }

    pub fn read_host_config(&self) -> serde_json::Value {
        let text = std::fs::read_to_string(self.host_config()).expect("read host config");
        serde_json::from_str(&text).expect("host config parses")
    }

    pub fn orchestrator(
        &self,
        toolchain: ScriptToolchain,
        reporter: Arc<RecordingReporter>,
    ) -> Orchestrator<ScriptToolchain, SilentProbe> {
        Orchestrator::new(self.settings.clone(), toolchain, SilentProbe).with_reporter(reporter)
    }
}
