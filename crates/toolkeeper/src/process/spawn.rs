use std::collections::BTreeMap;
use std::fmt;
use std::future::ready;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use super::PROCESS_TARGET;
use super::errors::SpawnError;
use super::pid_file::PidFile;
use crate::poll::{PollError, PollSchedule, Step, poll_bounded};

/// Attempts made while waiting for a PID.
pub const PID_POLL_ATTEMPTS: u32 = 15;

/// Pause between PID polls.
pub const PID_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Which managed process a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceRole {
    /// The data-collection server.
    Server,
    /// The protocol-bridge client.
    Client,
}

impl ServiceRole {
    /// Lowercase label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Program, argument vector, environment, and working directory of a child.
///
/// Arguments are passed to the OS as a literal vector; nothing goes through a
/// shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl LaunchSpec {
    /// Starts a spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable on top of the inherited environment.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Runs the child from `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program name or path.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Argument vector.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Extra environment variables.
    #[must_use]
    pub const fn environment(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Working directory, when set.
    #[must_use]
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }
}

impl fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRecord {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ExitRecord {
    /// Exit code, when the process exited normally.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        self.code
    }

    /// Terminating signal, when the process was killed.
    #[must_use]
    pub const fn signal(&self) -> Option<i32> {
        self.signal
    }

    const fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }
}

impl From<ExitStatus> for ExitRecord {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "terminated by signal {signal}"),
            (None, None) => f.write_str("exit status unknown"),
        }
    }
}

/// Observable activity of a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildEvent {
    /// One line of standard output, without the trailing newline.
    Stdout(String),
    /// One line of standard error, without the trailing newline.
    Stderr(String),
    /// The process ended.
    Exited(ExitRecord),
}

/// Ordered stream of [`ChildEvent`]s for one child.
#[derive(Debug)]
pub struct ChildEvents {
    receiver: mpsc::UnboundedReceiver<ChildEvent>,
}

impl ChildEvents {
    pub(crate) const fn new(receiver: mpsc::UnboundedReceiver<ChildEvent>) -> Self {
        Self { receiver }
    }

    /// Next event, or `None` once the child has exited and its pipes closed.
    pub async fn next(&mut self) -> Option<ChildEvent> {
        self.receiver.recv().await
    }

    /// Stops buffering further events. Output is still logged.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// A live child and its event stream.
///
/// Output lines are logged as they arrive whether or not anyone reads
/// [`ProcessHandle::events`].
#[derive(Debug)]
pub struct ProcessHandle {
    role: ServiceRole,
    pid: u32,
    events: ChildEvents,
    exit: watch::Receiver<Option<ExitRecord>>,
}

impl ProcessHandle {
    /// Which managed process this is.
    #[must_use]
    pub const fn role(&self) -> ServiceRole {
        self.role
    }

    /// OS process identifier.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Output and exit events.
    pub fn events(&mut self) -> &mut ChildEvents {
        &mut self.events
    }

    /// Exit record, once the process has ended.
    #[must_use]
    pub fn exit_record(&self) -> Option<ExitRecord> {
        *self.exit.borrow()
    }

    /// Whether the process has ended.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exit_record().is_some()
    }

    /// Resolves when the process ends.
    pub async fn exited(&self) -> Option<ExitRecord> {
        let mut exit = self.exit.clone();
        exit.wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|record| *record)
    }
}

/// Launches managed processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSupervisor {
    pid_schedule: PollSchedule,
}

impl ProcessSupervisor {
    /// Builds a supervisor polling for PIDs on `pid_schedule`.
    #[must_use]
    pub const fn new(pid_schedule: PollSchedule) -> Self {
        Self { pid_schedule }
    }

    /// Starts `spec`, records its PID in `pid_file`, and wires up output
    /// forwarding plus an exit observer.
    ///
    /// Must run inside a tokio runtime; the child is killed if that runtime
    /// shuts down first.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] when the OS refuses the process, when no PID
    /// appears in time, or when the PID cannot be recorded.
    pub async fn spawn(
        &self,
        role: ServiceRole,
        spec: &LaunchSpec,
        pid_file: &PidFile,
    ) -> Result<ProcessHandle, SpawnError> {
        let mut command = Command::new(spec.program());
        command
            .args(spec.arguments())
            .envs(spec.environment())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = spec.cwd() {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| SpawnError::Launch {
            program: spec.program().to_owned(),
            source,
        })?;
        let pid = acquire_pid(&mut child, self.pid_schedule)
            .await
            .map_err(|error| match error {
                PollError::Exhausted { attempts } => SpawnError::PidUnavailable {
                    program: spec.program().to_owned(),
                    attempts,
                },
                PollError::Aborted(exit) => SpawnError::ExitedBeforePid {
                    program: spec.program().to_owned(),
                    exit,
                },
            })?;

        if let Err(source) = pid_file.write(pid) {
            if let Err(error) = child.start_kill() {
                warn!(
                    target: PROCESS_TARGET,
                    %role,
                    pid,
                    error = %error,
                    "failed to kill child after pid write failure"
                );
            }
            return Err(SpawnError::PidFile {
                program: spec.program().to_owned(),
                source,
            });
        }
        info!(
            target: PROCESS_TARGET,
            %role,
            pid,
            command = %spec,
            "child started"
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(
                role,
                pid,
                OutputStream::Stdout,
                stdout,
                event_tx.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(
                role,
                pid,
                OutputStream::Stderr,
                stderr,
                event_tx.clone(),
            ));
        }
        let stdin = child.stdin.take();
        tokio::spawn(observe_exit(ExitObserver {
            child,
            stdin,
            role,
            pid,
            pid_file: pid_file.clone(),
            exit_tx,
            event_tx,
        }));

        Ok(ProcessHandle {
            role,
            pid,
            events: ChildEvents::new(event_rx),
            exit: exit_rx,
        })
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(PollSchedule::attempts(PID_POLL_ATTEMPTS, PID_POLL_INTERVAL))
    }
}

async fn acquire_pid(
    child: &mut Child,
    schedule: PollSchedule,
) -> Result<u32, PollError<ExitRecord>> {
    poll_bounded(schedule, |_| {
        let step = match child.id() {
            Some(pid) => Step::Done(pid),
            None => match child.try_wait() {
                Ok(Some(status)) => Step::Abort(ExitRecord::from(status)),
                Ok(None) | Err(_) => Step::Retry,
            },
        };
        ready(step)
    })
    .await
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn event(self, line: String) -> ChildEvent {
        match self {
            Self::Stdout => ChildEvent::Stdout(line),
            Self::Stderr => ChildEvent::Stderr(line),
        }
    }
}

async fn forward_lines<R>(
    role: ServiceRole,
    pid: u32,
    stream: OutputStream,
    reader: R,
    events: mpsc::UnboundedSender<ChildEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                match stream {
                    OutputStream::Stdout => {
                        info!(target: PROCESS_TARGET, %role, pid, "{line}");
                    }
                    OutputStream::Stderr => {
                        warn!(target: PROCESS_TARGET, %role, pid, "{line}");
                    }
                }
                // Nobody listening is fine; the line has been logged.
                events.send(stream.event(line)).ok();
            }
            Ok(None) => break,
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    %role,
                    pid,
                    error = %error,
                    "stopped reading child output"
                );
                break;
            }
        }
    }
}

struct ExitObserver {
    child: Child,
    stdin: Option<ChildStdin>,
    role: ServiceRole,
    pid: u32,
    pid_file: PidFile,
    exit_tx: watch::Sender<Option<ExitRecord>>,
    event_tx: mpsc::UnboundedSender<ChildEvent>,
}

async fn observe_exit(observer: ExitObserver) {
    let ExitObserver {
        mut child,
        stdin,
        role,
        pid,
        pid_file,
        exit_tx,
        event_tx,
    } = observer;
    let record = match child.wait().await {
        Ok(status) => ExitRecord::from(status),
        Err(error) => {
            warn!(
                target: PROCESS_TARGET,
                %role,
                pid,
                error = %error,
                "failed to wait for child"
            );
            ExitRecord::unknown()
        }
    };
    // Stdin stays open for the child's whole life.
    drop(stdin);
    info!(target: PROCESS_TARGET, %role, pid, exit = %record, "child exited");
    pid_file.release(pid);
    exit_tx.send_replace(Some(record));
    event_tx.send(ChildEvent::Exited(record)).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn shell(script: &str) -> LaunchSpec {
        LaunchSpec::new("sh").args(["-c", script])
    }

    async fn drain(handle: &mut ProcessHandle) -> Vec<ChildEvent> {
        let mut seen = Vec::new();
        while let Some(event) = handle.events().next().await {
            let done = matches!(event, ChildEvent::Exited(_));
            seen.push(event);
            if done {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn forwards_output_and_exit_then_releases_pid_file() {
        let dir = TempDir::new().expect("create temp dir");
        let pid_file = PidFile::new(dir.path().join("server.pid"));
        let spec = shell("echo ready; echo oops >&2; exit 3");

        let mut handle = ProcessSupervisor::default()
            .spawn(ServiceRole::Server, &spec, &pid_file)
            .await
            .expect("spawn shell");
        assert!(handle.pid() >= 1);

        let events = drain(&mut handle).await;

        assert!(events.contains(&ChildEvent::Stdout("ready".to_owned())));
        assert!(events.contains(&ChildEvent::Stderr("oops".to_owned())));
        let exit = handle.exited().await.expect("exit recorded");
        assert_eq!(exit.code(), Some(3));
        assert!(handle.has_exited());
        assert!(!pid_file.path().exists(), "exit should release the pid file");
    }

    #[tokio::test]
    async fn records_pid_while_running() {
        let dir = TempDir::new().expect("create temp dir");
        let pid_file = PidFile::new(dir.path().join("client.pid"));
        let spec = LaunchSpec::new("sleep").arg("30");

        let handle = ProcessSupervisor::default()
            .spawn(ServiceRole::Client, &spec, &pid_file)
            .await
            .expect("spawn sleep");

        assert_eq!(pid_file.read().expect("read pid"), Some(handle.pid()));
        assert!(!handle.has_exited());
        assert!(crate::process::terminate(handle.pid(), false));
        let exit = handle.exited().await.expect("exit recorded");
        assert_eq!(exit.signal(), Some(15));
    }

    #[tokio::test]
    async fn passes_arguments_and_environment_literally() {
        let dir = TempDir::new().expect("create temp dir");
        let pid_file = PidFile::new(dir.path().join("server.pid"));
        let spec = shell("echo \"$MODE:$1\"")
            .arg("sh")
            .arg("$(not expanded)")
            .env("MODE", "production");

        let mut handle = ProcessSupervisor::default()
            .spawn(ServiceRole::Server, &spec, &pid_file)
            .await
            .expect("spawn shell");
        let events = drain(&mut handle).await;

        assert_eq!(
            events.first(),
            Some(&ChildEvent::Stdout("production:$(not expanded)".to_owned()))
        );
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let dir = TempDir::new().expect("create temp dir");
        let pid_file = PidFile::new(dir.path().join("server.pid"));
        let spec = LaunchSpec::new("toolkeeper-definitely-missing-binary");

        let error = ProcessSupervisor::default()
            .spawn(ServiceRole::Server, &spec, &pid_file)
            .await
            .expect_err("spawn should fail");

        assert!(matches!(error, SpawnError::Launch { .. }));
        assert!(!pid_file.path().exists());
    }

    #[tokio::test]
    async fn unwritable_pid_file_fails_the_spawn() {
        let dir = TempDir::new().expect("create temp dir");
        let pid_file = PidFile::new(dir.path().join("missing").join("server.pid"));
        let spec = LaunchSpec::new("sleep").arg("30");

        let error = ProcessSupervisor::default()
            .spawn(ServiceRole::Server, &spec, &pid_file)
            .await
            .expect_err("spawn should fail");

        assert!(matches!(error, SpawnError::PidFile { .. }));
    }

    #[rstest]
    #[case::code(ExitRecord { code: Some(1), signal: None }, "exit code 1")]
    #[case::signal(ExitRecord { code: None, signal: Some(9) }, "terminated by signal 9")]
    #[case::unknown(ExitRecord::unknown(), "exit status unknown")]
    fn exit_records_describe_themselves(#[case] record: ExitRecord, #[case] expected: &str) {
        assert_eq!(record.to_string(), expected);
    }

    #[test]
    fn launch_spec_displays_command_line() {
        let spec = LaunchSpec::new("npx").args(["-y", "pkg@1.0.0", "--port", "3025"]);
        assert_eq!(spec.to_string(), "npx -y pkg@1.0.0 --port 3025");
    }
}
