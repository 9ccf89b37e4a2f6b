use std::future::ready;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use super::PROCESS_TARGET;
use crate::poll::{PollSchedule, Step, poll_bounded};

/// How [`terminate_with_grace`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// `SIGTERM` could not be delivered; the process is gone or not ours.
    NotSignalled,
    /// The process exited within the grace period.
    Exited,
    /// The process outlived the grace period and was sent `SIGKILL`.
    Forced,
}

/// Sends `SIGTERM`, waits up to `grace` for `pid` to go away, checking every
/// `poll`, then sends `SIGKILL` if it is still there.
pub async fn terminate_with_grace(pid: u32, grace: Duration, poll: Duration) -> Termination {
    if !terminate(pid, false) {
        return Termination::NotSignalled;
    }
    let exited: Result<(), _> = poll_bounded(PollSchedule::deadline(grace, poll), |_| {
        ready(if is_alive(pid) {
            Step::<(), ()>::Retry
        } else {
            Step::Done(())
        })
    })
    .await;
    if exited.is_ok() {
        return Termination::Exited;
    }
    warn!(target: PROCESS_TARGET, pid, ?grace, "SIGTERM ignored; forcing");
    terminate(pid, true);
    Termination::Forced
}

/// Whether `pid` names an existing process.
///
/// Sends the null signal, which checks existence without delivering anything.
/// `EPERM` means the process exists but belongs to someone else.
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    let Some(target) = as_pid(pid) else {
        return false;
    };
    match kill(target, None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Asks `pid` to stop: `SIGTERM`, or `SIGKILL` when `force` is set.
///
/// Returns whether the OS accepted the signal. Exit is asynchronous and is
/// observed separately. The calling process is never signalled.
pub fn terminate(pid: u32, force: bool) -> bool {
    if pid == std::process::id() {
        warn!(target: PROCESS_TARGET, pid, "refusing to signal own process");
        return false;
    }
    let Some(target) = as_pid(pid) else {
        return false;
    };
    let signal = if force {
        Signal::SIGKILL
    } else {
        Signal::SIGTERM
    };
    match kill(target, signal) {
        Ok(()) => {
            info!(target: PROCESS_TARGET, pid, signal = %signal, "signal delivered");
            true
        }
        Err(errno) => {
            debug!(
                target: PROCESS_TARGET,
                pid,
                signal = %signal,
                error = %errno,
                "signal rejected"
            );
            false
        }
    }
}

fn as_pid(pid: u32) -> Option<Pid> {
    if pid == 0 {
        return None;
    }
    i32::try_from(pid).ok().map(Pid::from_raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Command;

    #[test]
    fn current_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[rstest]
    #[case::zero(0)]
    #[case::beyond_pid_range(u32::MAX)]
    fn invalid_pids_are_never_alive(#[case] pid: u32) {
        assert!(!is_alive(pid));
        assert!(!terminate(pid, true));
    }

    #[test]
    fn refuses_to_signal_itself() {
        assert!(!terminate(std::process::id(), false));
    }

    #[rstest]
    #[case::graceful(false, 15)]
    #[case::forced(true, 9)]
    fn delivers_requested_signal(#[case] force: bool, #[case] expected: i32) {
        let mut child = Command::new("sleep").arg("30").spawn().expect("spawn sleep");

        assert!(terminate(child.id(), force));
        let status = child.wait().expect("wait for child");

        assert_eq!(status.signal(), Some(expected));
    }

    const GRACE: Duration = Duration::from_millis(500);
    const CHECK: Duration = Duration::from_millis(50);

    /// Spawns `script` under `sh` and waits for its first line, so any trap
    /// is installed before it is signalled. The child is reaped in the
    /// background so its PID disappears as soon as it exits.
    async fn spawn_reaped(
        script: &str,
    ) -> (u32, tokio::task::JoinHandle<std::io::Result<std::process::ExitStatus>>) {
        use tokio::io::{AsyncBufReadExt, BufReader};

        let mut child = tokio::process::Command::new("sh")
            .args(["-c", script])
            .stdout(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .expect("spawn sh");
        let pid = child.id().expect("child pid");
        let stdout = child.stdout.take().expect("piped stdout");
        let mut lines = BufReader::new(stdout).lines();
        lines.next_line().await.expect("read first line");
        (pid, tokio::spawn(async move { child.wait().await }))
    }

    #[tokio::test]
    async fn process_ignoring_sigterm_is_killed_after_grace() {
        let (pid, reaper) = spawn_reaped("trap '' TERM; echo armed; exec sleep 30").await;

        let started = tokio::time::Instant::now();
        let outcome = terminate_with_grace(pid, GRACE, CHECK).await;

        assert_eq!(outcome, Termination::Forced);
        assert!(started.elapsed() >= GRACE);
        let status = tokio::time::timeout(GRACE * 4, reaper)
            .await
            .expect("process gone shortly after the grace period")
            .expect("reaper task")
            .expect("wait status");
        assert_eq!(status.signal(), Some(9));
        assert!(!is_alive(pid));
    }

    #[tokio::test]
    async fn process_honouring_sigterm_is_never_forced() {
        let (pid, reaper) = spawn_reaped("echo up; exec sleep 30").await;

        let outcome = terminate_with_grace(pid, GRACE, CHECK).await;

        assert_eq!(outcome, Termination::Exited);
        let status = reaper.await.expect("reaper task").expect("wait status");
        assert_eq!(status.signal(), Some(15));
    }

    #[tokio::test]
    async fn own_process_is_not_signalled() {
        let outcome = terminate_with_grace(std::process::id(), GRACE, CHECK).await;
        assert_eq!(outcome, Termination::NotSignalled);
    }

    #[test]
    fn reaped_process_is_not_alive() {
        let mut child = Command::new("true").spawn().expect("spawn true");
        let pid = child.id();
        child.wait().expect("wait for child");
        assert!(!is_alive(pid));
    }
}
