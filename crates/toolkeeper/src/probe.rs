//! TCP port probing.
//!
//! Answers whether something listens on a local port, who that is when the OS
//! can tell us, and waits for a port to be released.

use std::fmt;
use std::io;
use std::ops::RangeInclusive;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::poll::{PollSchedule, Step, poll_bounded};

const PROBE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::probe");

/// Connect timeout used by [`PortProbe::default`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll interval used by [`PortProbe::default`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Process holding a listening socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occupant {
    /// Process identifier.
    pub pid: u32,
    /// Command name as reported by the OS.
    pub command: String,
}

impl fmt::Display for Occupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {})", self.command, self.pid)
    }
}

/// Snapshot of a port. Recomputed on every call and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortState {
    /// Whether a connection attempt succeeded.
    pub occupied: bool,
    /// Listener details, when they could be resolved.
    pub occupant: Option<Occupant>,
}

/// Probes local TCP ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortProbe {
    connect_timeout: Duration,
    poll_interval: Duration,
}

impl PortProbe {
    /// Builds a probe with explicit timings.
    #[must_use]
    pub const fn new(connect_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            connect_timeout,
            poll_interval,
        }
    }

    /// Interval used by [`PortProbe::wait_until_free`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns whether a TCP connection to `localhost:port` succeeds.
    ///
    /// Refused connections and timeouts both count as free.
    pub async fn is_occupied(&self, port: u16) -> bool {
        match timeout(self.connect_timeout, TcpStream::connect(("localhost", port))).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(error)) => {
                debug!(
                    target: PROBE_TARGET,
                    port,
                    error = %error,
                    "port refused connection"
                );
                false
            }
            Err(_) => {
                debug!(target: PROBE_TARGET, port, "port probe timed out");
                false
            }
        }
    }

    /// Occupancy plus occupant details.
    pub async fn port_state(&self, port: u16) -> PortState {
        let occupied = self.is_occupied(port).await;
        let occupant = if occupied {
            self.occupant_info(port).await
        } else {
            None
        };
        PortState { occupied, occupant }
    }

    /// Asks `lsof` which process listens on `port`.
    ///
    /// Best effort: any failure, including a missing `lsof`, yields `None`.
    pub async fn occupant_info(&self, port: u16) -> Option<Occupant> {
        let output = match query_lsof(port).await {
            Ok(output) => output,
            Err(error) => {
                debug!(
                    target: PROBE_TARGET,
                    port,
                    error = %error,
                    "occupant lookup unavailable"
                );
                return None;
            }
        };
        if !output.status.success() {
            return None;
        }
        parse_lsof(&String::from_utf8_lossy(&output.stdout))
    }

    /// Polls until `port` is free or `limit` elapses; returns whether it freed.
    pub async fn wait_until_free(&self, port: u16, limit: Duration) -> bool {
        let schedule = PollSchedule::deadline(limit, self.poll_interval);
        let outcome: Result<(), _> = poll_bounded(schedule, |attempt| async move {
            if self.is_occupied(port).await {
                debug!(target: PROBE_TARGET, port, attempt, "port still occupied");
                Step::<(), ()>::Retry
            } else {
                Step::Done(())
            }
        })
        .await;
        outcome.is_ok()
    }

    /// First port in `range` that nothing listens on.
    pub async fn find_available_port(&self, range: RangeInclusive<u16>) -> Option<u16> {
        for port in range {
            if !self.is_occupied(port).await {
                return Some(port);
            }
        }
        None
    }
}

impl Default for PortProbe {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

async fn query_lsof(port: u16) -> io::Result<std::process::Output> {
    Command::new("lsof")
        .args(["-nP", &format!("-iTCP:{port}"), "-sTCP:LISTEN"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
}

/// Extracts the first `COMMAND PID ...` row below the `lsof` header.
fn parse_lsof(output: &str) -> Option<Occupant> {
    output.lines().skip(1).find_map(|line| {
        let mut columns = line.split_whitespace();
        let command = columns.next()?;
        let pid = columns.next()?.parse::<u32>().ok()?;
        Some(Occupant {
            pid,
            command: command.to_owned(),
        })
    })
}
