//! Readiness races for the server and client.
//!
//! The server is considered up on whichever happens first: a ready marker on
//! stdout, a periodic HTTP probe answering, or the final probe at the
//! timeout. A bind-failure marker on stderr or an early exit ends the race as
//! a failure. Losing contenders are dropped, which cancels their timers and
//! in-flight requests.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::debug;

use super::settings::{ReadinessMarkers, Timings};
use crate::process::{ChildEvent, ChildEvents, ExitRecord};
use crate::race::Race;

const READINESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::readiness");

/// Checks whether the server answers on a port.
pub trait ReadinessProbe {
    /// Whether anything answered an HTTP request to `localhost:port`.
    fn answers(&self, port: u16) -> impl Future<Output = bool>;
}

/// `GET http://localhost:<port>/`; any HTTP response counts, whatever its
/// status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Builds a probe whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns the client construction error from `reqwest`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl ReadinessProbe for HttpProbe {
    async fn answers(&self, port: u16) -> bool {
        let url = format!("http://localhost:{port}/");
        match self.client.get(&url).send().await {
            Ok(response) => {
                debug!(
                    target: READINESS_TARGET,
                    port,
                    status = %response.status(),
                    "readiness probe answered"
                );
                true
            }
            Err(error) => {
                debug!(target: READINESS_TARGET, port, error = %error, "readiness probe failed");
                false
            }
        }
    }
}

/// Which signal proved the server ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadySignal {
    /// A stdout line carried a ready marker.
    Output(String),
    /// A periodic probe answered.
    Probe,
    /// The probe at the timeout answered.
    FinalProbe,
}

/// Outcome of the server readiness race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReadiness {
    /// The server is up.
    Ready(ReadySignal),
    /// A stderr line reported that the port could not be bound.
    BindFailure(String),
    /// The server exited first.
    Exited(ExitRecord),
    /// Nothing answered, not even the final probe.
    TimedOut,
}

/// Whether a server contender settled the race or the timeout ran out.
enum Contest {
    Settled(ServerReadiness),
    Deadline,
}

/// Races the server's signals.
///
/// Reaching the readiness timeout ends the race and drops the other
/// contenders; the final probe then runs alone and its answer stands.
pub async fn await_server<P: ReadinessProbe>(
    events: &mut ChildEvents,
    probe: &P,
    port: u16,
    markers: &ReadinessMarkers,
    timings: &Timings,
) -> ServerReadiness {
    let contest = Race::new()
        .with(async {
            watch_server_output(events, markers)
                .await
                .map(Contest::Settled)
        })
        .with(async {
            probe_periodically(probe, port, timings.probe_interval)
                .await
                .map(Contest::Settled)
        })
        .with(async {
            sleep(timings.readiness_timeout).await;
            Some(Contest::Deadline)
        })
        .run()
        .await;
    match contest {
        Some(Contest::Settled(readiness)) => readiness,
        Some(Contest::Deadline) | None => final_probe(probe, port).await,
    }
}

async fn final_probe<P: ReadinessProbe>(probe: &P, port: u16) -> ServerReadiness {
    debug!(target: READINESS_TARGET, port, "readiness timeout reached, final probe");
    if probe.answers(port).await {
        ServerReadiness::Ready(ReadySignal::FinalProbe)
    } else {
        ServerReadiness::TimedOut
    }
}

async fn watch_server_output(
    events: &mut ChildEvents,
    markers: &ReadinessMarkers,
) -> Option<ServerReadiness> {
    while let Some(event) = events.next().await {
        match event {
            ChildEvent::Stdout(line) if markers.is_server_ready(&line) => {
                return Some(ServerReadiness::Ready(ReadySignal::Output(line)));
            }
            ChildEvent::Stderr(line) if markers.is_bind_failure(&line) => {
                return Some(ServerReadiness::BindFailure(line));
            }
            ChildEvent::Exited(record) => return Some(ServerReadiness::Exited(record)),
            ChildEvent::Stdout(_) | ChildEvent::Stderr(_) => {}
        }
    }
    None
}

async fn probe_periodically<P: ReadinessProbe>(
    probe: &P,
    port: u16,
    period: Duration,
) -> Option<ServerReadiness> {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if probe.answers(port).await {
            return Some(ServerReadiness::Ready(ReadySignal::Probe));
        }
    }
}

/// Outcome of the client race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOutcome {
    /// The client printed a connection marker.
    Confirmed,
    /// The client stayed up and quiet through the grace period.
    LikelyStarted,
    /// The client exited during the grace period.
    Failed {
        /// How it ended.
        exit: ExitRecord,
    },
}

/// Races the client's marker against its exit and the grace period.
///
/// The client speaks its protocol on stdout, so markers are accepted on
/// either stream.
pub async fn await_client(
    events: &mut ChildEvents,
    markers: &ReadinessMarkers,
    grace: Duration,
) -> ClientOutcome {
    let watch = async {
        while let Some(event) = events.next().await {
            match event {
                ChildEvent::Stdout(line) | ChildEvent::Stderr(line)
                    if markers.is_client_ready(&line) =>
                {
                    return Some(ClientOutcome::Confirmed);
                }
                ChildEvent::Exited(exit) => return Some(ClientOutcome::Failed { exit }),
                ChildEvent::Stdout(_) | ChildEvent::Stderr(_) => {}
            }
        }
        None
    };
    Race::new()
        .with(watch)
        .with(async {
            sleep(grace).await;
            Some(ClientOutcome::LikelyStarted)
        })
        .run()
        .await
        .unwrap_or(ClientOutcome::LikelyStarted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::sync::mpsc;

    struct SpyProbe {
        calls: Cell<u32>,
        answers_after: Option<Duration>,
        started: Instant,
    }

    impl SpyProbe {
        fn answering_after(delay: Duration) -> Self {
            Self {
                calls: Cell::new(0),
                answers_after: Some(delay),
                started: Instant::now(),
            }
        }

        fn silent() -> Self {
            Self {
                calls: Cell::new(0),
                answers_after: None,
                started: Instant::now(),
            }
        }
    }

    impl ReadinessProbe for SpyProbe {
        async fn answers(&self, _port: u16) -> bool {
            self.calls.set(self.calls.get() + 1);
            self.answers_after
                .is_some_and(|delay| self.started.elapsed() >= delay)
        }
    }

    /// Answers nothing until 5 s, stalls the call made at the timeout, and
    /// answers every call from 6 s on.
    struct StallingProbe {
        calls: Cell<u32>,
        started: Instant,
    }

    impl ReadinessProbe for StallingProbe {
        async fn answers(&self, _port: u16) -> bool {
            self.calls.set(self.calls.get() + 1);
            let at = self.started.elapsed();
            if at >= Duration::from_secs(6) {
                return true;
            }
            if at >= Duration::from_secs(5) {
                sleep(Duration::from_secs(3)).await;
            }
            false
        }
    }

    fn channel() -> (mpsc::UnboundedSender<ChildEvent>, ChildEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, ChildEvents::new(rx))
    }

    fn emit_after(tx: &mpsc::UnboundedSender<ChildEvent>, delay: Duration, event: ChildEvent) {
        let sender = tx.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            sender.send(event).ok();
        });
    }

    fn fixtures() -> (ReadinessMarkers, Timings) {
        (ReadinessMarkers::for_port(3025), Timings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn output_marker_wins_before_first_probe() {
        let (markers, timings) = fixtures();
        let (tx, mut events) = channel();
        let probe = SpyProbe::answering_after(Duration::ZERO);
        emit_after(
            &tx,
            Duration::from_secs(1),
            ChildEvent::Stdout("Browser Tools Server Started".to_owned()),
        );

        let started = Instant::now();
        let outcome = await_server(&mut events, &probe, 3025, &markers, &timings).await;

        assert_eq!(
            outcome,
            ServerReadiness::Ready(ReadySignal::Output("Browser Tools Server Started".to_owned()))
        );
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert!(probe.calls.get() <= 1, "probe called {} times", probe.calls.get());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_ready_via_periodic_probe() {
        let (markers, timings) = fixtures();
        let (_tx, mut events) = channel();
        let probe = SpyProbe::answering_after(Duration::from_secs(3));

        let started = Instant::now();
        let outcome = await_server(&mut events, &probe, 3025, &markers, &timings).await;

        assert_eq!(outcome, ServerReadiness::Ready(ReadySignal::Probe));
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert_eq!(probe.calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_probes_time_out_after_final_check() {
        let (markers, timings) = fixtures();
        let (_tx, mut events) = channel();
        let probe = SpyProbe::silent();

        let started = Instant::now();
        let outcome = await_server(&mut events, &probe, 3025, &markers, &timings).await;

        assert_eq!(outcome, ServerReadiness::TimedOut);
        assert_eq!(started.elapsed(), timings.readiness_timeout);
        // Periodic probes at 2 s and 4 s, then the final one at 5 s.
        assert_eq!(probe.calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn final_probe_can_rescue_the_start() {
        let (markers, mut timings) = fixtures();
        timings.probe_interval = Duration::from_secs(10);
        let (_tx, mut events) = channel();
        let probe = SpyProbe::answering_after(Duration::from_secs(1));

        let outcome = await_server(&mut events, &probe, 3025, &markers, &timings).await;

        assert_eq!(outcome, ServerReadiness::Ready(ReadySignal::FinalProbe));
        assert_eq!(probe.calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_negative_final_probe_is_authoritative() {
        let (markers, timings) = fixtures();
        let (_tx, mut events) = channel();
        let probe = StallingProbe {
            calls: Cell::new(0),
            started: Instant::now(),
        };

        let started = Instant::now();
        let outcome = await_server(&mut events, &probe, 3025, &markers, &timings).await;

        assert_eq!(outcome, ServerReadiness::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(8));
        // Periodic probes at 2 s and 4 s, then only the final one.
        assert_eq!(probe.calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn bind_failure_on_stderr_ends_race() {
        let (markers, timings) = fixtures();
        let (tx, mut events) = channel();
        let probe = SpyProbe::silent();
        let line = "Error: listen EADDRINUSE: address already in use :::3025";
        tx.send(ChildEvent::Stdout("booting".to_owned())).ok();
        tx.send(ChildEvent::Stderr(line.to_owned())).ok();

        let outcome = await_server(&mut events, &probe, 3025, &markers, &timings).await;

        assert_eq!(outcome, ServerReadiness::BindFailure(line.to_owned()));
        assert_eq!(probe.calls.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn early_exit_ends_race() {
        let (markers, timings) = fixtures();
        let (tx, mut events) = channel();
        let probe = SpyProbe::silent();
        let exit = ExitRecord::from(exit_status(1));
        emit_after(&tx, Duration::from_millis(500), ChildEvent::Exited(exit));

        let outcome = await_server(&mut events, &probe, 3025, &markers, &timings).await;

        assert_eq!(outcome, ServerReadiness::Exited(exit));
    }

    #[tokio::test(start_paused = true)]
    async fn client_marker_confirms() {
        let (markers, _) = fixtures();
        let (tx, mut events) = channel();
        emit_after(
            &tx,
            Duration::from_millis(300),
            ChildEvent::Stderr("MCP client started".to_owned()),
        );

        let outcome = await_client(&mut events, &markers, Duration::from_secs(5)).await;

        assert_eq!(outcome, ClientOutcome::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_client_is_presumed_started_after_grace() {
        let (markers, _) = fixtures();
        let (_tx, mut events) = channel();

        let started = Instant::now();
        let outcome = await_client(&mut events, &markers, Duration::from_secs(5)).await;

        assert_eq!(outcome, ClientOutcome::LikelyStarted);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn exiting_client_fails() {
        let (markers, _) = fixtures();
        let (tx, mut events) = channel();
        let exit = ExitRecord::from(exit_status(2));
        tx.send(ChildEvent::Exited(exit)).ok();

        let outcome = await_client(&mut events, &markers, Duration::from_secs(5)).await;

        assert_eq!(outcome, ClientOutcome::Failed { exit });
    }

    fn exit_status(code: i32) -> std::process::ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(code << 8)
    }
}
