//! Bounded polling.
//!
//! PID acquisition, the port wait, and occupant eviction all share one shape:
//! run a check, sleep for an interval, give up at a bound. [`poll_bounded`]
//! implements that loop once. The bound is either a number of attempts or a
//! wall-clock limit; with a deadline the final check lands exactly on the
//! limit so callers observe a result at the timeout rather than one interval
//! later.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};

/// How long [`poll_bounded`] keeps trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Stop after this many checks.
    Attempts(u32),
    /// Stop once this much time has passed since the first check.
    Deadline(Duration),
}

/// Interval and bound for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    interval: Duration,
    bound: Bound,
}

impl PollSchedule {
    /// Checks at most `max_attempts` times, `interval` apart.
    #[must_use]
    pub const fn attempts(max_attempts: u32, interval: Duration) -> Self {
        Self {
            interval,
            bound: Bound::Attempts(max_attempts),
        }
    }

    /// Checks every `interval` until `limit` has elapsed.
    #[must_use]
    pub const fn deadline(limit: Duration, interval: Duration) -> Self {
        Self {
            interval,
            bound: Bound::Deadline(limit),
        }
    }

    /// Pause between checks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// When polling gives up.
    #[must_use]
    pub const fn bound(&self) -> Bound {
        self.bound
    }
}

/// Verdict of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T, E> {
    /// The condition holds; stop polling with this value.
    Done(T),
    /// Not yet; check again after the interval.
    Retry,
    /// The condition can never hold; stop polling with this reason.
    Abort(E),
}

/// Why [`poll_bounded`] stopped without a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<E> {
    /// The bound was reached.
    Exhausted {
        /// Number of checks performed.
        attempts: u32,
    },
    /// A check aborted the loop.
    Aborted(E),
}

/// Runs `step` until it yields [`Step::Done`] or [`Step::Abort`], or until the
/// schedule's bound is reached.
///
/// The closure receives the 1-based attempt number. The first check runs
/// immediately.
///
/// # Errors
///
/// Returns [`PollError::Exhausted`] when the bound is reached and
/// [`PollError::Aborted`] when a check aborts.
pub async fn poll_bounded<T, E, F, Fut>(
    schedule: PollSchedule,
    mut step: F,
) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Step<T, E>>,
{
    let started = Instant::now();
    let mut attempts = 0_u32;
    loop {
        attempts = attempts.saturating_add(1);
        match step(attempts).await {
            Step::Done(value) => return Ok(value),
            Step::Abort(reason) => return Err(PollError::Aborted(reason)),
            Step::Retry => {}
        }
        match schedule.bound {
            Bound::Attempts(max) => {
                if attempts >= max {
                    return Err(PollError::Exhausted { attempts });
                }
                sleep(schedule.interval).await;
            }
            Bound::Deadline(limit) => {
                let deadline = started + limit;
                let now = Instant::now();
                if now >= deadline {
                    return Err(PollError::Exhausted { attempts });
                }
                sleep_until((now + schedule.interval).min(deadline)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::future::ready;

    const TICK: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn returns_value_once_condition_holds() {
        let calls = Cell::new(0_u32);
        let result: Result<u32, PollError<()>> =
            poll_bounded(PollSchedule::attempts(15, TICK), |attempt| {
                calls.set(attempt);
                ready(if attempt == 3 {
                    Step::Done(attempt * 10)
                } else {
                    Step::Retry
                })
            })
            .await;

        assert_eq!(result, Ok(30));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_bound_sleeps_between_checks_only() {
        let started = Instant::now();
        let result: Result<(), PollError<()>> =
            poll_bounded(PollSchedule::attempts(15, TICK), |_| ready(Step::Retry)).await;

        assert_eq!(result, Err(PollError::Exhausted { attempts: 15 }));
        assert_eq!(started.elapsed(), TICK * 14);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bound_gives_up_exactly_at_limit() {
        let started = Instant::now();
        let limit = Duration::from_millis(1_050);
        let result: Result<(), PollError<()>> =
            poll_bounded(PollSchedule::deadline(limit, TICK * 2), |_| ready(Step::Retry)).await;

        assert_eq!(started.elapsed(), limit);
        // Checks at 0, 200, 400, 600, 800, 1000 and the final one at 1050.
        assert_eq!(result, Err(PollError::Exhausted { attempts: 7 }));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_without_sleeping() {
        let started = Instant::now();
        let result: Result<(), PollError<&str>> =
            poll_bounded(PollSchedule::attempts(5, TICK), |_| ready(Step::Abort("exited"))).await;

        assert_eq!(result, Err(PollError::Aborted("exited")));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
