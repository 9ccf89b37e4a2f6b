//! A race of asynchronous signals with cancellation of the losers.
//!
//! Each contender is a future yielding `Option<T>`. The first contender to
//! yield `Some` wins; every other contender is dropped at that moment, which
//! cancels any timer, interval, or request it was holding. A contender that
//! yields `None` has nothing to report and simply leaves the race. The race
//! resolves at most once because [`Race::run`] consumes the race.

use std::future::Future;

use futures::future::{LocalBoxFuture, select_all};

/// A set of competing futures.
pub struct Race<'a, T> {
    contenders: Vec<LocalBoxFuture<'a, Option<T>>>,
}

impl<'a, T> Race<'a, T> {
    /// Starts an empty race.
    #[must_use]
    pub fn new() -> Self {
        Self {
            contenders: Vec::new(),
        }
    }

    /// Adds a contender.
    #[must_use]
    pub fn with<F>(mut self, contender: F) -> Self
    where
        F: Future<Output = Option<T>> + 'a,
    {
        self.contenders.push(Box::pin(contender));
        self
    }

    /// Whether no contender has been entered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contenders.is_empty()
    }

    /// Drives every contender until one yields a value.
    ///
    /// Returns `None` when every contender retired without a value.
    pub async fn run(self) -> Option<T> {
        let mut pending = self.contenders;
        while !pending.is_empty() {
            let (outcome, _, rest) = select_all(pending).await;
            if outcome.is_some() {
                // `rest` drops here, cancelling the losers.
                return outcome;
            }
            pending = rest;
        }
        None
    }
}

impl<T> Default for Race<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Race<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Race")
            .field("contenders", &self.contenders.len())
            .finish()
    }
}
