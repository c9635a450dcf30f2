//! Backoff for queue transport calls.
//!
//! Job-level retries belong to the queue (republish with an incremented
//! counter). This module only covers settling a finished job: an ack that
//! hits a dropped Redis connection is tried again in-process so the outcome
//! of the work is not lost.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff schedule for one named transport call.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Call name used in log lines
    pub label: &'static str,
    /// Attempts after the first
    pub retries: u32,
    /// First delay; doubles per attempt
    pub initial: Duration,
    /// Upper bound on any single delay
    pub ceiling: Duration,
}

impl Backoff {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            retries: 3,
            initial: Duration::from_millis(100),
            ceiling: Duration::from_secs(5),
        }
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn initial(mut self, initial: Duration) -> Self {
        self.initial = initial;
        self
    }

    /// Delay before attempt `n` (1-based).
    fn delay(&self, n: u32) -> Duration {
        let factor = 1u32.checked_shl(n.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.ceiling)
    }

    /// Run `call` until it succeeds, fails with an error `transient`
    /// rejects, or the schedule runs out. The last error is returned.
    pub async fn run<T, E, F, Fut, P>(&self, transient: P, call: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if attempt >= self.retries || !transient(&err) {
                return Err(err);
            }
            attempt += 1;
            let delay = self.delay(attempt);
            debug!(call = self.label, attempt, ?delay, "Transport call failed: {}", err);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Counts consecutive receive errors so an outage logs a handful of lines
/// instead of one per poll.
#[derive(Debug, Default)]
pub struct ErrorStreak {
    length: u32,
    loud: u32,
}

impl ErrorStreak {
    /// Log the first `loud` errors of a streak.
    pub fn new(loud: u32) -> Self {
        Self { length: 0, loud }
    }

    /// Record an error. Returns whether it should be logged.
    pub fn failed(&mut self) -> bool {
        self.length += 1;
        if self.length == self.loud + 1 {
            warn!(errors = self.length, "Receive keeps failing, muting until it recovers");
        }
        self.length <= self.loud
    }

    /// End the streak.
    pub fn recovered(&mut self) {
        if self.length > self.loud {
            debug!(errors = self.length, "Receive recovered");
        }
        self.length = 0;
    }

    pub fn length(&self) -> u32 {
        self.length
    }
}
