//! Sliding-window rate limiter for the classification endpoint.

use emotia_core::RateLimitConfig;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Snapshot of the quota, reported to callers that want to back off early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub remaining: usize,
    pub total: usize,
    /// Time until the oldest recorded call leaves the window
    pub reset_in: Duration,
}

/// Tracks recent call timestamps and admits calls against a quota.
///
/// Only calls newer than `now - window` count toward the limit. Stale
/// timestamps are pruned lazily on every check.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    #[must_use]
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Report whether a call made now would be admitted, without recording it
    #[must_use]
    pub fn admit(&self) -> bool {
        let now = Instant::now();
        let mut calls = self.calls();
        self.prune(&mut calls, now);
        calls.len() < self.max_requests
    }

    /// Record a call made now
    pub fn record(&self) {
        self.calls().push_back(Instant::now());
    }

    /// Admit and record in one step.
    ///
    /// # Errors
    ///
    /// Returns the time until a slot frees up when the quota is exhausted.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut calls = self.calls();
        self.prune(&mut calls, now);
        if calls.len() < self.max_requests {
            calls.push_back(now);
            Ok(())
        } else {
            Err(self.wait_time(&calls, now))
        }
    }

    #[must_use]
    pub fn status(&self) -> RateLimitStatus {
        let now = Instant::now();
        let mut calls = self.calls();
        self.prune(&mut calls, now);
        let reset_in = calls
            .front()
            .map_or(Duration::ZERO, |oldest| (*oldest + self.window) - now);
        RateLimitStatus {
            remaining: self.max_requests.saturating_sub(calls.len()),
            total: self.max_requests,
            reset_in,
        }
    }

    fn calls(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until enough calls age out for one more to fit
    fn wait_time(&self, calls: &VecDeque<Instant>, now: Instant) -> Duration {
        if self.max_requests == 0 {
            return self.window;
        }
        let blocking = calls.len() + 1 - self.max_requests;
        calls
            .get(blocking - 1)
            .map_or(Duration::ZERO, |t| (*t + self.window).saturating_duration_since(now))
    }
}
