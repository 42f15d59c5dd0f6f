//! Cooperative admission control with named fixed windows.
//!
//! The limiter gates how many operations a named function may admit
//! within a rolling time window:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                      RATE LIMITER BUCKET                          │
//! │                                                                   │
//! │     Idle ──► Admitting ──► WindowFull                             │
//! │                  ▲              │                                 │
//! │                  └── window ────┘                                 │
//! │                      elapses                                      │
//! │                                                                   │
//! │     Paused (global): acquisitions hold until resume()             │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Overload Policy
//!
//! Rejection is the overload policy: a full window fails the acquisition
//! fast and bumps the per-name rejected counter. There is no backpressure
//! queue. Rejection is an expected outcome, not a fault — it surfaces as
//! a transient [`ErrorKind::AdmissionRejected`] error or a `false` from
//! [`try_acquire`](RateLimiter::try_acquire), never as a panic.
//!
//! # Pause
//!
//! While the limiter is paused, acquisitions neither succeed nor fail:
//! the calling thread holds on a condition variable until `resume()`.

use crate::error::{Error, ErrorKind};
use crate::tracing_compat::{debug, trace};
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Per-name admission state.
#[derive(Debug)]
struct Bucket {
    max_requests: usize,
    window: Duration,
    count: usize,
    window_start: Instant,
    rejected: u64,
}

impl Bucket {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            count: 0,
            window_start: Instant::now(),
            rejected: 0,
        }
    }

    /// Rolls the window if it elapsed, then admits or rejects.
    ///
    /// The rollover and the admission decision happen under one lock
    /// acquisition, so the timestamp comparison-and-reset is atomic with
    /// respect to concurrent acquisitions.
    fn admit(&mut self, now: Instant) -> bool {
        if now.duration_since(self.window_start) >= self.window {
            self.count = 0;
            self.window_start = now;
        }
        if self.count < self.max_requests {
            self.count += 1;
            true
        } else {
            self.rejected += 1;
            false
        }
    }
}

struct LimiterState {
    buckets: HashMap<String, Bucket>,
    paused: bool,
}

/// Named fixed-window admission control.
///
/// Buckets are created lazily by [`set_function_limit`] and live for the
/// limiter's lifetime. Names without a configured bucket admit without
/// limit. Each limiter instance owns its state outright; independent
/// instances do not interact.
///
/// [`set_function_limit`]: RateLimiter::set_function_limit
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    cond: Condvar,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("rate limiter lock poisoned");
        f.debug_struct("RateLimiter")
            .field("buckets", &state.buckets.len())
            .field("paused", &state.paused)
            .finish()
    }
}

impl RateLimiter {
    /// Creates a limiter with no configured buckets.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LimiterState {
                buckets: HashMap::new(),
                paused: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Configures or reconfigures the bucket for `name`.
    ///
    /// Reconfiguration keeps the current window position and rejected
    /// counter; only the limit parameters change.
    pub fn set_function_limit(
        &self,
        name: impl Into<String>,
        max_requests: usize,
        window: Duration,
    ) {
        let name = name.into();
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        state
            .buckets
            .entry(name)
            .and_modify(|bucket| {
                bucket.max_requests = max_requests;
                bucket.window = window;
            })
            .or_insert_with(|| Bucket::new(max_requests, window));
    }

    /// Requests admission for `name`.
    ///
    /// Blocks while the limiter is paused. Returns immediately otherwise:
    /// admitted acquisitions increment the window counter, rejected ones
    /// increment the per-name rejected counter.
    ///
    /// # Errors
    ///
    /// `ErrorKind::AdmissionRejected` when the window is full.
    pub fn acquire(&self, name: &str) -> Result<(), Error> {
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        while state.paused {
            state = self
                .cond
                .wait(state)
                .expect("rate limiter lock poisoned");
        }

        let Some(bucket) = state.buckets.get_mut(name) else {
            // Unconfigured names admit without limit.
            return Ok(());
        };

        if bucket.admit(Instant::now()) {
            trace!(function = name, "admission granted");
            Ok(())
        } else {
            trace!(function = name, "admission rejected");
            Err(Error::new(ErrorKind::AdmissionRejected).with_message(name.to_string()))
        }
    }

    /// Boolean convenience form of [`acquire`](Self::acquire).
    ///
    /// Shares the pause behavior: holds while paused.
    pub fn try_acquire(&self, name: &str) -> bool {
        self.acquire(name).is_ok()
    }

    /// Monotonic count of rejected acquisitions for `name`.
    ///
    /// Zero for unknown names. Reset only by [`reset_rejected`] or
    /// [`reset`].
    ///
    /// [`reset_rejected`]: Self::reset_rejected
    /// [`reset`]: Self::reset
    #[must_use]
    pub fn rejected_requests(&self, name: &str) -> u64 {
        let state = self.state.lock().expect("rate limiter lock poisoned");
        state.buckets.get(name).map_or(0, |bucket| bucket.rejected)
    }

    /// Administrative reset of the rejected counter for `name`.
    pub fn reset_rejected(&self, name: &str) {
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        if let Some(bucket) = state.buckets.get_mut(name) {
            bucket.rejected = 0;
        }
    }

    /// Administrative reset of every bucket: restarts windows, zeroes
    /// counts and rejected counters. Configured limits are kept.
    pub fn reset(&self) {
        let now = Instant::now();
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        debug!(buckets = state.buckets.len(), "rate limiter reset");
        for bucket in state.buckets.values_mut() {
            bucket.count = 0;
            bucket.window_start = now;
            bucket.rejected = 0;
        }
    }

    /// Suspends admission for all names until [`resume`](Self::resume).
    pub fn pause(&self) {
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        state.paused = true;
        debug!("rate limiter paused");
    }

    /// Resumes admission; blocked acquisitions proceed.
    pub fn resume(&self) {
        {
            let mut state = self.state.lock().expect("rate limiter lock poisoned");
            state.paused = false;
        }
        debug!("rate limiter resumed");
        self.cond.notify_all();
    }

    /// Returns true while the limiter is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state
            .lock()
            .expect("rate limiter lock poisoned")
            .paused
    }

    /// Snapshot of configured limits as `(name, max_requests, window)`.
    #[must_use]
    pub fn limits(&self) -> Vec<(String, usize, Duration)> {
        let state = self.state.lock().expect("rate limiter lock poisoned");
        state
            .buckets
            .iter()
            .map(|(name, bucket)| (name.clone(), bucket.max_requests, bucket.window))
            .collect()
    }
}
