//! Single-assignment result cell shared by a promise and its futures.
//!
//! The cell is the synchronization point of the whole pipeline:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        RESULT CELL STATES                        │
//! │                                                                  │
//! │                    set_value ──► Ready(T)                        │
//! │                   /                                              │
//! │        Pending ──┼── set_error ──► Failed(Error)                 │
//! │                   \                                              │
//! │                    cancel ──────► Cancelled                      │
//! │                                                                  │
//! │   Transitions are monotonic: once a terminal state is reached    │
//! │   it never changes, and every later write attempt fails.         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resolution is linearizable: the terminal state is published through a
//! `OnceLock`, so once any thread observes it, all threads observe the
//! same terminal state. Waiters block on a condition variable; completion
//! callbacks are collected under the lock and run after it is released.

use crate::error::{Error, ErrorKind};
use std::sync::{Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Terminal state of a result cell, as seen by completion callbacks and
/// advisory accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// The producer supplied a value.
    Value(T),
    /// The producer supplied an error, or the callable panicked.
    Error(Error),
    /// The cell was cancelled before a value or error arrived.
    Cancelled,
}

impl<T> Resolution<T> {
    /// Returns the value, if this resolution carries one.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Returns true if this resolution is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

type Callback<T> = Box<dyn FnOnce(&Resolution<T>) + Send>;

/// Pending-side bookkeeping, guarded by the cell mutex.
struct CellInner<T> {
    /// Mirrors the `OnceLock` so waiters can block on the condvar.
    resolved: bool,
    /// Callbacks registered before resolution.
    callbacks: Vec<Callback<T>>,
}

/// The single-assignment slot shared by a [`Promise`](super::Promise) and
/// its [`EnhancedFuture`](super::EnhancedFuture) handles.
pub(crate) struct ResultCell<T> {
    /// Terminal state, written exactly once.
    resolution: OnceLock<Resolution<T>>,
    inner: Mutex<CellInner<T>>,
    cond: Condvar,
}

impl<T> ResultCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            resolution: OnceLock::new(),
            inner: Mutex::new(CellInner {
                resolved: false,
                callbacks: Vec::new(),
            }),
            cond: Condvar::new(),
        }
    }

    /// Attempts the Pending → terminal transition.
    ///
    /// On conflict the error reflects the existing terminal state:
    /// `Cancelled` if the cell was cancelled, `AlreadySatisfied` otherwise.
    pub(crate) fn transition(&self, resolution: Resolution<T>) -> Result<(), Error> {
        let callbacks = {
            let mut inner = self.inner.lock().expect("result cell lock poisoned");
            if inner.resolved {
                let kind = match self.resolution.get() {
                    Some(Resolution::Cancelled) => ErrorKind::Cancelled,
                    _ => ErrorKind::AlreadySatisfied,
                };
                return Err(Error::new(kind));
            }
            self.resolution
                .set(resolution)
                .unwrap_or_else(|_| unreachable!("resolved flag guards the OnceLock"));
            inner.resolved = true;
            self.cond.notify_all();
            std::mem::take(&mut inner.callbacks)
        };

        let resolution = self
            .resolution
            .get()
            .expect("terminal state set under lock");
        for callback in callbacks {
            callback(resolution);
        }
        Ok(())
    }

    /// Cancels the cell if it is still pending. Returns true on transition.
    pub(crate) fn cancel(&self) -> bool {
        self.transition(Resolution::Cancelled).is_ok()
    }

    /// Registers a completion callback.
    ///
    /// If the cell is already resolved, the callback runs immediately on
    /// the calling thread; otherwise it runs on the resolving thread.
    pub(crate) fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&Resolution<T>) + Send + 'static,
    {
        {
            let mut inner = self.inner.lock().expect("result cell lock poisoned");
            if !inner.resolved {
                inner.callbacks.push(Box::new(callback));
                return;
            }
        }
        let resolution = self
            .resolution
            .get()
            .expect("resolved flag implies terminal state");
        callback(resolution);
    }

    /// Returns the terminal state, if any.
    pub(crate) fn resolution(&self) -> Option<&Resolution<T>> {
        self.resolution.get()
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.resolution.get().is_some()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self.resolution.get(), Some(Resolution::Cancelled))
    }

    /// Blocks the calling thread until the cell reaches a terminal state.
    pub(crate) fn wait(&self) {
        let mut inner = self.inner.lock().expect("result cell lock poisoned");
        while !inner.resolved {
            inner = self
                .cond
                .wait(inner)
                .expect("result cell lock poisoned");
        }
    }

    /// Blocks until resolution or until the timeout elapses.
    ///
    /// Returns true if the cell resolved within the deadline.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().expect("result cell lock poisoned");
        while !inner.resolved {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _timeout_result) = self
                .cond
                .wait_timeout(inner, remaining)
                .expect("result cell lock poisoned");
            inner = guard;
        }
        true
    }
}

impl<T> std::fmt::Debug for ResultCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.resolution.get() {
            None => "pending",
            Some(Resolution::Value(_)) => "ready",
            Some(Resolution::Error(_)) => "failed",
            Some(Resolution::Cancelled) => "cancelled",
        };
        f.debug_struct("ResultCell").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn transition_is_write_once() {
        let cell = ResultCell::new();
        assert!(cell.transition(Resolution::Value(1)).is_ok());

        let err = cell.transition(Resolution::Value(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadySatisfied);
        assert_eq!(cell.resolution(), Some(&Resolution::Value(1)));
    }

    #[test]
    fn cancel_blocks_later_writes() {
        let cell = ResultCell::new();
        assert!(cell.cancel());

        let err = cell.transition(Resolution::Value(7)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(cell.is_cancelled());
    }

    #[test]
    fn cancel_after_resolution_is_a_no_op() {
        let cell = ResultCell::new();
        assert!(cell.transition(Resolution::Value(3)).is_ok());
        assert!(!cell.cancel());
        assert!(!cell.is_cancelled());
    }

    #[test]
    fn callback_runs_on_resolution() {
        let cell = ResultCell::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        cell.on_complete(move |resolution| {
            assert_eq!(resolution.value(), Some(&42));
            hits_clone.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(hits.load(Ordering::Relaxed), 0);

        cell.transition(Resolution::Value(42)).expect("first write");
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn callback_runs_immediately_when_already_resolved() {
        let cell = ResultCell::new();
        cell.transition(Resolution::Value(5)).expect("first write");

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        cell.on_complete(move |_| {
            hits_clone.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn wait_unblocks_on_cross_thread_resolution() {
        let cell = Arc::new(ResultCell::new());
        let cell_clone = Arc::clone(&cell);

        let waiter = std::thread::spawn(move || {
            cell_clone.wait();
            cell_clone.resolution().cloned()
        });

        std::thread::sleep(Duration::from_millis(20));
        cell.transition(Resolution::Value(9)).expect("first write");

        let seen = waiter.join().expect("waiter panicked");
        assert_eq!(seen, Some(Resolution::Value(9)));
    }

    #[test]
    fn wait_timeout_reports_elapsed_deadline() {
        let cell: ResultCell<i32> = ResultCell::new();
        assert!(!cell.wait_timeout(Duration::from_millis(10)));

        cell.transition(Resolution::Value(1)).expect("first write");
        assert!(cell.wait_timeout(Duration::from_millis(10)));
    }
}
