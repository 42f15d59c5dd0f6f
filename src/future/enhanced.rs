//! Consumer half of the enhanced promise/future pair.

use super::cell::{Resolution, ResultCell};
use crate::error::{Error, ErrorKind};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Re-execution hook attached to task-backed futures so [`retry`] can run
/// the originating callable again.
///
/// [`retry`]: EnhancedFuture::retry
pub(crate) type Rerun<T> = Arc<dyn Fn() -> Result<T, Error> + Send + Sync>;

/// A shared read handle for a result cell.
///
/// Futures are cheap to clone; all clones observe the same terminal
/// state. Blocking accessors (`get`, `wait`, `wait_for`) suspend the
/// calling thread. Callers needing non-blocking composition should poll
/// [`is_ready`](Self::is_ready) or register [`on_complete`](Self::on_complete)
/// callbacks instead.
///
/// # Timeout Policy
///
/// [`wait_for`](Self::wait_for) does not model timeout as a distinct
/// error: when the deadline elapses first, the future transitions to the
/// cancelled terminal state and returns no value. This matches the
/// worker-side timeout behavior.
pub struct EnhancedFuture<T> {
    cell: Arc<ResultCell<T>>,
    rerun: Option<Rerun<T>>,
}

impl<T> Clone for EnhancedFuture<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            rerun: self.rerun.clone(),
        }
    }
}

impl<T> std::fmt::Debug for EnhancedFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnhancedFuture")
            .field("cell", &self.cell)
            .field("retryable", &self.rerun.is_some())
            .finish()
    }
}

impl<T: Send + 'static> EnhancedFuture<T> {
    pub(crate) fn from_cell(cell: Arc<ResultCell<T>>) -> Self {
        Self { cell, rerun: None }
    }

    pub(crate) fn with_rerun(cell: Arc<ResultCell<T>>, rerun: Rerun<T>) -> Self {
        Self {
            cell,
            rerun: Some(rerun),
        }
    }

    /// Returns true if the cell reached any terminal state.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cell.is_resolved()
    }

    /// Advisory: returns true if the cell was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cell.is_cancelled()
    }

    /// Advisory: returns the stored error, if the cell failed.
    ///
    /// Returns `None` while pending, after a value, and after
    /// cancellation. This never blocks.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        match self.cell.resolution() {
            Some(Resolution::Error(error)) => Some(error.clone()),
            _ => None,
        }
    }

    /// Blocks the calling thread until the cell reaches a terminal state.
    pub fn wait(&self) {
        self.cell.wait();
    }

    /// Cancels the underlying cell if it is still pending.
    ///
    /// Returns true if this call performed the transition.
    pub fn cancel(&self) -> bool {
        self.cell.cancel()
    }

    /// Registers a callback invoked at resolution time.
    ///
    /// Runs immediately on the calling thread if already resolved,
    /// otherwise synchronously on the resolving thread.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&Resolution<T>) + Send + 'static,
    {
        self.cell.on_complete(callback);
    }
}

impl<T: Clone + Send + 'static> EnhancedFuture<T> {
    /// Blocks until resolution, then returns the value or the stored
    /// error.
    ///
    /// The value is cached in the cell: every call returns a clone of the
    /// same value, and every call on a failed future returns an
    /// equivalent error.
    ///
    /// # Errors
    ///
    /// The stored error for a failed cell, or `ErrorKind::TaskCancelled`
    /// for a cancelled one.
    pub fn get(&self) -> Result<T, Error> {
        self.cell.wait();
        self.outcome()
    }

    /// Non-blocking variant of [`get`](Self::get).
    ///
    /// Returns `None` while the cell is pending.
    #[must_use]
    pub fn try_get(&self) -> Option<Result<T, Error>> {
        self.cell.resolution().map(|_| self.outcome())
    }

    /// Waits up to `timeout` for a value.
    ///
    /// Returns `Some(value)` if the cell resolved with a value in time,
    /// `None` if it resolved with an error or cancellation. If the
    /// deadline elapses while the cell is still pending, the cell is
    /// cancelled and `None` is returned; a resolution racing the deadline
    /// wins if it lands first.
    #[must_use]
    pub fn wait_for(&self, timeout: Duration) -> Option<T> {
        if !self.cell.wait_timeout(timeout) && self.cell.cancel() {
            return None;
        }
        match self.cell.resolution() {
            Some(Resolution::Value(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Chains a continuation to run after resolution.
    ///
    /// The continuation receives the full outcome (`Ok(value)` or the
    /// stored error) and its return value resolves the returned future.
    /// It runs on whichever thread resolves this future, immediately on
    /// the calling thread if already resolved. If this future is
    /// cancelled, the chained future is cancelled and the continuation
    /// never runs. A panic inside the continuation surfaces as a
    /// `Captured` error on the chained future.
    pub fn then<U, F>(&self, continuation: F) -> EnhancedFuture<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(Result<T, Error>) -> U + Send + 'static,
    {
        let child = Arc::new(ResultCell::new());
        let child_cell = Arc::clone(&child);

        self.cell.on_complete(move |resolution| {
            let input = match resolution {
                Resolution::Cancelled => {
                    child_cell.cancel();
                    return;
                }
                Resolution::Value(value) => Ok(value.clone()),
                Resolution::Error(error) => Err(error.clone()),
            };
            match catch_unwind(AssertUnwindSafe(move || continuation(input))) {
                Ok(output) => {
                    let _ = child_cell.transition(Resolution::Value(output));
                }
                Err(payload) => {
                    let _ = child_cell
                        .transition(Resolution::Error(Error::captured(payload.as_ref())));
                }
            }
        });

        EnhancedFuture::from_cell(child)
    }

    /// Re-executes the originating task while `predicate` rejects the
    /// result or an error occurs, up to `max_attempts` re-executions.
    ///
    /// Blocks for the initial resolution first. Re-execution is only
    /// possible on task-backed futures; a future without an attached
    /// callable returns its first outcome. The already-resolved cell is
    /// never rewritten (transitions are monotonic) — the final outcome is
    /// returned directly.
    ///
    /// # Errors
    ///
    /// `ErrorKind::TaskCancelled` if the future was cancelled; otherwise
    /// the final error after attempts are exhausted. A final value still
    /// rejected by the predicate surfaces as a `Captured` error.
    pub fn retry<P>(&self, predicate: P, max_attempts: usize) -> Result<T, Error>
    where
        P: Fn(&T) -> bool,
    {
        self.cell.wait();
        if self.cell.is_cancelled() {
            return Err(Error::new(ErrorKind::TaskCancelled));
        }

        let mut outcome = self.outcome();
        let mut attempts = 0;
        loop {
            if let Ok(value) = &outcome {
                if predicate(value) {
                    return outcome;
                }
            }
            let Some(rerun) = self.rerun.as_ref() else {
                break;
            };
            if attempts >= max_attempts {
                break;
            }
            attempts += 1;
            outcome = rerun();
        }

        match outcome {
            Ok(_) => Err(Error::new(ErrorKind::Captured)
                .with_message("retry attempts exhausted: result rejected by predicate")),
            Err(error) => Err(error),
        }
    }

    /// Maps the terminal state to the caller-facing outcome.
    ///
    /// Must only be called once the cell is resolved.
    fn outcome(&self) -> Result<T, Error> {
        match self.cell.resolution() {
            Some(Resolution::Value(value)) => Ok(value.clone()),
            Some(Resolution::Error(error)) => Err(error.clone()),
            Some(Resolution::Cancelled) => Err(Error::new(ErrorKind::TaskCancelled)),
            None => Err(Error::new(ErrorKind::Internal).with_message("outcome read while pending")),
        }
    }
}
