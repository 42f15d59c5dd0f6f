//! Producer half of the enhanced promise/future pair.

use super::cell::{Resolution, ResultCell};
use super::enhanced::EnhancedFuture;
use crate::error::Error;
use std::sync::Arc;

/// The write-once producer handle for a result cell.
///
/// A promise resolves its cell exactly once, with either a value, an
/// error, or a cancellation. Any number of [`EnhancedFuture`] handles can
/// be taken from it; all of them observe the same terminal state.
///
/// # Drop Behavior
///
/// Dropping an unresolved promise cancels the cell, so consumers blocked
/// in `get()`/`wait()` are released instead of hanging on a producer that
/// can no longer deliver.
#[derive(Debug)]
pub struct Promise<T> {
    cell: Arc<ResultCell<T>>,
}

impl<T: Send + 'static> Promise<T> {
    /// Creates a new promise with a pending result cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: Arc::new(ResultCell::new()),
        }
    }

    /// Returns a consumer handle bound to the same result cell.
    ///
    /// May be called any number of times; every handle shares the cell
    /// (fan-out read).
    #[must_use]
    pub fn future(&self) -> EnhancedFuture<T> {
        EnhancedFuture::from_cell(Arc::clone(&self.cell))
    }

    /// Resolves the cell with a value.
    ///
    /// # Errors
    ///
    /// `ErrorKind::AlreadySatisfied` if the cell already holds a value or
    /// error; `ErrorKind::Cancelled` if the cell was cancelled first.
    pub fn set_value(&self, value: T) -> Result<(), Error> {
        self.cell.transition(Resolution::Value(value))
    }

    /// Resolves the cell with an error.
    ///
    /// # Errors
    ///
    /// Same conflict conditions as [`Promise::set_value`].
    pub fn set_error(&self, error: Error) -> Result<(), Error> {
        self.cell.transition(Resolution::Error(error))
    }

    /// Cancels the cell if it is still pending.
    ///
    /// Returns true if this call performed the transition. After a
    /// successful cancel, `set_value`/`set_error` fail with
    /// `ErrorKind::Cancelled`.
    pub fn cancel(&self) -> bool {
        self.cell.cancel()
    }

    /// Registers a callback invoked at resolution time.
    ///
    /// Runs immediately on the calling thread if the cell is already
    /// resolved, otherwise synchronously on the resolving thread.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&Resolution<T>) + Send + 'static,
    {
        self.cell.on_complete(callback);
    }

    /// Advisory: returns true if the cell has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cell.is_cancelled()
    }

    /// Advisory: returns true if the cell reached any terminal state.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.cell.is_resolved()
    }
}

impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        // Release any blocked consumers; a no-op once resolved.
        self.cell.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn set_value_resolves_all_futures() {
        let promise = Promise::new();
        let a = promise.future();
        let b = promise.future();

        promise.set_value(11).expect("first resolution");
        assert_eq!(a.get(), Ok(11));
        assert_eq!(b.get(), Ok(11));
    }

    #[test]
    fn double_set_fails_with_already_satisfied() {
        let promise = Promise::new();
        promise.set_value(1).expect("first resolution");

        let err = promise.set_value(2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadySatisfied);

        let err = promise
            .set_error(Error::new(ErrorKind::Internal))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadySatisfied);
    }

    #[test]
    fn set_after_cancel_fails_with_cancelled() {
        let promise: Promise<i32> = Promise::new();
        assert!(promise.cancel());

        let err = promise.set_value(1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(promise.is_cancelled());
    }

    #[test]
    fn set_error_surfaces_through_future() {
        let promise: Promise<i32> = Promise::new();
        let future = promise.future();

        promise
            .set_error(Error::new(ErrorKind::Captured).with_message("boom"))
            .expect("first resolution");

        let err = future.get().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Captured);
        assert_eq!(err.message(), Some("boom"));
    }

    #[test]
    fn dropping_unresolved_promise_cancels_the_cell() {
        let promise: Promise<i32> = Promise::new();
        let future = promise.future();
        drop(promise);

        assert!(future.is_cancelled());
        let err = future.get().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TaskCancelled);
    }

    #[test]
    fn void_specialization_works() {
        let promise: Promise<()> = Promise::new();
        let future = promise.future();
        promise.set_value(()).expect("first resolution");
        assert_eq!(future.get(), Ok(()));
    }
}
