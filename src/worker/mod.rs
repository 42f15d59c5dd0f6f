//! Background workers and the worker manager.
//!
//! An [`AsyncWorker`] is the handle for one unit of work running on a
//! background OS thread; the [`WorkerManager`] owns a pool of such
//! threads plus a registry of live handles for batch operations
//! (`cancel_all`, `wait_for_all`, `all_done`).
//!
//! # Cancellation
//!
//! Cancellation is cooperative. Work that is still queued is skipped when
//! dequeued; work that is already executing runs to completion, but its
//! result cell has lost resolution rights, so the result is discarded. A
//! worker is only guaranteed inactive after cancellation has been
//! observed, not instantaneously.
//!
//! # Timeout
//!
//! A per-worker timeout bounds how long [`AsyncWorker::wait_for_completion`]
//! blocks. An elapsed timeout transitions the worker to the cancelled
//! terminal state and returns `false` — it is not surfaced as an error,
//! mirroring the future-side `wait_for` policy.

mod manager;

pub use manager::{WorkerManager, WorkerPoolOptions};

use crate::error::Error;
use crate::future::{EnhancedFuture, Resolution, ResultCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// State shared between a worker handle, the pool thread executing the
/// work, and the manager registry.
pub(crate) struct WorkerShared<T> {
    id: u64,
    cell: Arc<ResultCell<T>>,
    cancelled: AtomicBool,
    timeout: Mutex<Option<Duration>>,
}

impl<T: Send + 'static> WorkerShared<T> {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            cell: Arc::new(ResultCell::new()),
            cancelled: AtomicBool::new(false),
            timeout: Mutex::new(None),
        }
    }

    pub(crate) fn cell(&self) -> &Arc<ResultCell<T>> {
        &self.cell
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.cell.is_resolved()
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.cell.cancel();
    }

    /// Runs the work with panic containment and resolves the cell.
    ///
    /// A failed transition means cancellation won the race; the outcome
    /// is discarded by design.
    pub(crate) fn run(&self, work: Box<dyn FnOnce() -> T + Send>) {
        let resolution = match catch_unwind(AssertUnwindSafe(work)) {
            Ok(value) => Resolution::Value(value),
            Err(payload) => Resolution::Error(Error::captured(payload.as_ref())),
        };
        let _ = self.cell.transition(resolution);
    }

    /// Waits for a terminal state, honoring the configured timeout.
    ///
    /// Returns false when the timeout elapsed and forced cancellation.
    pub(crate) fn wait_for_completion(&self) -> bool {
        let timeout = *self.timeout.lock().expect("worker timeout lock poisoned");
        match timeout {
            Some(duration) => {
                if self.cell.wait_timeout(duration) {
                    true
                } else {
                    self.cancel();
                    false
                }
            }
            None => {
                self.cell.wait();
                true
            }
        }
    }
}

/// Handle for one in-flight or completed unit of background work.
///
/// Handles are cheap to clone and can outlive the manager that created
/// them; the shared result cell keeps the outcome alive.
pub struct AsyncWorker<T> {
    shared: Arc<WorkerShared<T>>,
}

impl<T> Clone for AsyncWorker<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for AsyncWorker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncWorker")
            .field("id", &self.shared.id)
            .field("cancelled", &self.shared.cancelled.load(Ordering::Relaxed))
            .field("cell", self.shared.cell())
            .finish()
    }
}

impl<T: Send + Sync + 'static> AsyncWorker<T> {
    pub(crate) fn from_shared(shared: Arc<WorkerShared<T>>) -> Self {
        Self { shared }
    }

    /// Runs a callable on a dedicated background thread, without a
    /// manager.
    ///
    /// The thread is detached; the returned handle is the only way to
    /// observe the outcome.
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let shared = Arc::new(WorkerShared::new(0));
        let runner = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("syncopate-worker".to_string())
            .spawn(move || {
                if runner.is_cancelled() {
                    runner.cell().cancel();
                    return;
                }
                runner.run(Box::new(work));
            })
            .expect("failed to spawn worker thread");
        Self { shared }
    }

    /// Returns true while the work has not reached a terminal state.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.shared.is_terminal()
    }

    /// Returns true if the worker was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Requests cooperative cancellation.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Returns the future bound to this worker's result cell.
    #[must_use]
    pub fn future(&self) -> EnhancedFuture<T> {
        EnhancedFuture::from_cell(Arc::clone(self.shared.cell()))
    }

    /// Blocks until completion, honoring the configured timeout.
    ///
    /// Returns true if the worker reached a terminal state; false if this
    /// call's timeout elapsed first (the worker is then cancelled and
    /// inactive).
    pub fn wait_for_completion(&self) -> bool {
        self.shared.wait_for_completion()
    }

    /// Bounds how long [`wait_for_completion`](Self::wait_for_completion)
    /// may block before giving up and cancelling the worker.
    pub fn set_timeout(&self, timeout: Duration) {
        *self
            .shared
            .timeout
            .lock()
            .expect("worker timeout lock poisoned") = Some(timeout);
    }

    /// Registers a post-completion callback.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnOnce(&Resolution<T>) + Send + 'static,
    {
        self.shared.cell().on_complete(callback);
    }

    /// Blocks for completion, then applies `predicate` to the result.
    ///
    /// Returns false for failed or cancelled workers; the predicate only
    /// sees an actual value.
    pub fn validate<P>(&self, predicate: P) -> bool
    where
        P: FnOnce(&T) -> bool,
    {
        self.shared.cell().wait();
        match self.shared.cell().resolution() {
            Some(Resolution::Value(value)) => predicate(value),
            _ => false,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> AsyncWorker<T> {
    /// Blocks until completion and returns the value, or the stored
    /// error.
    ///
    /// # Errors
    ///
    /// The captured error for failed work, `ErrorKind::TaskCancelled` for
    /// cancelled work.
    pub fn get_result(&self) -> Result<T, Error> {
        self.future().get()
    }
}
