//! Run-at-most-once packaged tasks.
//!
//! A [`PackagedTask`] binds a callable to a result cell, decoupling the
//! unit of work from how it runs:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        PACKAGED TASK FLOW                         │
//! │                                                                   │
//! │   caller                          any thread                      │
//! │     │                                │                            │
//! │     │── future() ──► EnhancedFuture  │                            │
//! │     │                      ▲         │                            │
//! │     │── call(args) ────────┼────────►│ runs callable exactly once │
//! │     │                      │         │                            │
//! │     │                      └── value / captured panic / cancelled │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Cancellation
//!
//! `cancel()` before invocation revokes the cell's resolution rights: a
//! later `call` is skipped entirely and the future reports a cancelled
//! task. Cancellation never interrupts a callable that is already
//! running; it only prevents the result from landing.
//!
//! # Panics in the callable
//!
//! Panics are caught at the invocation boundary and stored in the cell as
//! `Captured` errors. They surface when a consumer calls `get()`, never
//! on the invoking thread.

use crate::error::{Error, ErrorKind};
use crate::future::{EnhancedFuture, Resolution, ResultCell};
use crate::tracing_compat::trace;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct TaskInner<Args, R> {
    callable: Box<dyn Fn(Args) -> R + Send + Sync>,
    cell: Arc<ResultCell<R>>,
    invoked: AtomicBool,
    cancelled: AtomicBool,
    /// Arguments of the first invocation, kept so task-backed futures can
    /// re-execute the callable on `retry`.
    last_args: Mutex<Option<Args>>,
}

impl<Args, R> TaskInner<Args, R>
where
    Args: Send + 'static,
    R: Send + 'static,
{
    /// Runs the callable with panic containment.
    fn execute(&self, args: Args) -> Result<R, Error> {
        match catch_unwind(AssertUnwindSafe(|| (self.callable)(args))) {
            Ok(value) => Ok(value),
            Err(payload) => Err(Error::captured(payload.as_ref())),
        }
    }
}

/// A callable bound to a result cell, executing at most once.
///
/// `Args` is a single argument type; use a tuple for higher arities. The
/// argument must be `Clone` so the retry path can re-invoke the callable
/// with the recorded input.
pub struct PackagedTask<Args, R> {
    inner: Arc<TaskInner<Args, R>>,
}

impl<Args, R> Clone for PackagedTask<Args, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Args, R> std::fmt::Debug for PackagedTask<Args, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackagedTask")
            .field("invoked", &self.inner.invoked.load(Ordering::Relaxed))
            .field("cancelled", &self.inner.cancelled.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<Args, R> PackagedTask<Args, R>
where
    Args: Clone + Send + 'static,
    R: Send + Sync + 'static,
{
    /// Wraps a callable in a task.
    #[must_use]
    pub fn new<F>(callable: F) -> Self
    where
        F: Fn(Args) -> R + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(TaskInner {
                callable: Box::new(callable),
                cell: Arc::new(ResultCell::new()),
                invoked: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                last_args: Mutex::new(None),
            }),
        }
    }

    /// Returns the future associated with this task.
    ///
    /// Available before the task ever runs; the future starts out
    /// pending. The returned handle carries a re-execution hook, so
    /// [`EnhancedFuture::retry`] can run the callable again.
    #[must_use]
    pub fn future(&self) -> EnhancedFuture<R> {
        let inner = Arc::clone(&self.inner);
        let rerun = Arc::new(move || {
            let args = inner
                .last_args
                .lock()
                .expect("task args lock poisoned")
                .clone();
            match args {
                Some(args) => inner.execute(args),
                None => Err(Error::new(ErrorKind::Internal)
                    .with_message("retry before first invocation")),
            }
        });
        EnhancedFuture::with_rerun(Arc::clone(&self.inner.cell), rerun)
    }

    /// Executes the wrapped callable exactly once.
    ///
    /// A second invocation is a silent no-op, as is invoking a cancelled
    /// task: the cell is only ever written by the first effective call.
    pub fn call(&self, args: Args) {
        if self.inner.invoked.swap(true, Ordering::AcqRel) {
            trace!("packaged task invoked more than once; ignoring");
            return;
        }
        if self.inner.cancelled.load(Ordering::Acquire) {
            trace!("packaged task invoked after cancel; skipping execution");
            return;
        }

        *self
            .inner
            .last_args
            .lock()
            .expect("task args lock poisoned") = Some(args.clone());

        let resolution = match self.inner.execute(args) {
            Ok(value) => Resolution::Value(value),
            Err(error) => Resolution::Error(error),
        };
        // A concurrent cancel may have revoked resolution rights; the
        // failed transition is the intended outcome then.
        let _ = self.inner.cell.transition(resolution);
    }

    /// Cancels the task.
    ///
    /// Before invocation this prevents the callable from resolving the
    /// future with a value; `get()` on the future then fails with a
    /// cancellation error. A running callable is not interrupted.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.cell.cancel();
    }

    /// Returns true if the task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Registers a completion callback on the underlying cell.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&Resolution<R>) + Send + 'static,
    {
        self.inner.cell.on_complete(callback);
    }
}
