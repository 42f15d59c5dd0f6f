//! Syncopate: a thread-based concurrency toolkit with enhanced futures,
//! packaged tasks, worker pools, admission control, and a typed message
//! bus.
//!
//! # Overview
//!
//! Syncopate orchestrates background work on parallel OS threads, not
//! cooperative coroutines. A caller wraps a callable in a
//! [`PackagedTask`] or hands it to a [`WorkerManager`]; the resulting
//! [`EnhancedFuture`] is the caller's handle for polling, blocking
//! waits, bounded waits, cancellation, and callback chaining. A
//! [`RateLimiter`] can gate admission before work starts, and a
//! [`MessageBus`] carries topic-addressed events between components.
//! Underneath sits a lock-free container substrate for contention-free
//! sharing.
//!
//! # Core Guarantees
//!
//! - **Write-once result cells**: a future resolves to exactly one of
//!   value, error, or cancelled, and never changes afterwards
//! - **No late resolutions**: once cancelled, every later write attempt
//!   fails with a typed error
//! - **Timeout is cancellation**: a timed-out wait transitions the cell
//!   to cancelled rather than raising a distinct timeout error
//! - **No panics across threads**: panics in user callables are captured
//!   into the result cell and rethrown at `get()`, never on the worker
//! - **Fail-fast admission**: the rate limiter rejects excess work
//!   instead of queueing it
//! - **Owned state**: managers, buses, limiters, and holders are
//!   constructed instances with explicit lifecycles — no process-wide
//!   singletons
//!
//! # Module Structure
//!
//! - [`future`]: enhanced promise/future pair over a result cell
//! - [`task`]: packaged tasks binding a callable to a cell
//! - [`worker`]: background workers and the pooled worker manager
//! - [`limiter`]: named fixed-window admission control
//! - [`bus`]: typed priority-ordered publish/subscribe
//! - [`collections`]: lock-free stack/list, sharded map, concurrent
//!   vector
//! - [`local`]: per-thread value holder with cross-thread enumeration
//! - [`error`]: error taxonomy and recoverability classification
//! - [`tracing_compat`]: feature-gated structured logging
//!
//! # Example
//!
//! ```ignore
//! use syncopate::{PackagedTask, RateLimiter, WorkerManager};
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::new();
//! limiter.set_function_limit("connect", 5, Duration::from_secs(1));
//!
//! let manager = WorkerManager::new(1, 4);
//! if limiter.try_acquire("connect") {
//!     let worker = manager.start_async(|| expensive_connect());
//!     let value = worker.get_result()?;
//! }
//!
//! let task = PackagedTask::new(|x: i32| x * 2);
//! let future = task.future();
//! task.call(5);
//! assert_eq!(future.get()?, 10);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod collections;
pub mod error;
pub mod future;
pub mod limiter;
pub mod local;
pub mod task;
pub mod tracing_compat;
pub mod worker;

// Re-exports for convenient access to core types
pub use bus::{BusOptions, MessageBus, PublishError, SubscribeOptions, SubscriptionToken};
pub use collections::{ConcurrentVec, LockFreeList, LockFreeStack, ShardedMap};
pub use error::{Error, ErrorCategory, ErrorKind, Recoverability};
pub use future::{EnhancedFuture, Promise, Resolution};
pub use limiter::RateLimiter;
pub use local::ThreadLocal;
pub use task::PackagedTask;
pub use worker::{AsyncWorker, WorkerManager, WorkerPoolOptions};
