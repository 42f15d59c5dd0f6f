//! Worker pool and handle registry.
//!
//! The manager runs submitted callables on a set of OS threads separate
//! from callers. Threads are spawned lazily up to `max_threads`; when
//! idle beyond a threshold, threads above `min_threads` retire. Shutdown
//! is graceful with a bounded drain timeout.

use super::{AsyncWorker, WorkerShared};
use crate::tracing_compat::debug;
use crossbeam_queue::SegQueue;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle as ThreadJoinHandle};
use std::time::Duration;

/// Default idle timeout before retiring excess threads.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// A unit of work queued for the pool.
struct Job<T> {
    shared: Arc<WorkerShared<T>>,
    work: Box<dyn FnOnce() -> T + Send>,
}

struct ManagerInner<T> {
    /// Minimum number of threads to keep alive.
    min_threads: usize,
    /// Maximum number of threads allowed.
    max_threads: usize,
    /// Current number of active threads.
    active_threads: AtomicUsize,
    /// Number of threads currently executing work.
    busy_threads: AtomicUsize,
    /// Number of pending jobs in queue.
    pending_count: AtomicUsize,
    /// Next worker id.
    next_worker_id: AtomicU64,
    /// Work queue.
    queue: SegQueue<Job<T>>,
    /// Shutdown flag.
    shutdown: AtomicBool,
    /// Condition variable for thread parking.
    condvar: Condvar,
    /// Mutex for condition variable.
    mutex: Mutex<()>,
    /// Idle timeout for excess threads.
    idle_timeout: Duration,
    /// Thread name prefix.
    thread_name_prefix: String,
    /// Live worker handles, for batch operations.
    registry: Mutex<Vec<Weak<WorkerShared<T>>>>,
    /// Thread join handles for cleanup.
    thread_handles: Mutex<Vec<ThreadJoinHandle<()>>>,
}

/// Configuration options for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolOptions {
    /// Idle timeout before retiring excess threads.
    pub idle_timeout: Duration,
    /// Thread name prefix.
    pub thread_name_prefix: String,
}

impl Default for WorkerPoolOptions {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            thread_name_prefix: "syncopate".to_string(),
        }
    }
}

/// Runs callables on a background thread pool and tracks their handles.
///
/// One manager instance owns its threads and registry outright; multiple
/// independent managers can coexist (there is no process-wide state).
/// Dropping the manager shuts the pool down and waits briefly for the
/// threads to drain.
pub struct WorkerManager<T> {
    inner: Arc<ManagerInner<T>>,
}

impl<T> fmt::Debug for WorkerManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerManager")
            .field("min_threads", &self.inner.min_threads)
            .field("max_threads", &self.inner.max_threads)
            .field(
                "active_threads",
                &self.inner.active_threads.load(Ordering::Relaxed),
            )
            .field(
                "pending_jobs",
                &self.inner.pending_count.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl<T: Send + Sync + 'static> WorkerManager<T> {
    /// Creates a new manager with the specified thread limits.
    ///
    /// # Panics
    ///
    /// Panics if `max_threads` is 0.
    #[must_use]
    pub fn new(min_threads: usize, max_threads: usize) -> Self {
        Self::with_options(min_threads, max_threads, WorkerPoolOptions::default())
    }

    /// Creates a new manager with custom options.
    #[must_use]
    pub fn with_options(
        min_threads: usize,
        max_threads: usize,
        options: WorkerPoolOptions,
    ) -> Self {
        assert!(max_threads > 0, "max_threads must be at least 1");
        let max_threads = max_threads.max(min_threads);

        let inner = Arc::new(ManagerInner {
            min_threads,
            max_threads,
            active_threads: AtomicUsize::new(0),
            busy_threads: AtomicUsize::new(0),
            pending_count: AtomicUsize::new(0),
            next_worker_id: AtomicU64::new(1),
            queue: SegQueue::new(),
            shutdown: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
            idle_timeout: options.idle_timeout,
            thread_name_prefix: options.thread_name_prefix,
            registry: Mutex::new(Vec::new()),
            thread_handles: Mutex::new(Vec::with_capacity(max_threads)),
        });

        let manager = Self { inner };

        // Spawn minimum threads eagerly
        for _ in 0..min_threads {
            spawn_thread_on_inner(&manager.inner);
        }

        manager
    }

    /// Schedules a callable on the pool and returns its handle.
    pub fn start_async<F>(&self, work: F) -> AsyncWorker<T>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let id = self.inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(WorkerShared::new(id));

        {
            let mut registry = self.inner.registry.lock().expect("registry lock poisoned");
            registry.retain(|weak| weak.strong_count() > 0);
            registry.push(Arc::downgrade(&shared));
        }

        self.inner.queue.push(Job {
            shared: Arc::clone(&shared),
            work: Box::new(work),
        });
        self.inner.pending_count.fetch_add(1, Ordering::Relaxed);

        // Wake a waiting thread or spawn a new one if needed
        maybe_spawn_thread_on_inner(&self.inner);
        self.notify_one();

        AsyncWorker::from_shared(shared)
    }

    /// Alias for [`start_async`](Self::start_async).
    pub fn create_worker<F>(&self, work: F) -> AsyncWorker<T>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.start_async(work)
    }

    /// Returns true if the given worker reached a terminal state.
    #[must_use]
    pub fn is_done(&self, worker: &AsyncWorker<T>) -> bool {
        !worker.is_active()
    }

    /// Cancels the given worker.
    pub fn cancel(&self, worker: &AsyncWorker<T>) {
        worker.cancel();
    }

    /// Cancels every live worker in the registry.
    pub fn cancel_all(&self) {
        let live = self.live_workers();
        debug!(count = live.len(), "cancelling all workers");
        for shared in live {
            shared.cancel();
        }
        self.notify_all();
    }

    /// Returns true when every registered worker reached a terminal
    /// state.
    #[must_use]
    pub fn all_done(&self) -> bool {
        self.live_workers()
            .iter()
            .all(|shared| shared.is_terminal())
    }

    /// Blocks until every registered worker reaches a terminal state
    /// (done or cancelled).
    ///
    /// Workers with a configured timeout are auto-cancelled when it
    /// elapses, so this call is bounded by the slowest live worker.
    pub fn wait_for_all(&self) {
        for shared in self.live_workers() {
            let _ = shared.wait_for_completion();
        }
    }

    /// Number of live workers that have not reached a terminal state.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.live_workers()
            .iter()
            .filter(|shared| !shared.is_terminal())
            .count()
    }

    /// Returns the number of pending jobs in the queue.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending_count.load(Ordering::Relaxed)
    }

    /// Returns the number of active threads.
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.inner.active_threads.load(Ordering::Relaxed)
    }

    /// Returns the number of threads currently executing work.
    #[must_use]
    pub fn busy_threads(&self) -> usize {
        self.inner.busy_threads.load(Ordering::Relaxed)
    }

    /// Returns `true` if the pool is shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Initiates shutdown of the pool.
    ///
    /// No new threads will spawn. Pending jobs continue to execute.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.notify_all();
    }

    /// Shuts down and waits for all threads to exit.
    ///
    /// Returns `true` if all threads exited cleanly, `false` if the
    /// timeout elapsed first.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();

        let deadline = std::time::Instant::now() + timeout;

        // Threads decrement active_threads when they exit the worker loop.
        while self.inner.active_threads.load(Ordering::Acquire) > 0 {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }

            // Wake any parked threads so they notice the shutdown flag
            self.notify_all();

            thread::sleep(Duration::from_millis(10).min(remaining));
        }

        // All threads have exited; join the handles to clean up
        {
            let mut handles = self
                .inner
                .thread_handles
                .lock()
                .expect("thread handles lock poisoned");
            for handle in handles.drain(..) {
                let _ = handle.join();
            }
        }

        true
    }

    fn live_workers(&self) -> Vec<Arc<WorkerShared<T>>> {
        let mut registry = self.inner.registry.lock().expect("registry lock poisoned");
        registry.retain(|weak| weak.strong_count() > 0);
        registry.iter().filter_map(Weak::upgrade).collect()
    }

    fn notify_one(&self) {
        let _guard = self.inner.mutex.lock().expect("pool mutex poisoned");
        self.inner.condvar.notify_one();
    }

    fn notify_all(&self) {
        let _guard = self.inner.mutex.lock().expect("pool mutex poisoned");
        self.inner.condvar.notify_all();
    }
}

impl<T> Drop for WorkerManager<T> {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        {
            let _guard = self.inner.mutex.lock().expect("pool mutex poisoned");
            self.inner.condvar.notify_all();
        }
        // Give threads a chance to exit gracefully
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while self.inner.active_threads.load(Ordering::Acquire) > 0
            && std::time::Instant::now() < deadline
        {
            {
                let _guard = self.inner.mutex.lock().expect("pool mutex poisoned");
                self.inner.condvar.notify_all();
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

/// Spawn a new pool thread on the given manager inner.
fn spawn_thread_on_inner<T: Send + Sync + 'static>(inner: &Arc<ManagerInner<T>>) {
    let inner_clone = Arc::clone(inner);
    let thread_id = inner.active_threads.fetch_add(1, Ordering::Relaxed);
    let name = format!("{}-worker-{}", inner.thread_name_prefix, thread_id);

    let handle = thread::Builder::new()
        .name(name)
        .spawn(move || {
            worker_loop(&inner_clone);
            inner_clone.active_threads.fetch_sub(1, Ordering::Relaxed);
        })
        .expect("failed to spawn pool thread");

    inner
        .thread_handles
        .lock()
        .expect("thread handles lock poisoned")
        .push(handle);
}

/// Check if we should spawn a new thread and do so if needed.
fn maybe_spawn_thread_on_inner<T: Send + Sync + 'static>(inner: &Arc<ManagerInner<T>>) {
    let active = inner.active_threads.load(Ordering::Relaxed);
    let busy = inner.busy_threads.load(Ordering::Relaxed);
    let pending = inner.pending_count.load(Ordering::Relaxed);

    // Spawn a new thread if:
    // 1. We're below max_threads
    // 2. All threads are busy
    // 3. There's pending work
    if active < inner.max_threads && busy >= active && pending > 0 && !inner.shutdown.load(Ordering::Acquire) {
        spawn_thread_on_inner(inner);
    }
}

/// The worker loop for pool threads.
fn worker_loop<T: Send + Sync + 'static>(inner: &ManagerInner<T>) {
    loop {
        if let Some(job) = inner.queue.pop() {
            inner.pending_count.fetch_sub(1, Ordering::Relaxed);

            // Skip jobs cancelled while queued; the cell is already
            // terminal (or becomes so here).
            if job.shared.is_cancelled() {
                job.shared.cancel();
                continue;
            }

            inner.busy_threads.fetch_add(1, Ordering::Relaxed);
            job.shared.run(job.work);
            inner.busy_threads.fetch_sub(1, Ordering::Relaxed);
            continue;
        }

        // No work available, check shutdown
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        // Check if we should retire this thread
        let active = inner.active_threads.load(Ordering::Relaxed);
        if active > inner.min_threads {
            // Park with timeout
            let result = inner
                .condvar
                .wait_timeout(
                    inner.mutex.lock().expect("pool mutex poisoned"),
                    inner.idle_timeout,
                )
                .expect("pool mutex poisoned");

            // If we timed out and there's still no work, retire
            if result.1.timed_out()
                && inner.queue.is_empty()
                && inner.active_threads.load(Ordering::Relaxed) > inner.min_threads
            {
                break;
            }
        } else {
            // At min_threads: park until woken
            let guard = inner.mutex.lock().expect("pool mutex poisoned");
            let _guard = inner.condvar.wait(guard).expect("pool mutex poisoned");
        }
    }
}
