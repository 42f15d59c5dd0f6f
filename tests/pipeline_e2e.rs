//! End-to-end scenarios across the task/future/worker/limiter pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use syncopate::{ErrorKind, PackagedTask, RateLimiter, WorkerManager};

#[test]
fn packaged_task_pipeline_with_completion_callback() {
    let task = PackagedTask::new(|x: i32| x * 2);
    let future = task.future();

    let callback_hits = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&callback_hits);
    task.on_complete(move |resolution| {
        assert_eq!(resolution.value(), Some(&10));
        hits.fetch_add(1, Ordering::Relaxed);
    });

    task.call(5);

    assert_eq!(future.get(), Ok(10));
    assert_eq!(callback_hits.load(Ordering::Relaxed), 1);
}

#[test]
fn login_burst_admits_exactly_the_limit() {
    let limiter = Arc::new(RateLimiter::new());
    limiter.set_function_limit("login", 5, Duration::from_secs(1));

    let mut attempts = Vec::new();
    for _ in 0..10 {
        let limiter = Arc::clone(&limiter);
        attempts.push(thread::spawn(move || limiter.try_acquire("login")));
    }

    let admitted = attempts
        .into_iter()
        .map(|handle| handle.join().expect("attempt panicked"))
        .filter(|admitted| *admitted)
        .count();

    assert_eq!(admitted, 5);
    assert_eq!(limiter.rejected_requests("login"), 5);
}

#[test]
fn limiter_gates_worker_submission() {
    let limiter = RateLimiter::new();
    limiter.set_function_limit("connect", 2, Duration::from_secs(60));

    let manager = WorkerManager::new(1, 4);
    let started = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        if limiter.try_acquire("connect") {
            let started = Arc::clone(&started);
            manager.start_async(move || {
                started.fetch_add(1, Ordering::Relaxed);
            });
        }
    }

    manager.wait_for_all();
    assert_eq!(started.load(Ordering::Relaxed), 2);
    assert_eq!(limiter.rejected_requests("connect"), 3);
}

#[test]
fn worker_result_flows_through_future_chain() {
    let manager = WorkerManager::new(1, 2);
    let worker = manager.start_async(|| 6 * 7);

    let formatted = worker
        .future()
        .then(|result| format!("answer={}", result.expect("worker succeeded")));

    assert_eq!(formatted.get(), Ok(String::from("answer=42")));
}

#[test]
fn timed_out_worker_cancels_instead_of_erroring() {
    let manager = WorkerManager::new(1, 1);
    let worker = manager.start_async(|| {
        thread::sleep(Duration::from_millis(200));
        1
    });

    worker.set_timeout(Duration::from_millis(20));
    assert!(!worker.wait_for_completion());
    assert!(worker.is_cancelled());

    let err = worker.get_result().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TaskCancelled);
}

#[test]
fn fire_and_forget_error_is_observable_via_introspection() {
    let manager: WorkerManager<i32> = WorkerManager::new(1, 2);
    let worker = manager.start_async(|| panic!("device offline"));

    // The caller never calls get_result; the error is still visible
    // through the advisory accessor once the worker finishes.
    assert!(worker.wait_for_completion());
    let error = worker.future().error().expect("error stored");
    assert_eq!(error.kind(), ErrorKind::Captured);
    assert_eq!(error.message(), Some("device offline"));
}

#[test]
fn retry_drives_a_flaky_task_to_success() {
    let failures_left = Arc::new(AtomicUsize::new(2));
    let counter = Arc::clone(&failures_left);
    let task = PackagedTask::new(move |(): ()| {
        if counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("transient failure");
        }
        99
    });
    let future = task.future();

    task.call(());
    let result = future.retry(|value| *value == 99, 5);
    assert_eq!(result, Ok(99));
}

#[test]
fn batch_cancellation_reaches_queued_work() {
    let manager = WorkerManager::new(0, 1);
    let gate = Arc::new(std::sync::Barrier::new(2));

    let gate_clone = Arc::clone(&gate);
    let running = manager.start_async(move || {
        gate_clone.wait();
        0
    });

    let queued: Vec<_> = (0..4).map(|i| manager.start_async(move || i)).collect();

    manager.cancel_all();
    gate.wait();
    manager.wait_for_all();

    assert!(manager.all_done());
    for worker in &queued {
        let err = worker.get_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TaskCancelled);
    }
    assert!(!running.is_active());
}
