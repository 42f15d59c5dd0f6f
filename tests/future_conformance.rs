//! Conformance tests for the promise/future contract.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use syncopate::{Error, ErrorKind, Promise, Resolution};

#[test]
fn successful_result_is_cached_across_reads_and_handles() {
    let promise = Promise::new();
    let futures: Vec<_> = (0..4).map(|_| promise.future()).collect();

    promise.set_value(1234).expect("first resolution");

    for future in &futures {
        assert_eq!(future.get(), Ok(1234));
        assert_eq!(future.get(), Ok(1234));
    }
}

#[test]
fn failed_result_rethrows_on_every_read() {
    let promise: Promise<u32> = Promise::new();
    let future = promise.future();
    promise
        .set_error(Error::new(ErrorKind::Captured).with_message("flaky sensor"))
        .expect("first resolution");

    for _ in 0..3 {
        let err = future.get().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Captured);
        assert_eq!(err.message(), Some("flaky sensor"));
    }
}

#[test]
fn cancel_before_resolution_blocks_every_later_write() {
    let promise: Promise<u32> = Promise::new();
    let future = promise.future();

    assert!(promise.cancel());

    let err = promise.set_value(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    let err = promise
        .set_error(Error::new(ErrorKind::Internal))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let err = future.get().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TaskCancelled);
}

#[test]
fn slow_producer_loses_to_wait_for_deadline() {
    let promise = Promise::new();
    let future = promise.future();

    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        promise.set_value(5)
    });

    assert_eq!(future.wait_for(Duration::from_millis(20)), None);
    assert!(future.is_cancelled());

    // The late resolution must fail; the terminal state never changes.
    let set_result = producer.join().expect("producer panicked");
    assert_eq!(set_result.unwrap_err().kind(), ErrorKind::Cancelled);
    assert!(future.is_cancelled());
}

#[test]
fn callbacks_observe_each_terminal_state() {
    let value_seen = Arc::new(AtomicUsize::new(0));
    let cancelled_seen = Arc::new(AtomicUsize::new(0));

    let promise = Promise::new();
    let seen = Arc::clone(&value_seen);
    promise.on_complete(move |resolution: &Resolution<i32>| {
        if resolution.value().is_some() {
            seen.fetch_add(1, Ordering::Relaxed);
        }
    });
    promise.set_value(1).expect("first resolution");
    assert_eq!(value_seen.load(Ordering::Relaxed), 1);

    let promise: Promise<i32> = Promise::new();
    let seen = Arc::clone(&cancelled_seen);
    promise.on_complete(move |resolution| {
        if resolution.is_cancelled() {
            seen.fetch_add(1, Ordering::Relaxed);
        }
    });
    promise.cancel();
    assert_eq!(cancelled_seen.load(Ordering::Relaxed), 1);
}

#[test]
fn many_threads_race_to_resolve_exactly_one_wins() {
    let promise = Arc::new(Promise::new());
    let future = promise.future();

    let mut racers = Vec::new();
    for i in 0..8 {
        let promise = Arc::clone(&promise);
        racers.push(thread::spawn(move || promise.set_value(i).is_ok()));
    }

    let winners = racers
        .into_iter()
        .map(|handle| handle.join().expect("racer panicked"))
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    let value = future.get().expect("resolved with a value");
    assert!(value < 8);
}

#[test]
fn chained_futures_propagate_values_and_errors() {
    let promise = Promise::new();
    let future = promise.future();

    let squared = future.then(|result| result.map(|v: i32| v * v));
    let described = squared.then(|result| match result {
        Ok(inner) => format!("{inner:?}"),
        Err(err) => format!("error: {err}"),
    });

    promise.set_value(9).expect("first resolution");
    assert_eq!(described.get(), Ok(String::from("Ok(81)")));
}
