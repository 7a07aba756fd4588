//! Sleep and timeout timing guarantees.
//!
//! These tests pin the observable timing contract: positive sleeps elapse at
//! least their duration, zero sleeps return within a scheduler quantum, and
//! timeout guards fire, cancel, and compose the way callers rely on.

mod common;

use beamio::{sleep, sleep_forever, spawn, timeout, Error, ErrorKind, IoLoop};
use common::*;
use std::time::{Duration, Instant};

/// Upper-bound quantum for "immediate" operations.
const QUANTUM: Duration = Duration::from_millis(100);

#[test]
fn positive_sleep_elapses_at_least_its_duration() {
    init_test("positive_sleep_elapses_at_least_its_duration");
    let started = Instant::now();
    sleep(Duration::from_millis(10)).expect("sleep");
    let elapsed = started.elapsed();
    beamio::assert_with_log!(
        elapsed >= Duration::from_millis(10),
        "sleep(10ms) takes at least 10ms",
        Duration::from_millis(10),
        elapsed
    );
    beamio::test_complete!("positive_sleep_elapses_at_least_its_duration");
}

#[test]
fn zero_sleep_returns_within_a_quantum() {
    init_test("zero_sleep_returns_within_a_quantum");
    let started = Instant::now();
    sleep(Duration::ZERO).expect("sleep");
    let elapsed = started.elapsed();
    beamio::assert_with_log!(elapsed < QUANTUM, "sleep(0) is immediate", QUANTUM, elapsed);
    beamio::test_complete!("zero_sleep_returns_within_a_quantum");
}

#[test]
fn positive_sleep_holds_inside_a_fiber() {
    init_test("positive_sleep_holds_inside_a_fiber");
    let beam = spawn(|| {
        let started = Instant::now();
        sleep(Duration::from_millis(10))?;
        Ok(started.elapsed())
    })
    .expect("spawn");
    let elapsed = beam.join().expect("join");
    beamio::assert_with_log!(
        elapsed >= Duration::from_millis(10),
        "fiber sleep honors its duration",
        Duration::from_millis(10),
        elapsed
    );
    beamio::test_complete!("positive_sleep_holds_inside_a_fiber");
}

#[test]
fn sleep_forever_raises_under_timeout() {
    init_test("sleep_forever_raises_under_timeout");
    let started = Instant::now();
    let result = timeout(Duration::from_millis(10), || sleep_forever());
    let elapsed = started.elapsed();
    let kind = result.expect_err("must time out").kind();
    beamio::assert_with_log!(
        kind == ErrorKind::Timeout,
        "timeout error surfaces",
        ErrorKind::Timeout,
        kind
    );
    beamio::assert_with_log!(
        elapsed >= Duration::from_millis(10),
        "guard waited for its deadline",
        Duration::from_millis(10),
        elapsed
    );
    beamio::test_complete!("sleep_forever_raises_under_timeout");
}

#[test]
fn sleep_forever_raises_under_timeout_in_a_fiber() {
    init_test("sleep_forever_raises_under_timeout_in_a_fiber");
    let beam = spawn(|| {
        match timeout(Duration::from_millis(10), || sleep_forever()) {
            Err(err) if err.is_timeout() => Ok(()),
            Err(err) => Err(err),
            Ok(()) => Err(Error::scheduler("sleep_forever returned without injection")),
        }
    })
    .expect("spawn");
    beam.join().expect("join");
    beamio::test_complete!("sleep_forever_raises_under_timeout_in_a_fiber");
}

#[test]
fn successful_timeout_leaves_no_stale_error() {
    init_test("successful_timeout_leaves_no_stale_error");
    timeout(Duration::from_secs(1), || sleep(Duration::from_millis(10)))
        .expect("block finishes well before the deadline");
    // A stale injection would surface at this later suspension point.
    sleep(Duration::from_millis(100)).expect("later sleep is undisturbed");
    beamio::test_complete!("successful_timeout_leaves_no_stale_error");
}

#[test]
fn nested_timeouts_innermost_deadline_wins() {
    init_test("nested_timeouts_innermost_deadline_wins");
    let started = Instant::now();
    let result = timeout(Duration::from_secs(5), || {
        timeout(Duration::from_millis(10), || sleep_forever())
    });
    let elapsed = started.elapsed();
    let kind = result.expect_err("inner guard fires").kind();
    beamio::assert_with_log!(
        kind == ErrorKind::Timeout,
        "timeout kind from the inner guard",
        ErrorKind::Timeout,
        kind
    );
    beamio::assert_with_log!(
        elapsed < Duration::from_secs(5),
        "outer deadline never fires",
        Duration::from_secs(5),
        elapsed
    );
    beamio::test_complete!("nested_timeouts_innermost_deadline_wins");
}

#[test]
fn zero_duration_timeout_runs_inline() {
    init_test("zero_duration_timeout_runs_inline");
    let value = timeout(Duration::ZERO, || Ok(11)).expect("inline run");
    beamio::assert_with_log!(value == 11, "block value passes through", 11, value);
    beamio::test_complete!("zero_duration_timeout_runs_inline");
}

#[test]
fn timer_callbacks_fire_via_run_until() {
    init_test("timer_callbacks_fire_via_run_until");
    let ioloop = IoLoop::current();
    let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = std::sync::Arc::clone(&fired);
    ioloop.add_timer(ioloop.now() + Duration::from_millis(5), move || {
        flag.store(true, std::sync::atomic::Ordering::SeqCst);
    });
    ioloop
        .run_until(|| fired.load(std::sync::atomic::Ordering::SeqCst))
        .expect("run_until");
    beamio::test_complete!("timer_callbacks_fire_via_run_until");
}

#[test]
fn canceled_timer_never_fires() {
    init_test("canceled_timer_never_fires");
    let ioloop = IoLoop::current();
    let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = std::sync::Arc::clone(&fired);
    let handle = ioloop.add_timer(ioloop.now() + Duration::from_millis(5), move || {
        flag.store(true, std::sync::atomic::Ordering::SeqCst);
    });
    handle.cancel();
    sleep(Duration::from_millis(20)).expect("sleep past the deadline");
    beamio::assert_with_log!(
        !fired.load(std::sync::atomic::Ordering::SeqCst),
        "canceled entry is skipped",
        false,
        fired.load(std::sync::atomic::Ordering::SeqCst)
    );
    beamio::test_complete!("canceled_timer_never_fires");
}
