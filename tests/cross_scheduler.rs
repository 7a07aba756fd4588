//! Cross-scheduler rejection: fibers, watchers, and loops are bound to
//! their creating event loop for life.

mod common;

use beamio::{spawn, ErrorKind, Interest, IoLoop, IoWatcher};
use common::*;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn watcher_rejects_wait_from_foreign_fiber() {
    init_test("watcher_rejects_wait_from_foreign_fiber");
    let (reader, _writer) = socket_pair();
    // Bound to this thread's loop (S1).
    let watcher = Arc::new(IoWatcher::new(&reader, Interest::READABLE));

    let foreign = Arc::clone(&watcher);
    let kind = std::thread::spawn(move || {
        // This thread lazily gets its own loop (S2); the fiber runs on it.
        let beam = spawn(move || match foreign.wait_readable(Some(Duration::from_millis(50))) {
            Err(err) => Ok(err.kind()),
            Ok(_) => Ok(ErrorKind::Io),
        })
        .expect("spawn foreign fiber");
        beam.join().expect("join foreign fiber")
    })
    .join()
    .expect("thread");

    beamio::assert_with_log!(
        kind == ErrorKind::CrossThread,
        "foreign fiber is rejected",
        ErrorKind::CrossThread,
        kind
    );
    beamio::test_complete!("watcher_rejects_wait_from_foreign_fiber");
}

#[test]
fn watcher_rejects_wait_from_foreign_root() {
    init_test("watcher_rejects_wait_from_foreign_root");
    let (reader, _writer) = socket_pair();
    let watcher = Arc::new(IoWatcher::new(&reader, Interest::READABLE));

    let foreign = Arc::clone(&watcher);
    let kind = std::thread::spawn(move || {
        foreign
            .wait_readable(Some(Duration::from_millis(50)))
            .expect_err("must be rejected")
            .kind()
    })
    .join()
    .expect("thread");

    beamio::assert_with_log!(
        kind == ErrorKind::CrossThread,
        "foreign root is rejected",
        ErrorKind::CrossThread,
        kind
    );
    beamio::test_complete!("watcher_rejects_wait_from_foreign_root");
}

#[test]
fn cancel_rejects_foreign_scheduler() {
    init_test("cancel_rejects_foreign_scheduler");
    let beam = spawn(|| beamio::sleep(Duration::from_millis(200))).expect("spawn");

    std::thread::scope(|scope| {
        let handle = scope.spawn(|| beam.cancel().expect_err("must be rejected").kind());
        let kind = handle.join().expect("thread");
        beamio::assert_with_log!(
            kind == ErrorKind::CrossThread,
            "foreign cancel is rejected",
            ErrorKind::CrossThread,
            kind
        );
    });

    // The owning context can still cancel.
    beam.cancel().expect("local cancel");
    let kind = beam.join().expect_err("cancellation escapes the entry").kind();
    beamio::assert_with_log!(kind == ErrorKind::Beam, "join wraps the escape", ErrorKind::Beam, kind);
    beamio::test_complete!("cancel_rejects_foreign_scheduler");
}

#[test]
fn run_until_rejects_foreign_thread() {
    init_test("run_until_rejects_foreign_thread");
    let ioloop = IoLoop::current();

    let kind = std::thread::scope(|scope| {
        scope
            .spawn(|| {
                ioloop
                    .run_until(|| true)
                    .expect_err("must be rejected")
                    .kind()
            })
            .join()
            .expect("thread")
    });

    beamio::assert_with_log!(
        kind == ErrorKind::CrossThread,
        "foreign driver is rejected",
        ErrorKind::CrossThread,
        kind
    );
    beamio::test_complete!("run_until_rejects_foreign_thread");
}
