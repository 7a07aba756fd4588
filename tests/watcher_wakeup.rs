//! Watcher readiness, close delivery, and status semantics.
//!
//! The fixtures are non-blocking Unix socket pairs: writing one byte into
//! one end makes the other end readable, which is exactly the wakeup the
//! watcher contract promises.

mod common;

use beamio::{spawn, ErrorKind, Interest, IoWatcher};
use common::*;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn readable_wakeup_after_peer_write() {
    init_test("readable_wakeup_after_peer_write");
    let (reader, writer) = socket_pair();
    let watcher = Arc::new(IoWatcher::new(&reader, Interest::READABLE));

    let parked = Arc::clone(&watcher);
    let waiter = spawn(move || {
        let ready = parked.wait_readable(Some(Duration::from_secs(2)))?;
        let observed = parked.readable()?;
        Ok((ready, observed))
    })
    .expect("spawn waiter");

    let writer_beam = spawn(move || {
        (&writer).write_all(b"x").map_err(beamio::Error::from)?;
        Ok(())
    })
    .expect("spawn writer");

    let (ready, observed) = waiter.join().expect("join waiter");
    writer_beam.join().expect("join writer");
    beamio::assert_with_log!(ready, "wait returned readiness, not timeout", true, ready);
    beamio::assert_with_log!(observed, "readable reflects the wakeup", true, observed);
    beamio::test_complete!("readable_wakeup_after_peer_write");
}

#[test]
fn wait_writable_on_fresh_socket_is_immediate() {
    init_test("wait_writable_on_fresh_socket_is_immediate");
    let (_reader, writer) = socket_pair();
    let watcher = IoWatcher::new(&writer, Interest::WRITABLE);
    let ready = watcher
        .wait_writable(Some(Duration::from_secs(2)))
        .expect("wait");
    beamio::assert_with_log!(ready, "fresh socket is writable", true, ready);
    beamio::test_complete!("wait_writable_on_fresh_socket_is_immediate");
}

#[test]
fn wait_times_out_on_silent_peer() {
    init_test("wait_times_out_on_silent_peer");
    let (reader, _writer) = socket_pair();
    let watcher = IoWatcher::new(&reader, Interest::READABLE);

    let started = Instant::now();
    let ready = watcher
        .wait_readable(Some(Duration::from_millis(50)))
        .expect("wait");
    let elapsed = started.elapsed();
    beamio::assert_with_log!(!ready, "timeout reports false", false, ready);
    beamio::assert_with_log!(
        elapsed >= Duration::from_millis(50),
        "full timeout was waited",
        Duration::from_millis(50),
        elapsed
    );
    beamio::test_complete!("wait_times_out_on_silent_peer");
}

#[test]
fn close_wakes_parked_waiter_with_closed_stream() {
    init_test("close_wakes_parked_waiter_with_closed_stream");
    let (reader, _writer) = socket_pair();
    let watcher = Arc::new(IoWatcher::new(&reader, Interest::READABLE));

    let parked = Arc::clone(&watcher);
    let waiter = spawn(move || match parked.wait_readable(None) {
        Err(err) => Ok(err.kind()),
        Ok(ready) => Ok(if ready {
            ErrorKind::Io
        } else {
            ErrorKind::Timeout
        }),
    })
    .expect("spawn waiter");

    let closer = Arc::clone(&watcher);
    let closer_beam = spawn(move || {
        closer.close();
        Ok(())
    })
    .expect("spawn closer");

    let kind = waiter.join().expect("join waiter");
    closer_beam.join().expect("join closer");
    beamio::assert_with_log!(
        kind == ErrorKind::ClosedStream,
        "waiter raised closed stream",
        ErrorKind::ClosedStream,
        kind
    );
    beamio::test_complete!("close_wakes_parked_waiter_with_closed_stream");
}

#[test]
fn close_is_idempotent_and_sticky() {
    init_test("close_is_idempotent_and_sticky");
    let (reader, _writer) = socket_pair();
    let watcher = IoWatcher::new(&reader, Interest::READABLE);

    watcher.close();
    beamio::assert_with_log!(watcher.is_closed(), "closed after close", true, watcher.is_closed());
    watcher.close();
    watcher.close();
    beamio::assert_with_log!(watcher.is_closed(), "closed stays true", true, watcher.is_closed());

    let kind = watcher
        .wait_readable(Some(Duration::from_millis(10)))
        .expect_err("waiting on a closed watcher fails")
        .kind();
    beamio::assert_with_log!(
        kind == ErrorKind::UnexpectedEof,
        "closed watcher rejects waits",
        ErrorKind::UnexpectedEof,
        kind
    );
    beamio::test_complete!("close_is_idempotent_and_sticky");
}

#[test]
fn clear_status_resets_observed_readiness() {
    init_test("clear_status_resets_observed_readiness");
    let (reader, writer) = socket_pair();
    let watcher = IoWatcher::new(&reader, Interest::READABLE);

    (&writer).write_all(b"x").expect("write");
    let ready = watcher
        .wait_readable(Some(Duration::from_secs(2)))
        .expect("wait");
    beamio::assert_with_log!(ready, "wakeup observed", true, ready);
    beamio::assert_with_log!(
        watcher.readable().expect("readable"),
        "readiness is sticky until acknowledged",
        true,
        watcher.readable().expect("readable")
    );

    watcher.clear_status();
    beamio::assert_with_log!(
        !watcher.readable().expect("readable"),
        "clear_status resets the last observed bit",
        false,
        watcher.readable().expect("readable")
    );
    beamio::test_complete!("clear_status_resets_observed_readiness");
}

#[test]
fn double_wait_is_rejected() {
    init_test("double_wait_is_rejected");
    let (reader, _writer) = socket_pair();
    let watcher = Arc::new(IoWatcher::new(&reader, Interest::READABLE));

    let first = Arc::clone(&watcher);
    let first_beam = spawn(move || {
        // Parks until the close below delivers the sticky error.
        match first.wait_readable(None) {
            Err(err) => Ok(err.kind()),
            Ok(_) => Ok(ErrorKind::Io),
        }
    })
    .expect("spawn first waiter");

    let second = Arc::clone(&watcher);
    let second_beam = spawn(move || {
        match second.wait_readable(Some(Duration::from_millis(50))) {
            Err(err) => Ok(err.kind()),
            Ok(_) => Ok(ErrorKind::Io),
        }
    })
    .expect("spawn second waiter");

    let second_kind = second_beam.join().expect("join second");
    beamio::assert_with_log!(
        second_kind == ErrorKind::Scheduler,
        "second concurrent wait fails",
        ErrorKind::Scheduler,
        second_kind
    );

    watcher.close();
    let first_kind = first_beam.join().expect("join first");
    beamio::assert_with_log!(
        first_kind == ErrorKind::ClosedStream,
        "first waiter still gets the close",
        ErrorKind::ClosedStream,
        first_kind
    );
    beamio::test_complete!("double_wait_is_rejected");
}
