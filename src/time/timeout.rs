//! Timeout guards: a deadline that injects a cancellation error.
//!
//! `timeout(d, f)` runs `f` with a timer armed at `now + d`. If the timer
//! fires while `f` is still inside the guard, the captured context (fiber or
//! root) raises the injected error at its current or next suspension point;
//! the guard recognizes its own injection by a private token, strips it, and
//! hands the caller a plain timeout error. A nested guard's error passes
//! through unchanged, so the guard with the earliest deadline wins.
//!
//! # Race-free cancellation
//!
//! On normal completion the guard cancels its timer. If the timer already
//! fired but its wake lost the race to the real event (I/O ready in the same
//! tick — I/O wins), the stale injection is absorbed here so it can never
//! surface at an unrelated later suspension point.

use crate::error::Error;
use crate::runtime::ioloop::{InjectTarget, IoLoop};
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn next_token() -> NonZeroU64 {
    NonZeroU64::new(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)).unwrap_or(NonZeroU64::MIN)
}

/// Runs `f` under a deadline, failing with a timeout error if the deadline
/// expires while `f` is suspended inside the guard.
///
/// A zero duration runs `f` inline without arming a timer.
pub fn timeout<T>(duration: Duration, f: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
    timeout_with_error(duration, Error::timed_out(), f)
}

/// Like [`timeout`], but injects the caller-supplied error on expiry.
///
/// The injected error surfaces at the suspension point inside `f`; this
/// guard returns it (untagged) once `f` unwinds.
pub fn timeout_with_error<T>(
    duration: Duration,
    err: Error,
    f: impl FnOnce() -> Result<T, Error>,
) -> Result<T, Error> {
    if duration.is_zero() {
        return f();
    }

    let ioloop = IoLoop::current();
    let target = InjectTarget::current(&ioloop);
    let token = next_token();
    let tagged = err.with_token(token);
    let deadline = ioloop.now() + duration;

    let timer = {
        let target = target.clone();
        ioloop.add_timer(deadline, move || target.inject(tagged))
    };

    let result = f();
    timer.cancel();

    // The timer may have fired without its injection being consumed: either
    // the real wake won the same tick, or the block never suspended again.
    // Absorb it so no later suspension point sees a stale timeout.
    let _ = target.take_injection_with_token(token);

    match result {
        Err(e) if e.token() == Some(token) => Err(e.strip_token()),
        other => other,
    }
}

/// Optional-deadline helper for primitives whose timeout parameter may be
/// absent.
pub(crate) fn timeout_opt<T>(
    duration: Option<Duration>,
    f: impl FnOnce() -> Result<T, Error>,
) -> Result<T, Error> {
    match duration {
        Some(duration) => timeout(duration, f),
        None => f(),
    }
}
