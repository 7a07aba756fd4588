//! Sleep: park the current fiber until a deadline.
//!
//! Three shapes, matching what callers actually mean:
//!
//! - [`sleep`] with a positive duration parks on a timer entry; elapsed wall
//!   time is at least the requested duration.
//! - [`sleep`] with [`Duration::ZERO`] yields once — the fiber re-enqueues
//!   itself and resumes on the next scheduler turn, without the selector
//!   ever being entered with a positive timeout.
//! - [`sleep_forever`] parks with no timer and no watcher; only an injected
//!   error (an enclosing timeout, cancellation, close) wakes it.

use crate::error::Error;
use crate::runtime::ioloop::{IoLoop, Park};
use crate::runtime::waiter::Waiter;
use crate::runtime::yield_now::yield_now;
use crate::types::Time;
use std::time::Duration;

/// Park armed with a single timer entry.
struct TimerPark {
    deadline: Time,
}

impl Park for TimerPark {
    fn start(&self, ioloop: &IoLoop, waiter: Waiter) -> Result<(), Error> {
        ioloop.add_timer(self.deadline, move || {
            waiter.wake(Ok(()));
        });
        Ok(())
    }
}

/// Park with no wake source at all; only injection resumes it.
struct ForeverPark;

impl Park for ForeverPark {
    fn start(&self, _ioloop: &IoLoop, _waiter: Waiter) -> Result<(), Error> {
        Ok(())
    }
}

/// Parks the current fiber for at least `duration`.
///
/// `Duration::ZERO` yields once instead of arming a timer. An injected
/// error (timeout, cancellation) is raised here.
pub fn sleep(duration: Duration) -> Result<(), Error> {
    if duration.is_zero() {
        return yield_now();
    }
    let ioloop = IoLoop::current();
    let deadline = ioloop.now() + duration;
    ioloop.wait(&TimerPark { deadline })
}

/// Parks the current fiber indefinitely.
///
/// Returns only when an error is injected — typically an enclosing
/// [`timeout`](crate::time::timeout) guard expiring.
pub fn sleep_forever() -> Result<(), Error> {
    IoLoop::current().wait(&ForeverPark)
}
