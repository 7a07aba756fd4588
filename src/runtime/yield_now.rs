//! Yield points for cooperative multitasking.

use crate::error::Error;

use super::ioloop::{self, IoLoop, Park};
use super::waiter::Waiter;

/// Park that is already woken when it starts: the fiber re-enqueues itself
/// and resumes on the next scheduler turn, after everything queued ahead of
/// it.
pub(crate) struct ImmediatePark;

impl Park for ImmediatePark {
    fn start(&self, _ioloop: &IoLoop, waiter: Waiter) -> Result<(), Error> {
        waiter.wake(Ok(()));
        Ok(())
    }
}

/// Voluntarily hands the thread back to the scheduler.
///
/// From a fiber: enqueue self and return on the next scheduler turn — every
/// fiber that was already runnable runs first. From the loop's own thread:
/// resume the fibers queued right now, without touching the selector.
///
/// An injected error (timeout, cancellation) is raised here like at any
/// other suspension point.
pub fn yield_now() -> Result<(), Error> {
    if let Some(core) = ioloop::current_beam() {
        let inner = core
            .sched
            .upgrade()
            .ok_or_else(|| Error::scheduler("scheduler is gone"))?;
        IoLoop::from_inner(inner).wait(&ImmediatePark)
    } else {
        IoLoop::current().yield_turn();
        Ok(())
    }
}
