//! Descriptor watcher: parks the current fiber until readiness.
//!
//! An [`IoWatcher`] bridges one raw descriptor to its event loop. A fiber
//! calls [`IoWatcher::wait_readable`] / [`IoWatcher::wait_writable`]; the
//! watcher widens its monitor's interest set, parks the fiber, and the
//! monitor callback wakes it when the selector reports readiness — or the
//! sticky error wakes it when the watcher is closed underneath it.
//!
//! # Waiting-state machine
//!
//! ```text
//! None --wait(mode)--> mode --readiness callback--> None
//!                        |
//!                        +--close()----------------> None (waiter raises closed-stream)
//! ```
//!
//! Exactly one fiber may park per watcher; a second concurrent wait fails.
//!
//! # Descriptor contract
//!
//! The watcher does not own the descriptor. The caller keeps it open and in
//! non-blocking mode for the watcher's whole life, and registers it with no
//! other event loop. Dropping the watcher closes its monitor.
//!
//! # Readiness staleness
//!
//! `readable`/`writable` report the readiness last observed by the monitor
//! callback; they never poll the descriptor. [`IoWatcher::clear_status`]
//! resets the recorded readiness once it has been consumed.

use crate::error::{Error, ErrorKind};
use crate::runtime::ioloop::{self, IoLoop, Park};
use crate::runtime::reactor::{Interest, Monitor};
use crate::runtime::waiter::Waiter;
use crate::time;
use parking_lot::Mutex;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

struct WatcherShared {
    ioloop: IoLoop,
    fd: RawFd,
    base_interests: Interest,
    monitor: Mutex<Option<Monitor>>,
    waiting: Mutex<Option<Interest>>,
    readiness: Mutex<Interest>,
    sticky: Mutex<Option<Error>>,
    slot: Mutex<Option<Waiter>>,
    closed: AtomicBool,
}

impl WatcherShared {
    /// Monitor callback: snapshots the monitor's readiness onto the watcher
    /// and wakes the parked fiber, delivering the sticky error if one is
    /// set. Runs on the scheduler thread (or, for close, the closing
    /// fiber's thread); never parks.
    fn on_ready(this: &Arc<Self>) {
        if let Some(monitor) = &*this.monitor.lock() {
            *this.readiness.lock() = monitor.readiness();
        }
        let sticky = this.sticky.lock().clone();
        if let Some(waiter) = this.slot.lock().take() {
            match sticky {
                Some(err) => waiter.wake(Err(err)),
                None => waiter.wake(Ok(())),
            };
        }
    }
}

impl std::fmt::Debug for WatcherShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoWatcher")
            .field("fd", &self.fd)
            .field("waiting", &*self.waiting.lock())
            .field("readiness", &*self.readiness.lock())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// Park that stores the waiter in the watcher's single callback slot.
///
/// The `waiting` mode doubles as the occupancy gate: it is set here and
/// cleared only by the wait that armed it, so a second wait is rejected for
/// the whole span of the first — from park to resume, not just until the
/// first waiter fires.
struct WatcherPark<'a> {
    shared: &'a Arc<WatcherShared>,
    mode: Interest,
    armed: std::cell::Cell<bool>,
}

impl Park for WatcherPark<'_> {
    fn start(&self, _ioloop: &IoLoop, waiter: Waiter) -> Result<(), Error> {
        {
            let mut waiting = self.shared.waiting.lock();
            if waiting.is_some() {
                return Err(Error::scheduler("watcher already has a parked waiter"));
            }
            *waiting = Some(self.mode);
        }
        *self.shared.slot.lock() = Some(waiter);
        self.armed.set(true);
        Ok(())
    }
}

/// Parking primitive for one raw descriptor.
///
/// Bound for life to the event loop of the thread that created it; any wait
/// from another scheduler's context fails with
/// [`ErrorKind::CrossThread`](crate::ErrorKind::CrossThread).
pub struct IoWatcher {
    shared: Arc<WatcherShared>,
}

impl IoWatcher {
    /// Creates a watcher for `source` on the current thread's event loop.
    ///
    /// The monitor is registered lazily, on the first wait or readiness
    /// query. See the module docs for the descriptor contract.
    #[must_use]
    pub fn new<S: AsRawFd>(source: &S, interests: Interest) -> Self {
        Self {
            shared: Arc::new(WatcherShared {
                ioloop: IoLoop::current(),
                fd: source.as_raw_fd(),
                base_interests: interests,
                monitor: Mutex::new(None),
                waiting: Mutex::new(None),
                readiness: Mutex::new(Interest::NONE),
                sticky: Mutex::new(None),
                slot: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Parks the current context until the descriptor is ready for `mode`.
    ///
    /// Returns `Ok(true)` on readiness, `Ok(false)` if `timeout` elapsed
    /// first, and an error if the watcher was closed underneath the waiter
    /// or an error was injected. Interests are widened to include `mode`,
    /// never narrowed.
    pub fn wait(&self, timeout: Option<Duration>, mode: Interest) -> Result<bool, Error> {
        self.check_scheduler()?;
        if mode.is_empty() {
            return Err(Error::scheduler("wait mode must include an interest"));
        }
        if self.is_closed() {
            return Err(Error::eof("waiting on a closed watcher"));
        }
        let monitor = self.ensure_monitor()?;
        monitor.add_interests(mode)?;

        let park = WatcherPark {
            shared: &self.shared,
            mode,
            armed: std::cell::Cell::new(false),
        };
        let parked = time::timeout_opt(timeout, || self.shared.ioloop.wait(&park));

        if park.armed.get() {
            *self.shared.waiting.lock() = None;
            self.shared.slot.lock().take();
        }
        match parked {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::Timeout && err.token().is_none() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Parks until readable. See [`IoWatcher::wait`].
    pub fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool, Error> {
        self.wait(timeout, Interest::READABLE)
    }

    /// Parks until writable. See [`IoWatcher::wait`].
    pub fn wait_writable(&self, timeout: Option<Duration>) -> Result<bool, Error> {
        self.wait(timeout, Interest::WRITABLE)
    }

    /// Returns the last observed readable bit, registering readable
    /// interest if it was not yet tracked. Never polls the descriptor.
    pub fn readable(&self) -> Result<bool, Error> {
        self.last_observed(Interest::READABLE)
            .map(Interest::is_readable)
    }

    /// Returns the last observed writable bit, registering writable
    /// interest if it was not yet tracked. Never polls the descriptor.
    pub fn writable(&self) -> Result<bool, Error> {
        self.last_observed(Interest::WRITABLE)
            .map(Interest::is_writable)
    }

    fn last_observed(&self, interest: Interest) -> Result<Interest, Error> {
        if self.is_closed() {
            return Err(Error::eof("queried a closed watcher"));
        }
        let monitor = self.ensure_monitor()?;
        if !monitor.interests().contains(interest) {
            monitor.add_interests(interest)?;
        }
        Ok(*self.shared.readiness.lock())
    }

    /// Acknowledges the recorded readiness so consumers can wait again.
    pub fn clear_status(&self) {
        *self.shared.readiness.lock() = Interest::NONE;
        if let Some(monitor) = &*self.shared.monitor.lock() {
            monitor.clear_readiness();
        }
    }

    /// Closes the watcher: sets the sticky closed-stream error, closes the
    /// monitor, and wakes any parked fiber with the error. Idempotent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut sticky = self.shared.sticky.lock();
            if sticky.is_none() {
                *sticky = Some(Error::closed_stream());
            }
        }
        if let Some(monitor) = &*self.shared.monitor.lock() {
            if let Err(err) = monitor.close() {
                tracing::debug!(fd = self.shared.fd, error = %err, "monitor close failed");
            }
        }
        WatcherShared::on_ready(&self.shared);
    }

    /// Returns true once [`IoWatcher::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn check_scheduler(&self) -> Result<(), Error> {
        if ioloop::current_scheduler_id() == Some(self.shared.ioloop.id()) {
            Ok(())
        } else {
            Err(Error::cross_thread("io watcher can't cross scheduler threads"))
        }
    }

    fn ensure_monitor(&self) -> Result<Monitor, Error> {
        let mut guard = self.shared.monitor.lock();
        if let Some(monitor) = &*guard {
            return Ok(monitor.clone());
        }
        let weak: Weak<WatcherShared> = Arc::downgrade(&self.shared);
        let monitor = self.shared.ioloop.add_io_wait_fd(
            self.shared.fd,
            self.shared.base_interests,
            Box::new(move |_ready| {
                if let Some(shared) = weak.upgrade() {
                    WatcherShared::on_ready(&shared);
                }
            }),
        )?;
        *guard = Some(monitor.clone());
        Ok(monitor)
    }
}

impl Drop for IoWatcher {
    fn drop(&mut self) {
        // Deferred-cleanup equivalent of finalizer-based monitor close.
        self.close();
    }
}

impl std::fmt::Debug for IoWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.shared.fmt(f)
    }
}
