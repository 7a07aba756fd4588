//! Readiness selector backed by the `polling` crate.
//!
//! [`Selector`] wraps a [`polling::Poller`] (epoll on Linux, kqueue on the
//! BSDs and macOS) together with a token → monitor registration map. The
//! poller hands out oneshot notifications, so monitors are re-armed through
//! [`MonitorShared::add_interests`] before every wait.
//!
//! This is the one module that needs `unsafe`: `Poller::add` cannot verify
//! at compile time that a raw descriptor outlives its registration, and
//! re-arming by raw descriptor requires a borrowed fd. Both obligations are
//! discharged by the watcher contract — the descriptor must stay open and
//! registered with at most one selector for the monitor's life.
#![allow(unsafe_code)]

use super::interest::Interest;
use super::monitor::{Monitor, MonitorCallback, MonitorShared};
use super::Token;
use parking_lot::Mutex;
use polling::{Event as PollEvent, Events, Poller};
use std::collections::HashMap;
use std::io;
use std::num::NonZeroUsize;
use std::os::fd::BorrowedFd;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Default capacity of the event buffer handed to the poller.
const DEFAULT_EVENTS_CAPACITY: usize = 1024;

/// A monitor that the selector reported as ready, with the readiness that
/// fired.
pub(crate) type ReadyMonitor = (Arc<MonitorShared>, Interest);

pub(crate) struct SelectorShared {
    poller: Poller,
    monitors: Mutex<HashMap<usize, Arc<MonitorShared>>>,
    events: Mutex<Events>,
    next_key: AtomicUsize,
}

impl SelectorShared {
    fn interest_to_poll_event(key: usize, interest: Interest) -> PollEvent {
        match (interest.is_readable(), interest.is_writable()) {
            (true, true) => PollEvent::all(key),
            (true, false) => PollEvent::readable(key),
            (false, true) => PollEvent::writable(key),
            (false, false) => PollEvent::none(key),
        }
    }

    fn poll_event_to_interest(event: &PollEvent) -> Interest {
        let mut interest = Interest::NONE;
        if event.readable {
            interest |= Interest::READABLE;
        }
        if event.writable {
            interest |= Interest::WRITABLE;
        }
        interest
    }

    /// Re-arms the registration for `monitor` with its full interest set.
    pub(crate) fn rearm(&self, monitor: &MonitorShared) -> io::Result<()> {
        let event = Self::interest_to_poll_event(monitor.token().0, monitor.interests());
        // SAFETY: the monitor is only re-armed while registered, and the
        // watcher contract keeps the descriptor open for that whole period.
        let fd = unsafe { BorrowedFd::borrow_raw(monitor.raw_fd()) };
        self.poller.modify(fd, event)
    }

    pub(crate) fn deregister(&self, monitor: &MonitorShared) -> io::Result<()> {
        self.monitors.lock().remove(&monitor.token().0);
        // SAFETY: deregistration happens at monitor close, before the
        // watcher contract releases the descriptor.
        let fd = unsafe { BorrowedFd::borrow_raw(monitor.raw_fd()) };
        self.poller.delete(fd)
    }
}

impl std::fmt::Debug for SelectorShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("registrations", &self.monitors.lock().len())
            .finish_non_exhaustive()
    }
}

/// Readiness selector: registers descriptors and waits for events.
///
/// One selector per scheduler. `select` is called only from the scheduler
/// thread; registration and re-arm may also be called from fiber threads
/// (serialized by the cooperative handoff).
pub(crate) struct Selector {
    shared: Arc<SelectorShared>,
}

impl Selector {
    pub(crate) fn new(events_capacity: usize) -> io::Result<Self> {
        let capacity = NonZeroUsize::new(events_capacity)
            .or(NonZeroUsize::new(DEFAULT_EVENTS_CAPACITY))
            .expect("default events capacity is non-zero");
        Ok(Self {
            shared: Arc::new(SelectorShared {
                poller: Poller::new()?,
                monitors: Mutex::new(HashMap::new()),
                events: Mutex::new(Events::with_capacity(capacity)),
                next_key: AtomicUsize::new(1),
            }),
        })
    }

    /// Registers a descriptor with the poller and returns its [`Monitor`].
    ///
    /// The returned monitor's callback fires on the scheduler thread when
    /// the descriptor becomes ready for any registered interest.
    pub(crate) fn register(
        &self,
        fd: RawFd,
        interests: Interest,
        callback: MonitorCallback,
    ) -> io::Result<Monitor> {
        let key = self.shared.next_key.fetch_add(1, Ordering::Relaxed);
        let event = SelectorShared::interest_to_poll_event(key, interests);
        // SAFETY: callers guarantee the descriptor stays open until the
        // monitor is closed, and register it with at most this selector.
        unsafe { self.shared.poller.add(fd, event)? };

        let shared = Arc::new(MonitorShared::new(
            Token(key),
            fd,
            interests,
            Arc::downgrade(&self.shared),
        ));
        shared.set_callback(callback);
        self.shared.monitors.lock().insert(key, Arc::clone(&shared));
        tracing::trace!(token = key, ?interests, "registered descriptor");
        Ok(Monitor { shared })
    }

    /// Waits for readiness up to `timeout` (`None` blocks indefinitely) and
    /// returns the monitors that fired.
    ///
    /// An interrupted wait is reported as an empty set so the tick loop can
    /// re-derive its deadline and retry.
    pub(crate) fn select(&self, timeout: Option<Duration>) -> io::Result<Vec<ReadyMonitor>> {
        let mut events = self.shared.events.lock();
        events.clear();
        match self.shared.poller.wait(&mut events, timeout) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(err) => return Err(err),
        }

        let monitors = self.shared.monitors.lock();
        let mut ready = Vec::with_capacity(events.len());
        for event in events.iter() {
            let interest = SelectorShared::poll_event_to_interest(&event);
            if let Some(monitor) = monitors.get(&event.key) {
                ready.push((Arc::clone(monitor), interest));
            } else {
                tracing::trace!(token = event.key, "event for unregistered token dropped");
            }
        }
        Ok(ready)
    }

    /// Number of live registrations.
    pub(crate) fn registration_count(&self) -> usize {
        self.shared.monitors.lock().len()
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.shared.fmt(f)
    }
}
