//! Per-descriptor registration state.
//!
//! A [`Monitor`] is the selector-level registration for one descriptor: its
//! current interest set, the readiness last reported for it, a closed flag,
//! and the callback the scheduler invokes when readiness arrives. Readiness
//! is sticky until the consumer acknowledges it with
//! [`Monitor::clear_readiness`]; interests are only ever widened while the
//! monitor is open.

use super::interest::Interest;
use super::selector::SelectorShared;
use super::Token;
use parking_lot::Mutex;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked on the scheduler thread when readiness is reported.
pub(crate) type MonitorCallback = Box<dyn Fn(Interest) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct MonitorState {
    interests: Interest,
    readiness: Interest,
}

pub(crate) struct MonitorShared {
    token: Token,
    fd: RawFd,
    state: Mutex<MonitorState>,
    closed: AtomicBool,
    callback: Mutex<Option<MonitorCallback>>,
    selector: Weak<SelectorShared>,
}

impl MonitorShared {
    pub(crate) fn new(
        token: Token,
        fd: RawFd,
        interests: Interest,
        selector: Weak<SelectorShared>,
    ) -> Self {
        Self {
            token,
            fd,
            state: Mutex::new(MonitorState {
                interests,
                readiness: Interest::NONE,
            }),
            closed: AtomicBool::new(false),
            callback: Mutex::new(None),
            selector,
        }
    }

    pub(crate) const fn token(&self) -> Token {
        self.token
    }

    pub(crate) const fn raw_fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn interests(&self) -> Interest {
        self.state.lock().interests
    }

    pub(crate) fn readiness(&self) -> Interest {
        self.state.lock().readiness
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Records readiness reported by the selector. Notifications on a closed
    /// monitor are discarded.
    pub(crate) fn record_readiness(&self, ready: Interest) {
        if self.is_closed() {
            return;
        }
        let mut state = self.state.lock();
        state.readiness |= ready;
    }

    pub(crate) fn clear_readiness(&self) {
        self.state.lock().readiness = Interest::NONE;
    }

    pub(crate) fn set_callback(&self, callback: MonitorCallback) {
        *self.callback.lock() = Some(callback);
    }

    /// Invokes the registered callback with the readiness that fired.
    ///
    /// Runs on the scheduler thread; the callback must not park.
    pub(crate) fn invoke_callback(&self, ready: Interest) {
        let guard = self.callback.lock();
        if let Some(callback) = guard.as_ref() {
            callback(ready);
        }
    }

    /// Widens the interest set to include `more` and re-arms the selector
    /// registration. Interests are never narrowed here.
    pub(crate) fn add_interests(&self, more: Interest) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "monitor is closed",
            ));
        }
        {
            let mut state = self.state.lock();
            state.interests |= more;
        }
        // Always re-arm: the selector delivers oneshot notifications, so an
        // unchanged interest set still needs refreshing before a new wait.
        match self.selector.upgrade() {
            Some(selector) => selector.rearm(self),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "selector is gone",
            )),
        }
    }

    /// Closes the registration. Idempotent; later readiness notifications and
    /// interest updates are rejected.
    pub(crate) fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        *self.callback.lock() = None;
        if let Some(selector) = self.selector.upgrade() {
            selector.deregister(self)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MonitorShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.lock();
        f.debug_struct("Monitor")
            .field("token", &self.token)
            .field("fd", &self.fd)
            .field("interests", &state.interests)
            .field("readiness", &state.readiness)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Handle to an active selector registration for one descriptor.
///
/// Cheap to clone; all clones refer to the same registration. Closing is
/// idempotent and releases the selector slot.
#[derive(Clone)]
pub struct Monitor {
    pub(crate) shared: Arc<MonitorShared>,
}

impl Monitor {
    /// Returns the token identifying this registration.
    #[must_use]
    pub fn token(&self) -> Token {
        self.shared.token()
    }

    /// Returns the current interest set.
    #[must_use]
    pub fn interests(&self) -> Interest {
        self.shared.interests()
    }

    /// Widens the interest set to include `more` and re-arms the selector.
    pub fn add_interests(&self, more: Interest) -> io::Result<()> {
        self.shared.add_interests(more)
    }

    /// Returns the last observed readiness.
    #[must_use]
    pub fn readiness(&self) -> Interest {
        self.shared.readiness()
    }

    /// Acknowledges (clears) the recorded readiness.
    pub fn clear_readiness(&self) {
        self.shared.clear_readiness();
    }

    /// Returns true once the monitor has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Closes the registration; safe to call any number of times.
    pub fn close(&self) -> io::Result<()> {
        self.shared.close()
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.shared.fmt(f)
    }
}
