//! One-shot wake plumbing between event sources and parked contexts.
//!
//! A [`Waiter`] is handed to exactly one wake source group (a monitor
//! callback, a timer entry, an injection) when a fiber or the root context
//! parks. The first `wake` wins; later wakes are no-ops. This is what makes
//! late timer fires and lost I/O-vs-timeout races harmless.
//!
//! [`ParkState`] is the per-context bookkeeping: the currently parked
//! waiter, plus a pending injected error for contexts that are not parked at
//! injection time.

use crate::error::Error;
use parking_lot::Mutex;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::beam::BeamCore;

/// The payload delivered to a parked context on wake: `Ok` for a normal
/// wake, `Err` for an injected cancellation/timeout/close.
pub(crate) type WakePayload = Result<(), Error>;

/// Wake destination: a parked fiber or the scheduler's root context.
pub(crate) enum WakeTarget {
    Beam(Arc<BeamCore>),
    Root(Arc<RootCell>),
}

struct WaiterInner {
    fired: AtomicBool,
    target: WakeTarget,
}

/// One-shot wake slot for a single park.
#[derive(Clone)]
pub(crate) struct Waiter {
    inner: Arc<WaiterInner>,
}

impl Waiter {
    pub(crate) fn for_beam(core: Arc<BeamCore>) -> Self {
        Self {
            inner: Arc::new(WaiterInner {
                fired: AtomicBool::new(false),
                target: WakeTarget::Beam(core),
            }),
        }
    }

    pub(crate) fn for_root(cell: Arc<RootCell>) -> Self {
        Self {
            inner: Arc::new(WaiterInner {
                fired: AtomicBool::new(false),
                target: WakeTarget::Root(cell),
            }),
        }
    }

    /// Delivers `payload` to the parked context. Returns false if another
    /// wake already won.
    pub(crate) fn wake(&self, payload: WakePayload) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        match &self.inner.target {
            WakeTarget::Beam(core) => core.deliver(payload),
            WakeTarget::Root(cell) => cell.set(payload),
        }
        true
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("fired", &self.inner.fired.load(Ordering::Acquire))
            .finish()
    }
}

/// Completion cell for a root-context park: the tick loop spins until the
/// cell is filled.
#[derive(Default)]
pub(crate) struct RootCell {
    slot: Mutex<Option<WakePayload>>,
}

impl RootCell {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, payload: WakePayload) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(payload);
        }
    }

    pub(crate) fn take(&self) -> Option<WakePayload> {
        self.slot.lock().take()
    }
}

/// Park bookkeeping shared by fibers and the root context.
#[derive(Default)]
pub(crate) struct ParkState {
    waiter: Mutex<Option<Waiter>>,
    injection: Mutex<Option<Error>>,
}

impl ParkState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_waiter(&self, waiter: Waiter) {
        *self.waiter.lock() = Some(waiter);
    }

    pub(crate) fn clear_waiter(&self) {
        self.waiter.lock().take();
    }

    /// Injects an error: wakes the parked waiter if one is live, otherwise
    /// holds the error for the next suspension point. The first pending
    /// injection wins; later ones are dropped.
    pub(crate) fn inject(&self, err: Error) {
        let waiter = self.waiter.lock().clone();
        if let Some(waiter) = waiter {
            if waiter.wake(Err(err.clone())) {
                return;
            }
        }
        let mut injection = self.injection.lock();
        if injection.is_none() {
            *injection = Some(err);
        }
    }

    /// Takes a pending injection, if any. Called on entry to every
    /// suspension point.
    pub(crate) fn take_injection(&self) -> Option<Error> {
        self.injection.lock().take()
    }

    /// Takes the pending injection only if it carries `token`. Used by
    /// timeout guards to absorb their own stale injection on exit.
    pub(crate) fn take_injection_with_token(&self, token: NonZeroU64) -> Option<Error> {
        let mut injection = self.injection.lock();
        if injection.as_ref().and_then(Error::token) == Some(token) {
            injection.take()
        } else {
            None
        }
    }
}

impl std::fmt::Debug for ParkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParkState")
            .field("parked", &self.waiter.lock().is_some())
            .field("pending_injection", &self.injection.lock().is_some())
            .finish()
    }
}
