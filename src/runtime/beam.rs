//! Fibers: independently-schedulable units of blocking-style execution.
//!
//! A [`Beam`] runs its entry function on a dedicated OS thread, but control
//! is handed off through one-slot rendezvous channels so that at most one
//! fiber per scheduler executes at any instant: the scheduler blocks while a
//! fiber runs, and the fiber blocks while anything else runs. The observable
//! semantics are those of stackful coroutines — suspension is transparent to
//! the call stack — without unsafe context switching.
//!
//! # Lifecycle
//!
//! ```text
//! created --enqueue--> runnable --resume--> running --park--> waiting
//!                          ^                   |                 |
//!                          +----deliver--------+-----------------+
//!                        running --return/escape--> dead
//! ```
//!
//! # Error propagation
//!
//! An error escaping the entry function is stored on the fiber and handed to
//! `join` wrapped in [`ErrorKind::Beam`](crate::error::ErrorKind::Beam). If nobody is joining when the
//! fiber dies, the error goes to the observability sink instead; the
//! scheduler keeps running either way.

use crate::error::Error;
use crate::observability;
use crate::types::{BeamId, SchedulerId};
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread;

use super::ioloop::{self, IoLoop, IoLoopInner, Park};
use super::waiter::{ParkState, Waiter, WakePayload};

/// Fiber lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BeamState {
    Created,
    Runnable,
    Running,
    Waiting,
    Dead,
}

/// What a fiber reports back to the scheduler when it yields the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum YieldPoint {
    Suspended,
    Completed,
}

/// One-slot rendezvous used for the scheduler ⇄ fiber handoff.
struct HandoffSlot<T> {
    value: Mutex<Option<T>>,
    cond: Condvar,
}

impl<T> HandoffSlot<T> {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    fn put(&self, value: T) {
        let mut guard = self.value.lock();
        debug_assert!(guard.is_none(), "handoff slot overrun");
        *guard = Some(value);
        self.cond.notify_one();
    }

    fn take(&self) -> T {
        let mut guard = self.value.lock();
        loop {
            if let Some(value) = guard.take() {
                return value;
            }
            self.cond.wait(&mut guard);
        }
    }
}

/// Shared fiber state: scheduling bookkeeping plus the handoff slots.
pub(crate) struct BeamCore {
    pub(crate) id: BeamId,
    pub(crate) scheduler_id: SchedulerId,
    pub(crate) sched: Weak<IoLoopInner>,
    state: Mutex<BeamState>,
    pending_resume: Mutex<Option<WakePayload>>,
    pub(crate) park: ParkState,
    resume_slot: HandoffSlot<WakePayload>,
    yield_slot: HandoffSlot<YieldPoint>,
    joiners: Mutex<Vec<Waiter>>,
    escaped: Mutex<Option<Error>>,
}

impl BeamCore {
    fn new(id: BeamId, scheduler_id: SchedulerId, sched: Weak<IoLoopInner>) -> Self {
        Self {
            id,
            scheduler_id,
            sched,
            state: Mutex::new(BeamState::Created),
            pending_resume: Mutex::new(None),
            park: ParkState::new(),
            resume_slot: HandoffSlot::new(),
            yield_slot: HandoffSlot::new(),
            joiners: Mutex::new(Vec::new()),
            escaped: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> BeamState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: BeamState) {
        *self.state.lock() = state;
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.state() == BeamState::Dead
    }

    /// Stores the resume payload and moves the fiber onto its scheduler's
    /// run queue. Called from a one-shot [`Waiter`], so at most once per
    /// park.
    pub(crate) fn deliver(self: &Arc<Self>, payload: WakePayload) {
        {
            let mut state = self.state.lock();
            if *state == BeamState::Dead {
                return;
            }
            *state = BeamState::Runnable;
        }
        *self.pending_resume.lock() = Some(payload);
        if let Some(sched) = self.sched.upgrade() {
            sched.enqueue(self.clone());
        }
    }

    /// Takes the payload stored by the last wake; defaults to a plain
    /// resume.
    pub(crate) fn take_pending_resume(&self) -> WakePayload {
        self.pending_resume.lock().take().unwrap_or(Ok(()))
    }

    /// Injects an error into this fiber: a parked fiber is woken with it, a
    /// runnable or running fiber raises it at its next suspension point.
    pub(crate) fn inject(&self, err: Error) {
        if self.is_dead() {
            return;
        }
        self.park.inject(err);
    }

    /// Hands the thread back to the scheduler and blocks until resumed.
    /// Returns the resume payload; `Err` means an error was injected at
    /// this suspension point.
    pub(crate) fn suspend(&self) -> WakePayload {
        self.yield_slot.put(YieldPoint::Suspended);
        self.resume_slot.take()
    }

    /// Scheduler side of the handoff: wakes the fiber thread with `payload`
    /// and blocks until it suspends or completes.
    pub(crate) fn run(&self, payload: WakePayload) -> YieldPoint {
        self.set_state(BeamState::Running);
        self.resume_slot.put(payload);
        self.yield_slot.take()
    }

    /// Marks the fiber dead, wakes joiners, and reports an unjoined escaped
    /// error to the sink.
    fn finish(&self, outcome: Result<(), Error>) {
        self.set_state(BeamState::Dead);
        let joiners: Vec<Waiter> = std::mem::take(&mut *self.joiners.lock());
        if let Err(err) = &outcome {
            *self.escaped.lock() = Some(err.clone());
            tracing::debug!(beam = %self.id, error = %err, "beam terminated with error");
            if joiners.is_empty() {
                observability::report_unjoined(self.id, err);
            }
        } else {
            tracing::trace!(beam = %self.id, "beam completed");
        }
        for joiner in joiners {
            joiner.wake(Ok(()));
        }
    }
}

impl std::fmt::Debug for BeamCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeamCore")
            .field("id", &self.id)
            .field("scheduler", &self.scheduler_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Handle to a spawned fiber.
///
/// The handle is detached on drop: the fiber keeps running and any escaped
/// error is reported through the observability sink. `join` consumes the
/// handle and returns the entry function's value.
pub struct Beam<T> {
    core: Arc<BeamCore>,
    result: Arc<Mutex<Option<Result<T, Error>>>>,
}

impl<T> Beam<T> {
    /// Returns the fiber's identifier, unique within its scheduler.
    #[must_use]
    pub fn id(&self) -> BeamId {
        self.core.id
    }

    /// Returns true while the fiber has not finished.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.core.is_dead()
    }

    /// Returns true once the fiber's entry has returned or an error escaped.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.core.is_dead()
    }

    /// Returns the error that escaped this fiber, if it died with one.
    /// Unlike [`Beam::join`] this never parks and never wraps.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        self.core.escaped.lock().clone()
    }

    /// Requests cancellation: injects [`ErrorKind::Cancelled`](crate::error::ErrorKind::Cancelled) so the fiber
    /// raises at its current or next suspension point. Cooperative — a fiber
    /// that swallows errors keeps running.
    pub fn cancel(&self) -> Result<(), Error> {
        if ioloop::current_scheduler_id() != Some(self.core.scheduler_id) {
            return Err(Error::cross_thread("beams can't be cancelled across schedulers"));
        }
        self.core.inject(Error::cancelled());
        Ok(())
    }

    /// Parks the caller until this fiber is dead, then returns its value or
    /// re-raises its escaped error wrapped in [`ErrorKind::Beam`](crate::error::ErrorKind::Beam).
    ///
    /// An error injected into the *caller* while it waits (timeout,
    /// cancellation) propagates unwrapped.
    pub fn join(self) -> Result<T, Error> {
        let inner = self
            .core
            .sched
            .upgrade()
            .ok_or_else(|| Error::scheduler("scheduler is gone"))?;
        let ioloop = IoLoop::from_inner(inner);
        ioloop.wait(&JoinPark { target: &self.core })?;

        let result = self
            .result
            .lock()
            .take()
            .ok_or_else(|| Error::scheduler("joined beam has no result"))?;
        result.map_err(|err| Error::beam(self.core.id, err))
    }
}

impl<T> std::fmt::Debug for Beam<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Beam")
            .field("id", &self.core.id)
            .field("state", &self.core.state())
            .finish_non_exhaustive()
    }
}

/// Park that completes when the target fiber dies.
struct JoinPark<'a> {
    target: &'a Arc<BeamCore>,
}

impl Park for JoinPark<'_> {
    fn start(&self, _ioloop: &IoLoop, waiter: Waiter) -> Result<(), Error> {
        let mut joiners = self.target.joiners.lock();
        if self.target.is_dead() {
            drop(joiners);
            waiter.wake(Ok(()));
        } else {
            joiners.push(waiter);
        }
        Ok(())
    }
}

/// Spawns a new fiber on `ioloop`. The fiber starts in the runnable state;
/// the spawner keeps running.
pub(crate) fn spawn_on<T, F>(ioloop: &IoLoop, f: F) -> Result<Beam<T>, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    let inner = ioloop.inner();
    let id = inner.next_beam_id();
    let core = Arc::new(BeamCore::new(id, inner.id(), Arc::downgrade(&inner)));
    let result: Arc<Mutex<Option<Result<T, Error>>>> = Arc::new(Mutex::new(None));

    let mut builder = thread::Builder::new().name(inner.beam_thread_name(id));
    if let Some(stack_size) = inner.beam_stack_size() {
        builder = builder.stack_size(stack_size);
    }
    {
        let ioloop = ioloop.clone();
        let core = Arc::clone(&core);
        let result = Arc::clone(&result);
        builder.spawn(move || beam_main(&ioloop, &core, &result, f))?;
    }

    core.set_state(BeamState::Runnable);
    *core.pending_resume.lock() = Some(Ok(()));
    inner.register_beam(Arc::clone(&core));
    inner.enqueue(Arc::clone(&core));
    tracing::debug!(beam = %id, scheduler = %inner.id(), "spawned beam");
    Ok(Beam { core, result })
}

/// Fiber thread body: waits for the first resume, runs the entry function
/// with panic isolation, records the outcome, and reports completion.
fn beam_main<T, F>(
    ioloop: &IoLoop,
    core: &Arc<BeamCore>,
    result: &Arc<Mutex<Option<Result<T, Error>>>>,
    f: F,
) where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    ioloop::set_fiber_context(ioloop.clone(), Arc::clone(core));

    let outcome: Result<(), Error> = match core.resume_slot.take() {
        Ok(()) => match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => {
                *result.lock() = Some(Ok(value));
                Ok(())
            }
            Ok(Err(err)) => {
                *result.lock() = Some(Err(err.clone()));
                Err(err)
            }
            Err(panic) => {
                let err = Error::panicked(panic_message(&panic));
                *result.lock() = Some(Err(err.clone()));
                Err(err)
            }
        },
        Err(err) => {
            // Injected before the entry ever ran.
            *result.lock() = Some(Err(err.clone()));
            Err(err)
        }
    };

    core.finish(outcome);
    core.yield_slot.put(YieldPoint::Completed);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "beam entry panicked".to_string()
    }
}

/// Spawns a fiber on the current thread's scheduler.
pub fn spawn<T, F>(f: F) -> Result<Beam<T>, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    spawn_on(&IoLoop::current(), f)
}
