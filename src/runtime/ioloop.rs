//! The per-thread event loop.
//!
//! An [`IoLoop`] owns a readiness selector, a timer heap, a FIFO run queue
//! of runnable fibers, and the registry of live fibers. Exactly one loop is
//! current on an OS thread; [`IoLoop::current`] creates it lazily. Fibers,
//! watchers, and timers are bound to their creating loop for life — using
//! them from another loop's thread fails with a cross-thread error.
//!
//! # Tick loop
//!
//! ```text
//! loop {
//!     1. pop the head of the run queue and resume it; repeat while non-empty
//!     2. select(timeout = nearest timer deadline − now, ∞ if none)
//!     3. record readiness and fire monitor callbacks (I/O first...)
//!     4. pop expired timers, skipping canceled ones, and fire them (...timers second)
//! }
//! ```
//!
//! Fibers woken in the same tick resume FIFO in callback order, and I/O
//! callbacks fire before timer callbacks, so a descriptor that becomes ready
//! exactly at its timeout is observed as ready. Callback panics are caught
//! and logged; they never kill the loop.
//!
//! # The root context
//!
//! When a blocking primitive is used with no current fiber, the calling
//! thread is the loop's own thread. It parks by driving the tick loop inline
//! until its wake fires — the root context is the primordial fiber, and it
//! supports error injection the same way.

use crate::error::Error;
use crate::types::{BeamId, SchedulerId, Time};
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::os::unix::io::AsRawFd;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::beam::{self, Beam, BeamCore, BeamState, YieldPoint};
use super::builder::IoLoopBuilder;
use super::reactor::{Interest, Monitor, MonitorCallback, Selector};
use super::timer::{TimerCallback, TimerHandle, TimerHeap};
use super::waiter::{ParkState, RootCell, Waiter};

thread_local! {
    static CURRENT_LOOP: RefCell<Option<IoLoop>> = const { RefCell::new(None) };
    static CURRENT_BEAM: RefCell<Option<Arc<BeamCore>>> = const { RefCell::new(None) };
}

/// Returns the fiber currently executing on this OS thread, if any.
pub(crate) fn current_beam() -> Option<Arc<BeamCore>> {
    CURRENT_BEAM.with(|beam| beam.borrow().clone())
}

/// Returns the scheduler the calling context belongs to, if any: the current
/// fiber's owner, or the loop installed on this thread.
pub(crate) fn current_scheduler_id() -> Option<SchedulerId> {
    if let Some(core) = current_beam() {
        return Some(core.scheduler_id);
    }
    CURRENT_LOOP.with(|l| l.borrow().as_ref().map(IoLoop::id))
}

/// Binds a fiber thread to its owning loop. Called once, before the entry
/// function runs.
pub(crate) fn set_fiber_context(ioloop: IoLoop, core: Arc<BeamCore>) {
    CURRENT_LOOP.with(|l| *l.borrow_mut() = Some(ioloop));
    CURRENT_BEAM.with(|b| *b.borrow_mut() = Some(core));
}

fn installed_loop() -> Option<IoLoop> {
    CURRENT_LOOP.with(|l| l.borrow().clone())
}

fn install_loop(ioloop: &IoLoop) -> Result<(), Error> {
    CURRENT_LOOP.with(|l| {
        let mut slot = l.borrow_mut();
        if slot.is_some() {
            return Err(Error::scheduler("thread already has an event loop"));
        }
        *slot = Some(ioloop.clone());
        Ok(())
    })
}

/// Something a context can park on: it receives the loop and a one-shot
/// [`Waiter`] and arranges for the waiter to be woken later.
pub(crate) trait Park {
    fn start(&self, ioloop: &IoLoop, waiter: Waiter) -> Result<(), Error>;
}

/// Where a timeout guard injects its error: the capturing fiber or the
/// root context of the capturing loop.
#[derive(Clone)]
pub(crate) enum InjectTarget {
    Beam(Arc<BeamCore>),
    Root(Arc<IoLoopInner>),
}

impl InjectTarget {
    /// Captures the calling context.
    pub(crate) fn current(ioloop: &IoLoop) -> Self {
        match current_beam() {
            Some(core) => Self::Beam(core),
            None => Self::Root(ioloop.inner()),
        }
    }

    fn park_state(&self) -> &ParkState {
        match self {
            Self::Beam(core) => &core.park,
            Self::Root(inner) => &inner.root_park,
        }
    }

    /// Injects `err`: wakes the context if parked, otherwise holds the
    /// error for its next suspension point.
    pub(crate) fn inject(&self, err: Error) {
        match self {
            Self::Beam(core) => core.inject(err),
            Self::Root(inner) => inner.root_park.inject(err),
        }
    }

    /// Absorbs a pending injection carrying `token` (a guard cleaning up
    /// after its own timer fired but lost the wake race).
    pub(crate) fn take_injection_with_token(&self, token: NonZeroU64) -> Option<Error> {
        self.park_state().take_injection_with_token(token)
    }
}

pub(crate) struct IoLoopInner {
    id: SchedulerId,
    epoch: Instant,
    selector: Selector,
    timers: Mutex<TimerHeap>,
    run_queue: SegQueue<Arc<BeamCore>>,
    live: Mutex<HashMap<BeamId, Arc<BeamCore>>>,
    current: Mutex<Option<Arc<BeamCore>>>,
    pub(crate) root_park: ParkState,
    next_beam: AtomicU64,
    beam_stack_size: Option<usize>,
    thread_name_prefix: String,
}

impl IoLoopInner {
    pub(crate) const fn id(&self) -> SchedulerId {
        self.id
    }

    pub(crate) fn now(&self) -> Time {
        let elapsed = self.epoch.elapsed();
        Time::from_nanos(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
    }

    pub(crate) fn enqueue(&self, core: Arc<BeamCore>) {
        self.run_queue.push(core);
    }

    pub(crate) fn register_beam(&self, core: Arc<BeamCore>) {
        self.live.lock().insert(core.id, core);
    }

    pub(crate) fn next_beam_id(&self) -> BeamId {
        BeamId::from_raw(self.next_beam.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn beam_thread_name(&self, id: BeamId) -> String {
        format!("{}{id}", self.thread_name_prefix)
    }

    pub(crate) const fn beam_stack_size(&self) -> Option<usize> {
        self.beam_stack_size
    }
}

/// Handle to a per-thread event loop. Cheap to clone.
#[derive(Clone)]
pub struct IoLoop {
    inner: Arc<IoLoopInner>,
}

impl IoLoop {
    pub(crate) fn build(builder: &IoLoopBuilder) -> Result<Self, Error> {
        let inner = Arc::new(IoLoopInner {
            id: SchedulerId::next(),
            epoch: Instant::now(),
            selector: Selector::new(builder.events_capacity_value())?,
            timers: Mutex::new(TimerHeap::new()),
            run_queue: SegQueue::new(),
            live: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            root_park: ParkState::new(),
            next_beam: AtomicU64::new(1),
            beam_stack_size: builder.beam_stack_size_value(),
            thread_name_prefix: builder.thread_name_prefix_value().to_string(),
        });
        tracing::debug!(scheduler = %inner.id, "created event loop");
        Ok(Self { inner })
    }

    pub(crate) fn install(&self) -> Result<(), Error> {
        install_loop(self)
    }

    /// Returns the loop bound to this OS thread, creating one with default
    /// configuration on first use.
    ///
    /// # Panics
    ///
    /// Panics if the OS selector cannot be created (descriptor exhaustion).
    /// Use [`IoLoop::try_current`] where that matters.
    #[must_use]
    pub fn current() -> Self {
        match Self::try_current() {
            Ok(ioloop) => ioloop,
            Err(err) => panic!("failed to initialize event loop: {err}"),
        }
    }

    /// Fallible variant of [`IoLoop::current`].
    pub fn try_current() -> Result<Self, Error> {
        if let Some(ioloop) = installed_loop() {
            return Ok(ioloop);
        }
        let ioloop = Self::build(&IoLoopBuilder::new())?;
        ioloop.install()?;
        Ok(ioloop)
    }

    pub(crate) fn inner(&self) -> Arc<IoLoopInner> {
        Arc::clone(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<IoLoopInner>) -> Self {
        Self { inner }
    }

    /// Returns this loop's identifier.
    #[must_use]
    pub fn id(&self) -> SchedulerId {
        self.inner.id
    }

    /// Monotonic time since this loop was created.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner.now()
    }

    /// Spawns a fiber on this loop. The fiber is runnable immediately; the
    /// caller keeps running.
    pub fn spawn<T, F>(&self, f: F) -> Result<Beam<T>, Error>
    where
        F: FnOnce() -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        beam::spawn_on(self, f)
    }

    /// Schedules `callback` to fire at the absolute deadline. The returned
    /// handle cancels the entry; canceled entries are skipped on pop.
    pub fn add_timer(
        &self,
        deadline: Time,
        callback: impl FnOnce() + Send + 'static,
    ) -> TimerHandle {
        let callback: TimerCallback = Box::new(callback);
        self.inner.timers.lock().insert(deadline, callback)
    }

    /// Registers a descriptor with the selector and returns its monitor.
    ///
    /// The callback fires on this loop's thread whenever readiness is
    /// reported. The caller must keep the descriptor open (and registered
    /// with no other selector) until the monitor is closed.
    pub fn add_io_wait<S: AsRawFd>(
        &self,
        source: &S,
        interests: Interest,
        callback: impl Fn(Interest) + Send + Sync + 'static,
    ) -> Result<Monitor, Error> {
        self.add_io_wait_fd(source.as_raw_fd(), interests, Box::new(callback))
    }

    pub(crate) fn add_io_wait_fd(
        &self,
        fd: std::os::unix::io::RawFd,
        interests: Interest,
        callback: MonitorCallback,
    ) -> Result<Monitor, Error> {
        Ok(self.inner.selector.register(fd, interests, callback)?)
    }

    /// Returns the fiber currently running on this loop, if any.
    #[must_use]
    pub fn running_beam(&self) -> Option<BeamId> {
        self.inner.current.lock().as_ref().map(|core| core.id)
    }

    /// Number of live (not yet dead) fibers on this loop.
    #[must_use]
    pub fn live_beams(&self) -> usize {
        self.inner.live.lock().len()
    }

    fn is_thread_owner(&self) -> bool {
        installed_loop().is_some_and(|l| l.id() == self.id())
    }

    /// Drives the tick loop until `pred` returns true.
    ///
    /// May only be called from this loop's own thread, outside any fiber.
    pub fn run_until(&self, mut pred: impl FnMut() -> bool) -> Result<(), Error> {
        if current_beam().is_some() {
            return Err(Error::scheduler("run_until may not be called from a beam"));
        }
        if !self.is_thread_owner() {
            return Err(Error::cross_thread("event loop driven from a foreign thread"));
        }
        loop {
            if pred() {
                return Ok(());
            }
            self.tick()?;
        }
    }

    /// Parks the calling context on `park` until its waiter is woken.
    ///
    /// From a fiber this suspends it and returns the scheduler's resume
    /// payload; from the loop's own thread it drives the tick loop inline.
    /// A pending injected error short-circuits before parking.
    pub(crate) fn wait(&self, park: &dyn Park) -> Result<(), Error> {
        match current_beam() {
            Some(core) => self.wait_beam(&core, park),
            None => self.wait_root(park),
        }
    }

    fn wait_beam(&self, core: &Arc<BeamCore>, park: &dyn Park) -> Result<(), Error> {
        if core.scheduler_id != self.id() {
            return Err(Error::cross_thread("beam parked on a foreign event loop"));
        }
        if let Some(err) = core.park.take_injection() {
            return Err(err);
        }
        let waiter = Waiter::for_beam(Arc::clone(core));
        core.park.set_waiter(waiter.clone());
        core.set_state(BeamState::Waiting);
        if let Err(err) = park.start(self, waiter) {
            core.park.clear_waiter();
            core.set_state(BeamState::Running);
            return Err(err);
        }
        let result = core.suspend();
        core.park.clear_waiter();
        result
    }

    fn wait_root(&self, park: &dyn Park) -> Result<(), Error> {
        if !self.is_thread_owner() {
            return Err(Error::cross_thread("root context parked on a foreign event loop"));
        }
        if let Some(err) = self.inner.root_park.take_injection() {
            return Err(err);
        }
        let cell = Arc::new(RootCell::new());
        let waiter = Waiter::for_root(Arc::clone(&cell));
        self.inner.root_park.set_waiter(waiter.clone());
        if let Err(err) = park.start(self, waiter) {
            self.inner.root_park.clear_waiter();
            return Err(err);
        }
        let result = loop {
            if let Some(payload) = cell.take() {
                break payload;
            }
            if let Err(err) = self.tick() {
                self.inner.root_park.clear_waiter();
                return Err(err);
            }
        };
        self.inner.root_park.clear_waiter();
        result
    }

    /// One scheduler turn for the root context: resumes the fibers that are
    /// queued right now, without touching the selector.
    pub(crate) fn yield_turn(&self) {
        let queued = self.inner.run_queue.len();
        for _ in 0..queued {
            match self.inner.run_queue.pop() {
                Some(core) => self.resume_beam(&core),
                None => break,
            }
        }
    }

    /// One iteration of the tick loop: resume one runnable fiber, or wait
    /// for I/O and timers.
    fn tick(&self) -> Result<(), Error> {
        if let Some(core) = self.inner.run_queue.pop() {
            self.resume_beam(&core);
            return Ok(());
        }

        let now = self.now();
        let timeout = self
            .inner
            .timers
            .lock()
            .peek_deadline()
            .map(|deadline| Duration::from_nanos(deadline.duration_since(now)));

        let ready = self.inner.selector.select(timeout)?;
        for (monitor, interest) in ready {
            monitor.record_readiness(interest);
            let outcome = catch_unwind(AssertUnwindSafe(|| monitor.invoke_callback(interest)));
            if outcome.is_err() {
                tracing::error!(token = ?monitor.token(), "monitor callback panicked; loop continues");
            }
        }

        let now = self.now();
        let expired = self.inner.timers.lock().pop_expired(now);
        for entry in expired {
            let outcome = catch_unwind(AssertUnwindSafe(|| entry.fire()));
            if outcome.is_err() {
                tracing::error!("timer callback panicked; loop continues");
            }
        }
        Ok(())
    }

    fn resume_beam(&self, core: &Arc<BeamCore>) {
        let payload = core.take_pending_resume();
        if core.is_dead() {
            return;
        }
        *self.inner.current.lock() = Some(Arc::clone(core));
        tracing::trace!(beam = %core.id, "resuming beam");
        let yielded = core.run(payload);
        *self.inner.current.lock() = None;
        if yielded == YieldPoint::Completed {
            self.inner.live.lock().remove(&core.id);
        }
    }
}

impl PartialEq for IoLoop {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for IoLoop {}

impl std::fmt::Debug for IoLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoLoop")
            .field("id", &self.inner.id)
            .field("live_beams", &self.live_beams())
            .field("queued", &self.inner.run_queue.len())
            .finish_non_exhaustive()
    }
}
