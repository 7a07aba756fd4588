//! Scheduler state and fiber machinery.
//!
//! This module contains the core runtime machinery:
//!
//! - [`ioloop`]: the per-thread event loop (run queue, tick loop, parking)
//! - [`beam`]: fibers — spawn, join, yield, cancellation, error escape
//! - [`timer`]: min-heap of cancelable deadline entries
//! - [`reactor`]: readiness selector and per-descriptor monitors
//! - [`waiter`]: one-shot wake slots and injection bookkeeping
//! - [`builder`]: event-loop configuration
//! - [`yield_now`]: yield points for cooperative multitasking

pub mod beam;
pub mod builder;
pub mod ioloop;
pub mod reactor;
pub mod timer;
pub(crate) mod waiter;
pub mod yield_now;

pub use beam::{spawn, Beam};
pub use builder::IoLoopBuilder;
pub use ioloop::IoLoop;
pub use reactor::{Interest, Monitor, Token};
pub use timer::TimerHandle;
pub use yield_now::yield_now;
