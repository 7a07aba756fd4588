//! Beamio: a fiber-style cooperative I/O runtime.
//!
//! # Overview
//!
//! Beamio multiplexes blocking-style I/O and timers onto a single event loop
//! per OS thread. User code is written in straight-line, apparently blocking
//! style on fibers ([`Beam`]s); the runtime suspends the calling fiber
//! whenever it would block on I/O, a timer, or an explicit yield, and
//! resumes it when the awaited event fires.
//!
//! # Core Guarantees
//!
//! - **One runner**: at most one fiber per event loop executes at any
//!   instant; there are no data races to reason about inside a loop
//! - **FIFO wakeups**: fibers made runnable in the same tick resume in
//!   callback order, and I/O callbacks fire before timer callbacks, so a
//!   wait that returns readiness means I/O really happened first
//! - **Cooperative cancellation**: timeouts, `close`, and `cancel` all
//!   inject an error that the target raises at its next suspension point —
//!   nothing is force-killed
//! - **Contained failures**: callback panics and unjoined fiber errors are
//!   reported (sink, `tracing`) and never kill the scheduler
//!
//! # Module Structure
//!
//! - [`runtime`]: event loop, fibers, timers, readiness selector
//! - [`watchers`]: descriptor watchers (park until readable/writable)
//! - [`time`]: sleep and timeout primitives
//! - [`error`]: the error taxonomy
//! - [`observability`]: sink for unjoined fiber errors
//! - [`types`]: identifiers and the monotonic [`Time`](types::Time)
//! - [`test_utils`]: tracing-based test tooling
//!
//! # Example
//!
//! ```ignore
//! use beamio::{spawn, time::sleep};
//! use std::time::Duration;
//!
//! let beam = spawn(|| {
//!     sleep(Duration::from_millis(10))?;
//!     Ok::<_, beamio::Error>(42)
//! })?;
//! // Joining from the loop's own thread drives the scheduler.
//! assert_eq!(beam.join()?, 42);
//! ```
//!
//! Unix platforms only: watchers speak raw file descriptors.

#![warn(missing_docs)]

pub mod error;
pub mod observability;
pub mod runtime;
pub mod test_utils;
pub mod time;
pub mod types;
pub mod watchers;

pub use error::{Error, ErrorKind};
pub use runtime::{spawn, yield_now, Beam, Interest, IoLoop, IoLoopBuilder, Monitor};
pub use time::{sleep, sleep_forever, timeout, timeout_with_error};
pub use types::{BeamId, SchedulerId, Time};
pub use watchers::IoWatcher;
