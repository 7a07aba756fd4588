//! Event-loop builder.
//!
//! [`IoLoopBuilder`] configures and installs an [`IoLoop`] on the calling
//! thread. [`IoLoop::current`] applies the defaults; use the builder when a
//! thread needs a non-default selector capacity or fiber thread sizing.
//!
//! # Example
//!
//! ```ignore
//! use beamio::IoLoopBuilder;
//!
//! let ioloop = IoLoopBuilder::new()
//!     .events_capacity(256)
//!     .beam_stack_size(256 * 1024)
//!     .thread_name_prefix("worker-beam-")
//!     .install()?;
//! ```

use crate::error::Error;

use super::ioloop::IoLoop;

/// Default capacity of the selector's event buffer.
const DEFAULT_EVENTS_CAPACITY: usize = 1024;

/// Default name prefix for fiber threads.
const DEFAULT_THREAD_NAME_PREFIX: &str = "beam-";

/// Configures an event loop before it is bound to a thread.
#[derive(Debug, Clone)]
pub struct IoLoopBuilder {
    events_capacity: usize,
    beam_stack_size: Option<usize>,
    thread_name_prefix: String,
}

impl Default for IoLoopBuilder {
    fn default() -> Self {
        Self {
            events_capacity: DEFAULT_EVENTS_CAPACITY,
            beam_stack_size: None,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl IoLoopBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity of the selector's event buffer (events beyond it
    /// are delivered on the next tick). Zero falls back to the default.
    #[must_use]
    pub fn events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = capacity;
        self
    }

    /// Sets the stack size for fiber threads. The OS default applies when
    /// unset.
    #[must_use]
    pub fn beam_stack_size(mut self, bytes: usize) -> Self {
        self.beam_stack_size = Some(bytes);
        self
    }

    /// Sets the name prefix for fiber threads; the beam ID is appended.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub(crate) const fn events_capacity_value(&self) -> usize {
        self.events_capacity
    }

    pub(crate) const fn beam_stack_size_value(&self) -> Option<usize> {
        self.beam_stack_size
    }

    pub(crate) fn thread_name_prefix_value(&self) -> &str {
        &self.thread_name_prefix
    }

    /// Creates the loop and binds it to the calling thread.
    ///
    /// Fails with [`crate::ErrorKind::Scheduler`] if the thread already has
    /// a loop, or with [`crate::ErrorKind::Io`] if the OS selector cannot be
    /// created.
    pub fn install(self) -> Result<IoLoop, Error> {
        let ioloop = IoLoop::build(&self)?;
        ioloop.install()?;
        Ok(ioloop)
    }
}
