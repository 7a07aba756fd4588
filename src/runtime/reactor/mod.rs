//! Readiness multiplexing for the event loop.
//!
//! This module wraps the OS readiness selector and the per-descriptor
//! registration state the scheduler needs:
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Interest`] | Bitset over readable/writable |
//! | [`Monitor`] | Registration for one descriptor: interests, last readiness, closed flag, callback |
//! | [`Token`] | Identifier linking registrations to poller events |
//! | `Selector` | `polling`-backed poller plus the token → monitor map |
//!
//! # Notification flow
//!
//! The scheduler calls `Selector::select` with a timeout derived from the
//! nearest timer deadline. For each monitor that fired, the scheduler
//! records readiness on the monitor and invokes its callback; callbacks are
//! enqueue-only and typically make a parked fiber runnable.
//!
//! # Oneshot re-arm
//!
//! The poller delivers oneshot notifications: after a monitor fires, its
//! registration stays but is disarmed until the next interest update.
//! Watchers re-arm through [`Monitor::add_interests`] before every wait,
//! which also implements the widening-only interest policy.

pub mod interest;
pub mod monitor;
pub(crate) mod selector;

pub use interest::Interest;
pub use monitor::Monitor;
pub(crate) use monitor::MonitorCallback;
pub(crate) use selector::Selector;

/// Token identifying a registered descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub usize);

impl Token {
    /// Creates a new token.
    #[must_use]
    pub const fn new(val: usize) -> Self {
        Self(val)
    }
}
