//! Identifier and time types for runtime entities.
//!
//! These types provide type-safe identifiers for schedulers and fibers, and a
//! monotonic [`Time`] used for timer deadlines. Identifiers are plain integers
//! wrapped for type safety; they are never reused within a process.

use core::fmt;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static SCHEDULER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for a scheduler (one event loop per OS thread).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchedulerId(u64);

impl SchedulerId {
    /// Allocates the next process-unique scheduler ID.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(SCHEDULER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for SchedulerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchedulerId({})", self.0)
    }
}

impl fmt::Display for SchedulerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// A unique identifier for a fiber within its scheduler.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeamId(u64);

impl BeamId {
    /// Creates a beam ID from a raw per-scheduler sequence number.
    #[must_use]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for BeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BeamId({})", self.0)
    }
}

impl fmt::Display for BeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// A monotonic timestamp for the runtime.
///
/// Measured in nanoseconds since the owning scheduler was created. Timer
/// deadlines are absolute `Time` values; the scheduler converts them to
/// selector timeouts as needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    /// The zero instant (scheduler epoch).
    pub const ZERO: Self = Self(0);

    /// The maximum representable instant.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a new time from nanoseconds since the epoch.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a new time from milliseconds since the epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a new time from seconds since the epoch.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Returns the time as nanoseconds since the epoch.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time as milliseconds since the epoch (truncated).
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Adds a duration in nanoseconds, saturating on overflow.
    #[must_use]
    pub const fn saturating_add_nanos(self, nanos: u64) -> Self {
        Self(self.0.saturating_add(nanos))
    }

    /// Returns the duration between two times in nanoseconds.
    ///
    /// Returns 0 if `self` is before `earlier`.
    #[must_use]
    pub const fn duration_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        let nanos = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        self.saturating_add_nanos(nanos)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    #[test]
    fn time_unit_conversions_round_down() {
        init_test_logging();
        let t = Time::from_millis(1500);
        crate::assert_with_log!(
            t.as_nanos() == 1_500_000_000,
            "millis convert to nanos",
            1_500_000_000u64,
            t.as_nanos()
        );
        crate::assert_with_log!(t.as_millis() == 1500, "nanos truncate", 1500u64, t.as_millis());
        crate::test_complete!("time_unit_conversions_round_down");
    }

    #[test]
    fn duration_since_saturates_at_zero() {
        init_test_logging();
        let early = Time::from_millis(10);
        let late = Time::from_millis(25);
        crate::assert_with_log!(
            late.duration_since(early) == 15_000_000,
            "forward difference",
            15_000_000u64,
            late.duration_since(early)
        );
        crate::assert_with_log!(
            early.duration_since(late) == 0,
            "backward difference saturates",
            0u64,
            early.duration_since(late)
        );
        crate::test_complete!("duration_since_saturates_at_zero");
    }

    #[test]
    fn add_duration_saturates() {
        init_test_logging();
        let t = Time::MAX + Duration::from_secs(1);
        crate::assert_with_log!(t == Time::MAX, "saturates at MAX", Time::MAX, t);
        crate::test_complete!("add_duration_saturates");
    }

    #[test]
    fn scheduler_ids_are_unique() {
        init_test_logging();
        let a = SchedulerId::next();
        let b = SchedulerId::next();
        crate::assert_with_log!(a != b, "consecutive ids differ", a, b);
        crate::test_complete!("scheduler_ids_are_unique");
    }
}
