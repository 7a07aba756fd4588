//! Shared test tooling.
//!
//! Tests log through `tracing` so scheduler traces and test assertions
//! interleave in one captured stream. Fiber threads carry their beam name
//! (`beam-B1`, `beam-B2`, ...), so the subscriber is configured to print
//! thread names — a failed wakeup-order test shows which fiber logged what.
//!
//! # Example
//! ```
//! use beamio::test_utils::init_test_logging;
//!
//! fn my_test() {
//!     init_test_logging();
//!     beamio::test_phase!("my_test");
//!     // test body
//!     beamio::test_complete!("my_test");
//! }
//! ```

use std::sync::Once;

static SUBSCRIBER: Once = Once::new();

/// Installs the trace-level test subscriber. Repeated calls do nothing, so
/// every test can call this unconditionally.
pub fn init_test_logging() {
    SUBSCRIBER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(false)
            .with_thread_names(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Marks the start of a test in the captured log.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(test = %$name, ">>> begin {}", $name);
    };
}

/// Marks a step inside a test.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(step = %$name, "step: {}", $name);
    };
}

/// Marks the end of a test, optionally with result fields.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "<<< end {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "<<< end {}",
            $name
        );
    };
}

/// Logs both operands, then asserts. Timing tests in particular are only
/// diagnosable from the captured values.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(want = ?$expected, got = ?$actual, "check: {}", $msg);
        assert!($cond, "{} (want {:?}, got {:?})", $msg, $expected, $actual);
    };
}
