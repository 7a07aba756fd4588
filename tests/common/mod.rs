#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

pub use beamio::test_utils::init_test_logging;

/// Initialize logging and announce the test phase.
pub fn init_test(name: &str) {
    init_test_logging();
    beamio::test_phase!(name);
}

/// A non-blocking Unix socket pair for readiness fixtures.
pub fn socket_pair() -> (std::os::unix::net::UnixStream, std::os::unix::net::UnixStream) {
    let (a, b) = std::os::unix::net::UnixStream::pair().expect("socket pair");
    a.set_nonblocking(true).expect("nonblocking");
    b.set_nonblocking(true).expect("nonblocking");
    (a, b)
}
