//! Time primitives: sleep and timeout operations.
//!
//! This module provides the deadline-driven suspension points:
//! - [`sleep`] / [`sleep_forever`]: park the current fiber on a timer (or on
//!   nothing at all)
//! - [`timeout`] / [`timeout_with_error`]: guard a blocking region with a
//!   deadline that injects a cancellation error
//!
//! # Example
//!
//! ```ignore
//! use beamio::time::{sleep, timeout};
//! use std::time::Duration;
//!
//! // Park for 100 milliseconds.
//! sleep(Duration::from_millis(100))?;
//!
//! // Guard an operation with a deadline.
//! match timeout(Duration::from_secs(5), || expensive_operation()) {
//!     Ok(result) => println!("completed: {result:?}"),
//!     Err(err) if err.is_timeout() => println!("timed out"),
//!     Err(err) => return Err(err),
//! }
//! ```

mod sleep;
mod timeout;

pub use sleep::{sleep, sleep_forever};
pub(crate) use timeout::timeout_opt;
pub use timeout::{timeout, timeout_with_error};
