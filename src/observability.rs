//! Reporting for errors that escape unjoined fibers.
//!
//! An error escaping a fiber that nobody is joining must go *somewhere*
//! without killing the scheduler. This module provides the pluggable sink
//! those errors are reported to. The default sink writes to stderr;
//! [`TracingSink`] routes reports through `tracing` instead, and a
//! supervisor can install its own implementation.

use crate::error::Error;
use crate::types::BeamId;
use parking_lot::RwLock;
use std::sync::Arc;

/// Destination for errors that escape unjoined fibers.
pub trait ErrorSink: Send + Sync {
    /// Called once per dead fiber whose escaped error no joiner was waiting
    /// for. Runs on the fiber's thread; must not park.
    fn report(&self, beam: BeamId, error: &Error);
}

/// Default sink: one line to stderr per escaped error.
#[derive(Debug, Default)]
pub struct StderrSink;

impl ErrorSink for StderrSink {
    fn report(&self, beam: BeamId, error: &Error) {
        eprintln!("beam {beam} terminated with unjoined error: {error}");
    }
}

/// Sink that reports through `tracing` at error level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, beam: BeamId, error: &Error) {
        tracing::error!(beam = %beam, error = %error, "beam terminated with unjoined error");
    }
}

static SINK: RwLock<Option<Arc<dyn ErrorSink>>> = RwLock::new(None);

/// Replaces the process-wide error sink.
pub fn set_error_sink(sink: Arc<dyn ErrorSink>) {
    *SINK.write() = Some(sink);
}

/// Restores the default stderr sink.
pub fn reset_error_sink() {
    *SINK.write() = None;
}

/// Reports an unjoined escaped error through the configured sink.
pub(crate) fn report_unjoined(beam: BeamId, error: &Error) {
    let sink = SINK.read().clone();
    match sink {
        Some(sink) => sink.report(beam, error),
        None => StderrSink.report(beam, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        seen: Mutex<Vec<String>>,
    }

    impl ErrorSink for CapturingSink {
        fn report(&self, beam: BeamId, error: &Error) {
            self.seen.lock().push(format!("{beam}: {error}"));
        }
    }

    #[test]
    fn installed_sink_receives_reports() {
        init_test_logging();
        let sink = Arc::new(CapturingSink::default());
        set_error_sink(Arc::clone(&sink) as Arc<dyn ErrorSink>);

        report_unjoined(crate::types::BeamId::from_raw(3), &Error::cancelled());
        let seen = sink.seen.lock().clone();
        crate::assert_with_log!(seen.len() == 1, "one report captured", 1usize, seen.len());

        reset_error_sink();
        crate::test_complete!("installed_sink_receives_reports");
    }
}
