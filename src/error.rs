//! Error types and error handling strategy.
//!
//! This module defines the single error type used throughout the runtime.
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Errors that cross the scheduler → fiber boundary are delivered at
//!   suspension points and propagate with `?`
//! - Panics inside fiber entries are isolated and converted to
//!   [`ErrorKind::Panicked`]

use core::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;

use crate::types::BeamId;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Deadlines ===
    /// A timeout guard's deadline expired.
    Timeout,

    // === Watchers ===
    /// The watcher was closed while a fiber was (or would be) parked on it.
    ClosedStream,
    /// A wait was issued on a watcher that was already closed.
    UnexpectedEof,

    // === Scheduling ===
    /// A fiber or watcher was used from a different scheduler's thread.
    CrossThread,
    /// Wrapper carrying an error across the scheduler → joiner boundary.
    Beam,
    /// Scheduler precondition violation (double wait, lost scheduler, ...).
    Scheduler,

    // === Cancellation ===
    /// The fiber was cancelled via [`crate::runtime::Beam::cancel`].
    Cancelled,
    /// The fiber entry function panicked.
    Panicked,

    // === OS ===
    /// Selector or descriptor error from the operating system.
    Io,
}

impl ErrorKind {
    /// A short static description of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ClosedStream => "closed stream",
            Self::UnexpectedEof => "unexpected eof",
            Self::CrossThread => "cross-thread use",
            Self::Beam => "beam error",
            Self::Scheduler => "scheduler error",
            Self::Cancelled => "cancelled",
            Self::Panicked => "panicked",
            Self::Io => "io error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for runtime operations.
///
/// Errors carry an [`ErrorKind`], optional context text, and an optional
/// source chain. Cloning is cheap; sources are shared via `Arc` so an error
/// can be stored on a dead fiber and handed to a later joiner.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    /// Identifies which timeout guard injected this error. A tagged timeout
    /// error is in flight toward its owning guard; the guard strips the tag
    /// before handing the error to its caller.
    token: Option<NonZeroU64>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
            token: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timed_out() -> Self {
        Self::new(ErrorKind::Timeout).with_context("deadline expired")
    }

    /// Creates the sticky error delivered when a watcher is closed under a
    /// parked waiter.
    #[must_use]
    pub fn closed_stream() -> Self {
        Self::new(ErrorKind::ClosedStream).with_context("stream was closed")
    }

    /// Creates the error raised when waiting on an already-closed watcher.
    #[must_use]
    pub fn eof(ctx: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnexpectedEof).with_context(ctx)
    }

    /// Creates a cross-scheduler usage error.
    #[must_use]
    pub fn cross_thread(ctx: impl Into<String>) -> Self {
        Self::new(ErrorKind::CrossThread).with_context(ctx)
    }

    /// Wraps an error that escaped a fiber for delivery to its joiner.
    #[must_use]
    pub fn beam(beam: BeamId, source: Self) -> Self {
        Self::new(ErrorKind::Beam)
            .with_context(format!("beam {beam} terminated with an error"))
            .with_source(source)
    }

    /// Creates a scheduler precondition error.
    #[must_use]
    pub fn scheduler(ctx: impl Into<String>) -> Self {
        Self::new(ErrorKind::Scheduler).with_context(ctx)
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled).with_context("beam cancelled")
    }

    /// Creates an error for a panicked fiber entry.
    #[must_use]
    pub fn panicked(ctx: impl Into<String>) -> Self {
        Self::new(ErrorKind::Panicked).with_context(ctx)
    }

    /// Returns the wrapped runtime error, if this error carries one as its
    /// source (e.g. an [`ErrorKind::Beam`] wrapper from `join`).
    #[must_use]
    pub fn inner(&self) -> Option<&Self> {
        self.source.as_deref().and_then(|s| s.downcast_ref::<Self>())
    }

    /// Tags this error with a timeout-guard token.
    #[must_use]
    pub(crate) fn with_token(mut self, token: NonZeroU64) -> Self {
        self.token = Some(token);
        self
    }

    /// Returns the timeout-guard token, if any.
    #[must_use]
    pub(crate) const fn token(&self) -> Option<NonZeroU64> {
        self.token
    }

    /// Removes the timeout-guard token.
    #[must_use]
    pub(crate) fn strip_token(mut self) -> Self {
        self.token = None;
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(f, "{}: {ctx}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io)
            .with_context(err.to_string())
            .with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    #[test]
    fn display_includes_context() {
        init_test_logging();
        let err = Error::closed_stream();
        let shown = err.to_string();
        crate::assert_with_log!(
            shown == "closed stream: stream was closed",
            "display carries kind and context",
            "closed stream: stream was closed",
            shown
        );
        crate::test_complete!("display_includes_context");
    }

    #[test]
    fn beam_wrapper_exposes_inner() {
        init_test_logging();
        let inner = Error::timed_out();
        let wrapped = Error::beam(crate::types::BeamId::from_raw(7), inner);
        crate::assert_with_log!(
            wrapped.kind() == ErrorKind::Beam,
            "outer kind is Beam",
            ErrorKind::Beam,
            wrapped.kind()
        );
        let unwrapped = wrapped.inner().map(Error::kind);
        crate::assert_with_log!(
            unwrapped == Some(ErrorKind::Timeout),
            "inner error survives wrapping",
            Some(ErrorKind::Timeout),
            unwrapped
        );
        crate::test_complete!("beam_wrapper_exposes_inner");
    }

    #[test]
    fn io_errors_chain_their_source() {
        init_test_logging();
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err = Error::from(io);
        crate::assert_with_log!(err.kind() == ErrorKind::Io, "kind is Io", ErrorKind::Io, err.kind());
        let has_source = std::error::Error::source(&err).is_some();
        crate::assert_with_log!(has_source, "source preserved", true, has_source);
        crate::test_complete!("io_errors_chain_their_source");
    }

    #[test]
    fn token_round_trip() {
        init_test_logging();
        let token = NonZeroU64::new(42).expect("nonzero");
        let err = Error::timed_out().with_token(token);
        crate::assert_with_log!(
            err.token() == Some(token),
            "token is attached",
            Some(token),
            err.token()
        );
        let stripped = err.strip_token();
        crate::assert_with_log!(
            stripped.token().is_none(),
            "token is stripped",
            None::<NonZeroU64>,
            stripped.token()
        );
        crate::test_complete!("token_round_trip");
    }
}
