//! The readiness-multiplexer capability.
//!
//! A [`Multiplexer`] wraps an OS primitive such as `poll(2)`, `epoll(7)` or
//! `kqueue(2)`.  It knows nothing about chat, clients or broadcasting; it is
//! handed a slice of endpoints, blocks until at least one of them is ready,
//! and writes what it saw into each endpoint's readiness mask.
//!
//! Implementations may be edge- or level-triggered, but they must report a
//! hang-up as a condition the caller will act on ([`Readiness::hangup`]).
//!
//! [`Readiness::hangup`]: crate::domain::endpoint::Readiness::hangup

use thiserror::Error;

use crate::domain::endpoint::Endpoint;

/// The wait primitive failed.
///
/// The dispatch loop cannot make progress without a working multiplexer, so
/// this error is fatal to the relay.
#[derive(Debug, Error)]
#[error("readiness wait failed: {source}")]
pub struct MultiplexError {
    #[source]
    source: std::io::Error,
}

impl MultiplexError {
    /// Wraps the underlying OS error.
    pub fn new(source: std::io::Error) -> Self {
        Self { source }
    }

    /// The OS error that made the wait fail.
    pub fn io_error(&self) -> &std::io::Error {
        &self.source
    }
}

impl From<std::io::Error> for MultiplexError {
    fn from(source: std::io::Error) -> Self {
        Self::new(source)
    }
}

/// Blocks until at least one endpoint is ready.
pub trait Multiplexer<H> {
    /// Waits indefinitely for activity on any of `endpoints`.
    ///
    /// On success every endpoint's readiness mask describes its current state
    /// (endpoints with no activity are left empty) and the number of ready
    /// endpoints is returned.
    ///
    /// # Errors
    ///
    /// Returns [`MultiplexError`] if the underlying primitive fails.
    fn wait(&mut self, endpoints: &mut [Endpoint<H>]) -> Result<usize, MultiplexError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_multiplex_error_preserves_io_kind() {
        let err = MultiplexError::from(io::Error::from(io::ErrorKind::InvalidInput));
        assert_eq!(err.io_error().kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_multiplex_error_display_mentions_wait() {
        let err = MultiplexError::new(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.to_string(), "readiness wait failed: boom");
    }
}
