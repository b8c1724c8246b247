//! `poll(2)`-backed readiness multiplexer.
//!
//! Every wait builds a fresh `pollfd` array from the registry's endpoints,
//! asks for `POLLIN` on each, and blocks with no timeout.  `poll(2)` is
//! level-triggered: a socket that still has unread bytes (or a peer that
//! hung up) is reported again on the next wait until the relay deals with it.
//!
//! # revents mapping
//!
//! | `revents` flag | [`Readiness`] field |
//! |----------------|---------------------|
//! | `POLLIN`       | `readable`          |
//! | `POLLHUP`      | `hangup`            |
//! | `POLLERR`      | `error`             |
//! | `POLLNVAL`     | `invalid`           |
//!
//! The kernel always reports `POLLHUP`, `POLLERR` and `POLLNVAL`, whether or
//! not they were requested.

use std::os::fd::{BorrowedFd, RawFd};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use relay_core::{Endpoint, MultiplexError, Multiplexer, Readiness};
use tracing::trace;

/// Blocks on `poll(2)` over raw socket descriptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct PollMultiplexer;

impl PollMultiplexer {
    pub fn new() -> Self {
        Self
    }
}

impl Multiplexer<RawFd> for PollMultiplexer {
    fn wait(&mut self, endpoints: &mut [Endpoint<RawFd>]) -> Result<usize, MultiplexError> {
        let mut fds: Vec<PollFd<'_>> = endpoints
            .iter()
            .map(|endpoint| {
                // SAFETY: every handle in the registry is a descriptor owned by
                // the `TcpNetwork` that the dispatch loop holds next to this
                // multiplexer.  Descriptors are only closed between waits, so
                // each one stays open for the duration of this call.
                let fd = unsafe { BorrowedFd::borrow_raw(endpoint.handle()) };
                PollFd::new(fd, PollFlags::POLLIN)
            })
            .collect();

        let ready = loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(n) => break n,
                // A signal arrived before any descriptor became ready.
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(MultiplexError::new(std::io::Error::from(errno))),
            }
        };

        for (endpoint, fd) in endpoints.iter_mut().zip(&fds) {
            let readiness = readiness_from(fd.revents().unwrap_or(PollFlags::empty()));
            if !readiness.is_empty() {
                trace!(fd = endpoint.handle(), %readiness, "descriptor ready");
            }
            endpoint.set_readiness(readiness);
        }

        Ok(usize::try_from(ready).unwrap_or(0))
    }
}

fn readiness_from(revents: PollFlags) -> Readiness {
    Readiness {
        readable: revents.contains(PollFlags::POLLIN),
        hangup: revents.contains(PollFlags::POLLHUP),
        error: revents.contains(PollFlags::POLLERR),
        invalid: revents.contains(PollFlags::POLLNVAL),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
