//! Endpoints: one watched channel plus what the multiplexer last saw on it.
//!
//! # Interest vs. readiness (for beginners)
//!
//! A readiness multiplexer such as `poll(2)` takes two kinds of flags per
//! descriptor:
//!
//! - The **interest** mask says what the caller wants to be woken for.  The
//!   relay only ever cares about "there is something to read", so the
//!   interest is always [`Interest::Readable`].
//! - The **readiness** mask is filled in by the multiplexer on return and
//!   says what actually happened.  A socket whose peer closed the connection
//!   reports a *hang-up* even though the relay never asked for one.
//!
//! The readiness mask is overwritten on every wait cycle, so it always
//! describes the most recent wait.

use std::fmt;

/// What an endpoint is watched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interest {
    /// Wake when the endpoint has pending input (or a pending connection, for
    /// the listening endpoint).
    #[default]
    Readable,
}

/// Conditions observed on an endpoint by the last wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// Input (or an incoming connection) is pending.
    pub readable: bool,
    /// The peer hung up.
    pub hangup: bool,
    /// The descriptor is in an error state.
    pub error: bool,
    /// The descriptor is not open.
    pub invalid: bool,
}

impl Readiness {
    /// No activity.
    pub const EMPTY: Readiness = Readiness {
        readable: false,
        hangup: false,
        error: false,
        invalid: false,
    };

    /// Only the readable condition.
    pub const fn readable() -> Self {
        Readiness {
            readable: true,
            ..Self::EMPTY
        }
    }

    /// Only the hang-up condition.
    pub const fn hangup() -> Self {
        Readiness {
            hangup: true,
            ..Self::EMPTY
        }
    }

    /// Only the error condition.
    pub const fn error() -> Self {
        Readiness {
            error: true,
            ..Self::EMPTY
        }
    }

    /// Returns `true` if nothing was observed.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Returns `true` if the dispatch loop must service this endpoint.
    ///
    /// Readable and hang-up are the conditions the relay waits for.  Error and
    /// invalid-descriptor conditions are included so that a broken socket is
    /// read (and therefore torn down) instead of waking every wait forever.
    pub fn is_actionable(&self) -> bool {
        self.readable || self.hangup || self.error || self.invalid
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("idle");
        }
        let flags = [
            (self.readable, "readable"),
            (self.hangup, "hangup"),
            (self.error, "error"),
            (self.invalid, "invalid"),
        ];
        let mut first = true;
        for (_, name) in flags.iter().filter(|(set, _)| *set) {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}

/// A monitored communication channel.
///
/// `H` is the opaque handle type: a raw file descriptor in the server, a
/// small integer in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint<H> {
    handle: H,
    interest: Interest,
    readiness: Readiness,
}

impl<H: Copy> Endpoint<H> {
    /// Creates an endpoint watched for input, with an empty readiness mask.
    pub fn new(handle: H) -> Self {
        Self {
            handle,
            interest: Interest::Readable,
            readiness: Readiness::EMPTY,
        }
    }

    /// The underlying handle.
    pub fn handle(&self) -> H {
        self.handle
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// What the last wait observed on this endpoint.
    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// Records what the multiplexer observed.  Called by [`Multiplexer`]
    /// implementations only.
    ///
    /// [`Multiplexer`]: crate::multiplexer::Multiplexer
    pub fn set_readiness(&mut self, readiness: Readiness) {
        self.readiness = readiness;
    }

    pub(crate) fn clear_readiness(&mut self) {
        self.readiness = Readiness::EMPTY;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
