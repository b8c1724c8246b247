//! Runtime tunables for the dispatch loop.
//!
//! [`RelaySettings`] is a plain struct: the infrastructure layer fills it from
//! the config file and CLI flags, tests build it directly.

use std::fmt;
use std::str::FromStr;

use relay_core::DEFAULT_INITIAL_CAPACITY;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of the per-read buffer.  One read never returns more than this.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 256;

/// What the loop does with a broadcast destination whose write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeliveryPolicy {
    /// Log the failure and keep the destination registered.  A peer that is
    /// really gone is torn down when its own read reports EOF or an error.
    #[default]
    #[serde(rename = "keep")]
    KeepPeer,

    /// Close and unregister the destination at the end of the current pass.
    #[serde(rename = "drop")]
    DropPeer,
}

/// The string did not name a [`DeliveryPolicy`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown delivery-failure policy '{0}' (expected 'keep' or 'drop')")]
pub struct ParsePolicyError(String);

impl FromStr for DeliveryPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::KeepPeer),
            "drop" => Ok(Self::DropPeer),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

impl fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepPeer => f.write_str("keep"),
            Self::DropPeer => f.write_str("drop"),
        }
    }
}

/// Dispatch loop tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Maximum bytes taken from a client per read.  Must be non-zero.
    pub read_buffer_size: usize,
    /// Registry slots reserved up front (listener included).
    pub initial_capacity: usize,
    pub delivery_policy: DeliveryPolicy,
}

impl Default for RelaySettings {
    /// | Field            | Default |
    /// |------------------|---------|
    /// | read_buffer_size | 256     |
    /// | initial_capacity | 5       |
    /// | delivery_policy  | keep    |
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            delivery_policy: DeliveryPolicy::default(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
