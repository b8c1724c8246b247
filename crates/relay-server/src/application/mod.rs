//! Application layer for the relay.
//!
//! # Sub-modules
//!
//! - **`dispatch`** – The dispatch loop: wait for readiness, accept new
//!   clients, read from ready clients, broadcast, tear down dead clients.
//!   This is the whole relay; everything else exists to feed it.
//!
//! - **`ports`** – The [`ports::Network`] trait through which the loop
//!   accepts, reads, writes and closes.  Infrastructure provides a real TCP
//!   implementation and an in-memory one for tests.
//!
//! - **`settings`** – Tunables the loop reads (buffer size, initial registry
//!   capacity, what to do when a write fails).
//!
//! - **`stats`** – Counters the loop maintains while it runs.

pub mod dispatch;
pub mod ports;
pub mod settings;
pub mod stats;

pub use dispatch::{DispatchError, Relay};
pub use ports::{Accepted, Network};
pub use settings::{DeliveryPolicy, RelaySettings};
pub use stats::RelayStats;
