//! Network infrastructure for the relay.
//!
//! # Sub-modules
//!
//! - **`tcp`** – The listening socket and accepted client streams, exposed
//!   through the [`Network`](crate::application::ports::Network) port.  Also
//!   home of [`tcp::bind_listener`], the one-time bind-and-listen step.
//!
//! - **`poll`** – The production [`Multiplexer`](relay_core::Multiplexer):
//!   one blocking `poll(2)` call over every registered descriptor.
//!
//! - **`mock`** – An in-memory network and a matching level-triggered
//!   multiplexer, for driving the dispatch loop in tests.

pub mod mock;

#[cfg(unix)]
pub mod poll;

#[cfg(unix)]
pub mod tcp;
