//! relay-server library crate.
//!
//! A single-threaded TCP broadcast relay: whatever one client sends is written
//! to every other connected client.  The binary in `main.rs` wires the pieces
//! together; integration tests in `tests/` drive the same module tree.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//!  clients (raw TCP byte streams)
//!         ↕
//! [relay-server]
//!   ├── application/       Dispatch loop, ports, settings, statistics
//!   └── infrastructure/
//!         ├── network/     poll(2) multiplexer, TCP sockets, in-memory mock
//!         └── storage/     TOML config file
//!         ↕
//! [relay-core]             Connection registry, endpoints, Multiplexer trait
//! ```
//!
//! # Layer rules
//!
//! - `application` depends on `relay-core` only.  It talks to sockets through
//!   the [`application::ports::Network`] trait and to the OS wait primitive
//!   through [`relay_core::Multiplexer`].
//! - `infrastructure` implements those traits and may depend on everything.

/// Application layer: the dispatch loop and the traits it is written against.
pub mod application;

/// Infrastructure layer: sockets, poll(2), and configuration storage.
pub mod infrastructure;
