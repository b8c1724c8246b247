//! Infrastructure layer for the relay.
//!
//! Contains OS-facing adapters: sockets, the `poll(2)` wait, and the TOML
//! configuration file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `relay_core`, but MUST NOT be imported by non-test code in the
//! `application` layer.

pub mod network;
pub mod storage;
