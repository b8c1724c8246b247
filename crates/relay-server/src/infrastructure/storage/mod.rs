//! Storage infrastructure for the relay.
//!
//! # Sub-modules
//!
//! - **`config`** – Reads the TOML configuration file and turns it into the
//!   bind address, write timeout and [`RelaySettings`] the relay starts with.
//!
//! [`RelaySettings`]: crate::application::RelaySettings

pub mod config;
