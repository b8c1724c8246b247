//! Domain entities for the broadcast relay.
//!
//! This module contains pure bookkeeping with no infrastructure dependencies:
//! nothing in here opens a socket or blocks.  The dispatch loop in the server
//! crate drives these types; the unit tests drive them directly.

/// Watched channels and their readiness masks.
pub mod endpoint;

/// The ordered, swap-and-pop collection of all watched endpoints.
///
/// See [`registry::ConnectionRegistry`] for the main type.
pub mod registry;
