//! # relay-core
//!
//! Shared library for the broadcast relay containing the connection registry,
//! the endpoint readiness model, and the readiness-multiplexer capability.
//!
//! This crate has zero dependencies on OS APIs or network sockets.  Handles
//! are opaque type parameters: the server uses raw file descriptors, the tests
//! use plain integers.
//!
//! # Architecture overview (for beginners)
//!
//! The relay is a single-threaded TCP server.  Every connected client sends
//! raw bytes; the relay forwards those bytes to every *other* client.  To do
//! that with one thread it needs to watch many sockets at once and only touch
//! the ones that have something to say.
//!
//! - **`domain`** – The pure data model.  An [`Endpoint`] is one watched
//!   socket (the listening socket or one client).  The
//!   [`ConnectionRegistry`] is the ordered set of all endpoints, with the
//!   listener pinned at index 0 and O(1) swap-and-pop removal.
//!
//! - **`multiplexer`** – The [`Multiplexer`] trait: "block until at least one
//!   of these endpoints is readable or hung up".  The server crate implements
//!   it on top of `poll(2)`; tests implement it with mocks.

pub mod domain;
pub mod multiplexer;

// Re-export the most-used types at the crate root so callers can write
// `relay_core::ConnectionRegistry` instead of the full module path.
pub use domain::endpoint::{Endpoint, Interest, Readiness};
pub use domain::registry::{
    ConnectionRegistry, PassCursor, RegistryError, DEFAULT_INITIAL_CAPACITY, LISTENER_INDEX,
};
pub use multiplexer::{MultiplexError, Multiplexer};
