//! Ports: the socket operations the dispatch loop needs.
//!
//! The loop never touches `TcpStream` directly.  It asks a [`Network`] to
//! accept, read, write and close by handle, and the handle is the same opaque
//! value that sits in the connection registry.  This keeps the loop testable
//! against an in-memory network and keeps descriptor ownership in one place.

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// A connection produced by [`Network::accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted<H> {
    /// Handle of the new client endpoint.
    pub handle: H,
    /// Remote address, when the transport knows it.
    pub peer_addr: Option<SocketAddr>,
}

/// Socket operations keyed by endpoint handle.
///
/// Every call is a single bounded operation: the loop only calls `accept`
/// and `read` after the multiplexer reported the endpoint ready, and `write_all`
/// is allowed to block until the bytes are handed to the OS.
pub trait Network {
    /// Opaque endpoint handle, e.g. a raw file descriptor.
    type Handle: Copy + Eq + fmt::Debug + fmt::Display;

    /// Handle of the listening endpoint.
    fn listener_handle(&self) -> Self::Handle;

    /// Accepts one pending connection.
    ///
    /// # Errors
    ///
    /// Any error is transient from the loop's point of view: nothing was
    /// actually pending, or the process ran out of descriptors.
    fn accept(&mut self) -> io::Result<Accepted<Self::Handle>>;

    /// Reads up to `buf.len()` bytes.  `Ok(0)` means the peer closed.
    ///
    /// # Errors
    ///
    /// Returns the transport's read error.
    fn read(&mut self, handle: Self::Handle, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes every byte of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns the transport's write error; some bytes may have been sent.
    fn write_all(&mut self, handle: Self::Handle, bytes: &[u8]) -> io::Result<()>;

    /// Closes the client endpoint.  Unknown handles are ignored.
    fn close(&mut self, handle: Self::Handle);
}
