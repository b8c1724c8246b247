//! TCP implementation of the [`Network`] port.
//!
//! [`TcpNetwork`] owns the listening socket and every accepted client stream.
//! Streams are stored by raw descriptor, which is also the handle the
//! connection registry and the `poll(2)` multiplexer use, so a handle always
//! names exactly one open socket.
//!
//! # Blocking modes
//!
//! - The listener is non-blocking.  `poll(2)` can report it readable for a
//!   connection that was reset before `accept` ran; with a non-blocking
//!   listener that case surfaces as `WouldBlock` (a transient accept error)
//!   instead of stalling the loop.
//! - Client streams are blocking.  Reads only happen after `poll(2)` said data
//!   is waiting, so one bounded read returns promptly.  Writes block until the
//!   kernel takes the bytes, or until the optional write timeout expires.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::application::ports::{Accepted, Network};

/// Errors from socket setup.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The listening socket could not be bound.
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The bound socket could not be configured.
    #[error("failed to configure listener on {addr}: {source}")]
    Configure {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Binds a listening TCP socket on `addr`.
///
/// On Unix the standard library enables `SO_REUSEADDR` before binding, so the
/// relay can be restarted immediately on the same port.
///
/// # Errors
///
/// Returns [`NetworkError::BindFailed`] if the address is in use or not
/// available, [`NetworkError::Configure`] if the socket cannot be switched to
/// non-blocking mode.
pub fn bind_listener(addr: SocketAddrV4) -> Result<TcpListener, NetworkError> {
    let addr = SocketAddr::V4(addr);
    let listener =
        TcpListener::bind(addr).map_err(|source| NetworkError::BindFailed { addr, source })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| NetworkError::Configure { addr, source })?;
    Ok(listener)
}

/// Listening socket plus every accepted client stream, keyed by descriptor.
#[derive(Debug)]
pub struct TcpNetwork {
    listener: TcpListener,
    peers: HashMap<RawFd, TcpStream>,
    write_timeout: Option<Duration>,
}

impl TcpNetwork {
    /// Binds `addr` and returns a network with no clients.
    ///
    /// # Errors
    ///
    /// See [`bind_listener`].
    pub fn bind(addr: SocketAddrV4, write_timeout: Option<Duration>) -> Result<Self, NetworkError> {
        Ok(Self::from_listener(bind_listener(addr)?, write_timeout))
    }

    /// Wraps an already-bound listener.  The listener should be non-blocking.
    pub fn from_listener(listener: TcpListener, write_timeout: Option<Duration>) -> Self {
        Self {
            listener,
            peers: HashMap::new(),
            write_timeout,
        }
    }

    /// The address the listener is bound to (useful when binding port 0).
    ///
    /// # Errors
    ///
    /// Returns the OS error from `getsockname`.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of open client streams.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn stream(&mut self, handle: RawFd) -> io::Result<&mut TcpStream> {
        self.peers.get_mut(&handle).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotConnected,
                format!("socket {handle} is not an open client"),
            )
        })
    }
}

impl Network for TcpNetwork {
    type Handle = RawFd;

    fn listener_handle(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    fn accept(&mut self) -> io::Result<Accepted<RawFd>> {
        let (stream, peer_addr) = self.listener.accept()?;
        // Accepted sockets may inherit O_NONBLOCK on some platforms.
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(self.write_timeout)?;

        let handle = stream.as_raw_fd();
        self.peers.insert(handle, stream);
        Ok(Accepted {
            handle,
            peer_addr: Some(peer_addr),
        })
    }

    fn read(&mut self, handle: RawFd, buf: &mut [u8]) -> io::Result<usize> {
        self.stream(handle)?.read(buf)
    }

    fn write_all(&mut self, handle: RawFd, bytes: &[u8]) -> io::Result<()> {
        self.stream(handle)?.write_all(bytes)
    }

    fn close(&mut self, handle: RawFd) {
        // Dropping the stream closes the descriptor.
        if self.peers.remove(&handle).is_some() {
            debug!("closed socket {handle}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
