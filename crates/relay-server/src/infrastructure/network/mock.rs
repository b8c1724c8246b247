//! In-memory network for testing the dispatch loop without sockets.
//!
//! [`MockNetwork`] implements [`Network`] over scripted peers.  Tests queue
//! incoming connections, push bytes a peer "sent", make reads or writes fail,
//! and inspect everything the relay wrote to each peer.
//!
//! [`MockNetwork::multiplexer`] returns a [`MockMultiplexer`] that shares the
//! same state and reports readiness the way a level-triggered `poll(2)` would:
//! the listener is readable while connections are queued, a peer is readable
//! while it has unread bytes, hung up once it closed, and in error once its
//! reads are set to fail.  When nothing at all is ready it returns an error
//! instead of blocking, which ends [`Relay::run`] in tests.
//!
//! Handles are small integers starting at 3, like descriptors in a fresh
//! process (the listener gets 3, the first client 4, and so on).
//!
//! [`Relay::run`]: crate::application::Relay::run

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use relay_core::{Endpoint, MultiplexError, Multiplexer, Readiness};

use crate::application::ports::{Accepted, Network};

const LISTENER_HANDLE: u32 = 3;

#[derive(Debug, Default)]
struct MockPeer {
    addr: Option<SocketAddr>,
    inbound: VecDeque<u8>,
    eof: bool,
    read_error: Option<io::ErrorKind>,
    write_error: Option<io::ErrorKind>,
    received: Vec<u8>,
    closed: bool,
}

#[derive(Debug)]
struct MockState {
    next_handle: u32,
    pending: VecDeque<Result<SocketAddr, io::ErrorKind>>,
    peers: BTreeMap<u32, MockPeer>,
    wait_calls: usize,
}

impl MockState {
    fn readiness_of(&self, handle: u32) -> Readiness {
        if handle == LISTENER_HANDLE {
            return if self.pending.is_empty() {
                Readiness::EMPTY
            } else {
                Readiness::readable()
            };
        }
        match self.peers.get(&handle) {
            Some(peer) if !peer.closed => Readiness {
                readable: !peer.inbound.is_empty(),
                hangup: peer.eof && peer.inbound.is_empty(),
                error: peer.read_error.is_some(),
                invalid: false,
            },
            _ => Readiness {
                invalid: true,
                ..Readiness::EMPTY
            },
        }
    }
}

/// Scripted, in-memory implementation of [`Network`].
#[derive(Debug, Clone)]
pub struct MockNetwork {
    state: Rc<RefCell<MockState>>,
}

impl MockNetwork {
    /// Creates a network with a listener and no peers.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState {
                next_handle: LISTENER_HANDLE + 1,
                pending: VecDeque::new(),
                peers: BTreeMap::new(),
                wait_calls: 0,
            })),
        }
    }

    /// A multiplexer that reports readiness from this network's state.
    pub fn multiplexer(&self) -> MockMultiplexer {
        MockMultiplexer {
            state: Rc::clone(&self.state),
        }
    }

    /// Queues a connection from `addr` and returns the handle the next
    /// successful accept will produce for it.
    pub fn queue_connection(&mut self, addr: SocketAddr) -> u32 {
        let mut state = self.state.borrow_mut();
        let handle = state.next_handle + queued_successes(&state.pending);
        state.pending.push_back(Ok(addr));
        handle
    }

    /// Makes one future accept fail with `kind`.
    pub fn queue_accept_error(&mut self, kind: io::ErrorKind) {
        self.state.borrow_mut().pending.push_back(Err(kind));
    }

    /// Appends bytes the peer `handle` has sent to the relay.
    pub fn push_inbound(&mut self, handle: u32, bytes: &[u8]) {
        self.with_peer(handle, |peer| peer.inbound.extend(bytes.iter().copied()));
    }

    /// The peer performs an orderly shutdown: reads return 0 once its
    /// inbound bytes are drained.
    pub fn hang_up(&mut self, handle: u32) {
        self.with_peer(handle, |peer| peer.eof = true);
    }

    /// Every future read on `handle` fails with `kind`.
    pub fn fail_reads(&mut self, handle: u32, kind: io::ErrorKind) {
        self.with_peer(handle, |peer| peer.read_error = Some(kind));
    }

    /// Every future write to `handle` fails with `kind`.
    pub fn fail_writes(&mut self, handle: u32, kind: io::ErrorKind) {
        self.with_peer(handle, |peer| peer.write_error = Some(kind));
    }

    /// Everything the relay has written to `handle`.
    pub fn received(&self, handle: u32) -> Vec<u8> {
        self.state
            .borrow()
            .peers
            .get(&handle)
            .map(|peer| peer.received.clone())
            .unwrap_or_default()
    }

    /// Returns `true` once the relay closed `handle`.
    pub fn is_closed(&self, handle: u32) -> bool {
        self.state
            .borrow()
            .peers
            .get(&handle)
            .is_some_and(|peer| peer.closed)
    }

    /// Remote address recorded for `handle`.
    pub fn peer_addr(&self, handle: u32) -> Option<SocketAddr> {
        self.state.borrow().peers.get(&handle).and_then(|peer| peer.addr)
    }

    /// How many times the paired multiplexer has been waited on.
    pub fn wait_calls(&self) -> usize {
        self.state.borrow().wait_calls
    }

    fn with_peer(&mut self, handle: u32, f: impl FnOnce(&mut MockPeer)) {
        let mut state = self.state.borrow_mut();
        match state.peers.get_mut(&handle) {
            Some(peer) => f(peer),
            None => panic!("MockNetwork: unknown peer handle {handle}; accept it first"),
        }
    }
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

fn queued_successes(pending: &VecDeque<Result<SocketAddr, io::ErrorKind>>) -> u32 {
    pending.iter().filter(|p| p.is_ok()).count() as u32
}

impl Network for MockNetwork {
    type Handle = u32;

    fn listener_handle(&self) -> u32 {
        LISTENER_HANDLE
    }

    fn accept(&mut self) -> io::Result<Accepted<u32>> {
        let mut state = self.state.borrow_mut();
        match state.pending.pop_front() {
            Some(Ok(addr)) => {
                let handle = state.next_handle;
                state.next_handle += 1;
                state.peers.insert(
                    handle,
                    MockPeer {
                        addr: Some(addr),
                        ..MockPeer::default()
                    },
                );
                Ok(Accepted {
                    handle,
                    peer_addr: Some(addr),
                })
            }
            Some(Err(kind)) => Err(io::Error::from(kind)),
            None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }

    fn read(&mut self, handle: u32, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        let peer = match state.peers.get_mut(&handle) {
            Some(peer) if !peer.closed => peer,
            _ => return Err(io::Error::from(io::ErrorKind::NotConnected)),
        };

        if !peer.inbound.is_empty() {
            let n = buf.len().min(peer.inbound.len());
            for (slot, byte) in buf.iter_mut().zip(peer.inbound.drain(..n)) {
                *slot = byte;
            }
            return Ok(n);
        }
        if let Some(kind) = peer.read_error {
            return Err(io::Error::from(kind));
        }
        if peer.eof {
            return Ok(0);
        }
        Err(io::Error::from(io::ErrorKind::WouldBlock))
    }

    fn write_all(&mut self, handle: u32, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        let peer = match state.peers.get_mut(&handle) {
            Some(peer) if !peer.closed => peer,
            _ => return Err(io::Error::from(io::ErrorKind::NotConnected)),
        };
        if let Some(kind) = peer.write_error {
            return Err(io::Error::from(kind));
        }
        peer.received.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self, handle: u32) {
        if let Some(peer) = self.state.borrow_mut().peers.get_mut(&handle) {
            peer.closed = true;
        }
    }
}

/// Level-triggered multiplexer over a [`MockNetwork`]'s state.
#[derive(Debug)]
pub struct MockMultiplexer {
    state: Rc<RefCell<MockState>>,
}

impl Multiplexer<u32> for MockMultiplexer {
    fn wait(&mut self, endpoints: &mut [Endpoint<u32>]) -> Result<usize, MultiplexError> {
        let mut state = self.state.borrow_mut();
        state.wait_calls += 1;

        let mut ready = 0;
        for endpoint in endpoints.iter_mut() {
            let readiness = state.readiness_of(endpoint.handle());
            if readiness.is_actionable() {
                ready += 1;
            }
            endpoint.set_readiness(readiness);
        }

        if ready == 0 {
            // A real wait would block forever here.
            return Err(MultiplexError::new(io::Error::new(
                io::ErrorKind::WouldBlock,
                "mock network is idle",
            )));
        }
        Ok(ready)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_queue_connection_predicts_accepted_handle() {
        let mut net = MockNetwork::new();
        let a = net.queue_connection(addr(1));
        net.queue_accept_error(io::ErrorKind::Other);
        let b = net.queue_connection(addr(2));

        assert_eq!(net.accept().unwrap().handle, a);
        assert!(net.accept().is_err());
        assert_eq!(net.accept().unwrap().handle, b);
        assert_eq!((a, b), (4, 5));
    }

    #[test]
    fn test_read_drains_in_buffer_sized_chunks() {
        let mut net = MockNetwork::new();
        let a = net.queue_connection(addr(1));
        net.accept().unwrap();
        net.push_inbound(a, b"abcdef");

        let mut buf = [0u8; 4];
        assert_eq!(net.read(a, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(net.read(a, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn test_read_after_hang_up_returns_zero() {
        let mut net = MockNetwork::new();
        let a = net.queue_connection(addr(1));
        net.accept().unwrap();
        net.hang_up(a);
        assert_eq!(net.read(a, &mut [0u8; 8]).unwrap(), 0);
    }

    #[test]
    fn test_write_to_closed_peer_fails() {
        let mut net = MockNetwork::new();
        let a = net.queue_connection(addr(1));
        net.accept().unwrap();
        net.close(a);
        assert!(net.write_all(a, b"x").is_err());
        assert!(net.is_closed(a));
    }

    #[test]
    fn test_multiplexer_reports_level_triggered_readiness() {
        // Arrange
        let mut net = MockNetwork::new();
        let a = net.queue_connection(addr(1));
        net.accept().unwrap();
        net.push_inbound(a, b"hi");
        let mut mux = net.multiplexer();
        let mut endpoints = vec![Endpoint::new(3u32), Endpoint::new(a)];

        // Act
        let ready = mux.wait(&mut endpoints).unwrap();

        // Assert: listener idle (nothing queued), client readable.
        assert_eq!(ready, 1);
        assert!(endpoints[0].readiness().is_empty());
        assert!(endpoints[1].readiness().readable);
        assert_eq!(net.wait_calls(), 1);
    }

    #[test]
    fn test_multiplexer_errors_when_idle() {
        let net = MockNetwork::new();
        let mut mux = net.multiplexer();
        let mut endpoints = vec![Endpoint::new(3u32)];
        assert!(mux.wait(&mut endpoints).is_err());
    }
}
