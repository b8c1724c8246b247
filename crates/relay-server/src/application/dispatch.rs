//! The dispatch loop: the relay itself.
//!
//! # One pass
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!   registry.wait(multiplexer)   (the only blocking wait)   │
//!            │                                              │
//!   for each slot i, front to back:                         │
//!     ├─ idle            → skip                             │
//!     ├─ listener ready  → accept → registry.add            │
//!     └─ client ready    → read                             │
//!          ├─ 0 / error  → close, remove_at(i), revisit i   │
//!          └─ n bytes    → write to every other client      │
//!            │                                              │
//!   evict destinations scheduled by DeliveryPolicy::DropPeer│
//!            └──────────────────────────────────────────────┘
//! ```
//!
//! # Why revisit after a removal? (for beginners)
//!
//! Removal is swap-and-pop: the last endpoint moves into the removed slot.
//! If the loop simply moved on to `i + 1`, the endpoint that just landed at
//! `i` would be skipped for this pass even if it had data waiting.  Stepping
//! the cursor back makes the loop look at slot `i` once more.
//!
//! # Blocking behaviour
//!
//! Accept and read are only called on endpoints the multiplexer reported
//! ready, so they return promptly.  Broadcast writes are synchronous: a
//! destination with a full send buffer stalls the whole loop for the length
//! of that one write.  An optional write timeout on the TCP side bounds the
//! stall; a timed-out write is an ordinary delivery failure.

use std::io;

use relay_core::{ConnectionRegistry, Endpoint, MultiplexError, Multiplexer, PassCursor};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::ports::{Accepted, Network};
use super::settings::{DeliveryPolicy, RelaySettings};
use super::stats::RelayStats;

/// Errors that stop the dispatch loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The readiness wait failed; the loop has no way to keep monitoring.
    #[error("dispatch loop aborted: {0}")]
    Wait(#[from] MultiplexError),
}

/// What happened to a client endpoint after it was serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientOutcome {
    Kept,
    Removed,
}

/// The relay's entire state: the registry, the two capabilities it drives,
/// and the scratch buffer reads land in.
///
/// Exactly one thread owns a `Relay`; nothing inside it is shared.
pub struct Relay<M, N: Network> {
    multiplexer: M,
    network: N,
    registry: ConnectionRegistry<N::Handle>,
    settings: RelaySettings,
    stats: RelayStats,
    buffer: Vec<u8>,
    /// Destinations whose write failed this pass under `DropPeer`.
    pending_evictions: Vec<N::Handle>,
}

impl<M, N> Relay<M, N>
where
    N: Network,
    M: Multiplexer<N::Handle>,
{
    /// Creates a relay whose registry holds only the network's listening
    /// endpoint.
    pub fn new(multiplexer: M, network: N, settings: RelaySettings) -> Self {
        let registry =
            ConnectionRegistry::with_capacity(network.listener_handle(), settings.initial_capacity);
        let buffer = vec![0u8; settings.read_buffer_size.max(1)];
        Self {
            multiplexer,
            network,
            registry,
            settings,
            stats: RelayStats::default(),
            buffer,
            pending_evictions: Vec::new(),
        }
    }

    /// Endpoints currently watched, listener first.
    pub fn registry(&self) -> &ConnectionRegistry<N::Handle> {
        &self.registry
    }

    /// Counters accumulated since the relay was created.
    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// The tunables this relay was built with.
    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// The transport the relay accepts, reads and writes through.
    pub fn network(&self) -> &N {
        &self.network
    }

    /// Mutable access to the network, for tests that script an in-memory
    /// transport between passes.
    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    /// Runs passes until the multiplexer fails.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Wait`] when the readiness wait fails.  There is
    /// no other way out of the loop.
    pub fn run(&mut self) -> Result<(), DispatchError> {
        loop {
            self.run_pass()?;
        }
    }

    /// Waits once and services every ready endpoint.
    ///
    /// Returns the number of endpoints the multiplexer reported ready.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Wait`] when the readiness wait fails.
    pub fn run_pass(&mut self) -> Result<usize, DispatchError> {
        let ready = self.registry.wait(&mut self.multiplexer)?;

        let mut cursor = PassCursor::new();
        while let Some(index) = cursor.next_index(&self.registry) {
            let Some(endpoint) = self.registry.get(index) else {
                break;
            };
            if !endpoint.readiness().is_actionable() {
                continue;
            }

            if self.registry.is_listener(index) {
                self.accept_client();
            } else if self.service_client(index) == ClientOutcome::Removed {
                cursor.revisit();
            }
        }

        self.evict_failed_destinations();
        debug!(
            clients = self.registry.client_count(),
            "pass complete: {}", self.stats
        );
        Ok(ready)
    }

    // ── Accept ────────────────────────────────────────────────────────────────

    fn accept_client(&mut self) {
        match self.network.accept() {
            Ok(Accepted { handle, peer_addr }) => {
                self.registry.add(handle);
                self.stats.connections_accepted += 1;
                match peer_addr {
                    Some(addr) => info!("new connection from {addr} on socket {handle}"),
                    None => info!("new connection on socket {handle}"),
                }
            }
            Err(e) => {
                self.stats.accept_failures += 1;
                warn!("accept failed: {e}");
            }
        }
    }

    // ── Read and broadcast ────────────────────────────────────────────────────

    fn service_client(&mut self, index: usize) -> ClientOutcome {
        let Some(sender) = self.registry.get(index).map(Endpoint::handle) else {
            return ClientOutcome::Kept;
        };

        match self.network.read(sender, &mut self.buffer) {
            Ok(0) => {
                info!("socket {sender} hung up");
                self.teardown(index, sender);
                self.stats.clients_disconnected += 1;
                ClientOutcome::Removed
            }
            Ok(n) => {
                self.stats.messages_relayed += 1;
                self.stats.bytes_received += n as u64;
                debug!(
                    "recv from socket {sender}: {}",
                    String::from_utf8_lossy(&self.buffer[..n])
                );
                self.broadcast(sender, n);
                ClientOutcome::Kept
            }
            // Nothing was actually there; a level-triggered wait reports it
            // again next pass if it still matters.
            Err(e) if is_spurious(&e) => ClientOutcome::Kept,
            Err(e) => {
                warn!("recv error on socket {sender}: {e}");
                self.teardown(index, sender);
                self.stats.clients_disconnected += 1;
                ClientOutcome::Removed
            }
        }
    }

    /// Writes the first `len` buffered bytes to every client except `sender`.
    fn broadcast(&mut self, sender: N::Handle, len: usize) {
        let payload = &self.buffer[..len];

        for (_, endpoint) in self.registry.clients() {
            let destination = endpoint.handle();
            if destination == sender {
                continue;
            }

            match self.network.write_all(destination, payload) {
                Ok(()) => self.stats.deliveries_completed += 1,
                Err(e) => {
                    self.stats.deliveries_failed += 1;
                    warn!("send to socket {destination} failed: {e}");
                    if self.settings.delivery_policy == DeliveryPolicy::DropPeer
                        && !self.pending_evictions.contains(&destination)
                    {
                        self.pending_evictions.push(destination);
                    }
                }
            }
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Closes the client at `index` and removes it from the registry.
    fn teardown(&mut self, index: usize, handle: N::Handle) {
        self.network.close(handle);
        if let Err(e) = self.registry.remove_at(index) {
            error!("registry rejected removal of socket {handle} at {index}: {e}");
        }
        // The OS may hand the same descriptor to the next accept; a stale
        // eviction must not hit the new owner.
        self.pending_evictions.retain(|pending| *pending != handle);
    }

    fn evict_failed_destinations(&mut self) {
        for handle in std::mem::take(&mut self.pending_evictions) {
            if let Some(index) = self.registry.position_of(handle) {
                info!("dropping socket {handle} after failed delivery");
                self.teardown(index, handle);
                self.stats.destinations_evicted += 1;
            }
        }
    }
}

fn is_spurious(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
