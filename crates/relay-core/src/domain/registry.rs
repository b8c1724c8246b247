//! The connection registry: every endpoint the relay is watching.
//!
//! # Layout
//!
//! ```text
//!  index:   0          1          2          3        capacity-1
//!         ┌──────────┬──────────┬──────────┬────────┬─ ─ ─ ─ ─┐
//!         │ listener │ client a │ client b │ client c│  (free)  │
//!         └──────────┴──────────┴──────────┴────────┴─ ─ ─ ─ ─┘
//!          pinned     unordered after the first removal
//! ```
//!
//! - The listening endpoint is pushed at construction and lives at
//!   [`LISTENER_INDEX`] forever.  [`ConnectionRegistry::remove_at`] refuses to
//!   touch it.
//! - Clients are appended.  When the occupied count reaches the capacity the
//!   capacity doubles before the append, and never shrinks.
//! - Removal is *swap-and-pop*: the last endpoint is moved into the hole and
//!   the occupied count shrinks by one.  This is O(1) but it means that the
//!   endpoint now sitting at the removed index has not been looked at yet by
//!   a caller that was walking the registry front to back.
//!
//! # Walking while removing (for beginners)
//!
//! A `for ep in registry.iter()` loop borrows the registry, so it cannot call
//! `remove_at` in its body.  The dispatch loop therefore walks with a
//! [`PassCursor`]: a plain index that re-reads the occupied count on every
//! step and can be moved back by one after a removal so the swapped-in
//! endpoint is examined in the same pass.
//!
//! ```rust
//! use relay_core::{ConnectionRegistry, PassCursor};
//!
//! let mut registry = ConnectionRegistry::new(3u32);
//! registry.add(4);
//! registry.add(5);
//!
//! let mut visited = Vec::new();
//! let mut cursor = PassCursor::new();
//! while let Some(i) = cursor.next_index(&registry) {
//!     let handle = registry.get(i).unwrap().handle();
//!     visited.push(handle);
//!     if handle == 4 {
//!         registry.remove_at(i).unwrap();
//!         cursor.revisit();
//!     }
//! }
//! assert_eq!(visited, vec![3, 4, 5]);
//! assert_eq!(registry.len(), 2);
//! ```

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::endpoint::Endpoint;
use crate::multiplexer::{MultiplexError, Multiplexer};

/// Capacity of a registry created with [`ConnectionRegistry::new`].
pub const DEFAULT_INITIAL_CAPACITY: usize = 5;

/// Position of the listening endpoint.
pub const LISTENER_INDEX: usize = 0;

/// Errors returned by registry mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The index does not refer to an occupied slot.
    #[error("index {index} is outside the occupied range (len {len})")]
    OutOfRange { index: usize, len: usize },

    /// The caller tried to remove the listening endpoint.
    #[error("the listening endpoint cannot be removed")]
    ListenerRemoval,
}

/// Ordered collection of the listening endpoint and all client endpoints.
///
/// Owned by the dispatch loop; there is no internal locking.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry<H> {
    endpoints: Vec<Endpoint<H>>,
    /// Logical capacity.  Tracked separately from `Vec::capacity` because the
    /// allocator is free to hand out more than was asked for, while the
    /// growth contract (double when full, never otherwise) is observable.
    capacity: usize,
}

impl<H> ConnectionRegistry<H> {
    /// Number of occupied slots, listener included.  Never zero.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Number of client endpoints (everything except the listener).
    pub fn client_count(&self) -> usize {
        self.endpoints.len() - 1
    }

    /// Slots available before the next doubling.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if `index` is the listener's slot.
    pub fn is_listener(&self, index: usize) -> bool {
        index == LISTENER_INDEX
    }

    /// The endpoint at `index`, if occupied.
    pub fn get(&self, index: usize) -> Option<&Endpoint<H>> {
        self.endpoints.get(index)
    }

    /// The listening endpoint.
    pub fn listener(&self) -> &Endpoint<H> {
        &self.endpoints[LISTENER_INDEX]
    }

    /// Every occupied slot with its index, listener first.
    ///
    /// The iterator borrows the registry; use a [`PassCursor`] to walk while
    /// removing.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Endpoint<H>)> + '_ {
        self.endpoints.iter().enumerate()
    }

    /// Every client slot with its index.
    pub fn clients(&self) -> impl Iterator<Item = (usize, &Endpoint<H>)> + '_ {
        self.iter().skip(LISTENER_INDEX + 1)
    }

    /// Removes the endpoint at `index` by moving the last endpoint into its
    /// slot.
    ///
    /// A caller walking the registry by index must examine `index` again
    /// afterwards (see [`PassCursor::revisit`]).
    ///
    /// # Errors
    ///
    /// - [`RegistryError::OutOfRange`] if `index >= len()`.
    /// - [`RegistryError::ListenerRemoval`] if `index` is the listener's slot.
    pub fn remove_at(&mut self, index: usize) -> Result<Endpoint<H>, RegistryError> {
        let len = self.endpoints.len();
        if index >= len {
            return Err(RegistryError::OutOfRange { index, len });
        }
        if index == LISTENER_INDEX {
            return Err(RegistryError::ListenerRemoval);
        }
        Ok(self.endpoints.swap_remove(index))
    }

    /// Hands every occupied endpoint to `multiplexer` and blocks until at
    /// least one of them is ready.
    ///
    /// Readiness left over from the previous wait is cleared first, so after
    /// a successful return only endpoints with current activity have a
    /// non-empty mask.
    ///
    /// # Errors
    ///
    /// Propagates the multiplexer's [`MultiplexError`].
    pub fn wait<M>(&mut self, multiplexer: &mut M) -> Result<usize, MultiplexError>
    where
        M: Multiplexer<H> + ?Sized,
        H: Copy,
    {
        for endpoint in &mut self.endpoints {
            endpoint.clear_readiness();
        }
        multiplexer.wait(&mut self.endpoints)
    }
}

impl<H: Copy + PartialEq + fmt::Debug> ConnectionRegistry<H> {
    /// Creates a registry holding only `listener`, with
    /// [`DEFAULT_INITIAL_CAPACITY`] slots.
    pub fn new(listener: H) -> Self {
        Self::with_capacity(listener, DEFAULT_INITIAL_CAPACITY)
    }

    /// Creates a registry holding only `listener`.
    ///
    /// A requested capacity of zero is raised to one: the listener always
    /// occupies a slot.
    ///
    /// Slots are reserved up front when the allocator can provide them;
    /// otherwise the registry still works and allocates as it grows.
    pub fn with_capacity(listener: H, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut endpoints = Vec::new();
        if endpoints.try_reserve_exact(capacity).is_err() {
            warn!(capacity, "could not reserve connection registry slots");
        }
        endpoints.push(Endpoint::new(listener));
        Self {
            endpoints,
            capacity,
        }
    }

    /// Handle of the listening endpoint.
    pub fn listener_handle(&self) -> H {
        self.listener().handle()
    }

    /// Appends a client endpoint watched for input and returns its index.
    ///
    /// Doubles the capacity first if every slot is occupied.  The handle comes
    /// straight from a successful accept, so it is not checked for validity;
    /// registering the same handle twice is a caller bug.
    pub fn add(&mut self, handle: H) -> usize {
        debug_assert!(
            !self.contains(handle),
            "handle {handle:?} is already registered"
        );

        if self.endpoints.len() == self.capacity {
            self.capacity = self.capacity.saturating_mul(2);
            let additional = self.capacity - self.endpoints.len();
            if self.endpoints.try_reserve_exact(additional).is_err() {
                warn!(capacity = self.capacity, "could not reserve connection registry slots");
            }
            debug!(capacity = self.capacity, "connection registry grew");
        }

        self.endpoints.push(Endpoint::new(handle));
        self.endpoints.len() - 1
    }

    /// Current index of `handle`, if registered.
    pub fn position_of(&self, handle: H) -> Option<usize> {
        self.endpoints.iter().position(|ep| ep.handle() == handle)
    }

    /// Returns `true` if `handle` is registered.
    pub fn contains(&self, handle: H) -> bool {
        self.position_of(handle).is_some()
    }

    /// Snapshot of all occupied handles in registry order.
    pub fn handles(&self) -> Vec<H> {
        self.endpoints.iter().map(Endpoint::handle).collect()
    }
}

/// Index cursor for one front-to-back pass over a registry that may shrink
/// while it is being walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassCursor {
    next: usize,
}

impl PassCursor {
    /// A cursor positioned before index 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next index to examine, or `None` once the pass has covered
    /// the occupied range.
    ///
    /// The occupied count is read on every call, so removals made since the
    /// previous call are taken into account.
    pub fn next_index<H>(&mut self, registry: &ConnectionRegistry<H>) -> Option<usize> {
        if self.next < registry.len() {
            let index = self.next;
            self.next += 1;
            Some(index)
        } else {
            None
        }
    }

    /// Steps back one position so the index just returned by
    /// [`next_index`](Self::next_index) is returned again.
    ///
    /// Call this right after removing the endpoint at that index.
    pub fn revisit(&mut self) {
        self.next = self.next.saturating_sub(1);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::endpoint::Readiness;

    const LISTENER: u32 = 3;

    fn registry_with_clients(clients: &[u32]) -> ConnectionRegistry<u32> {
        let mut registry = ConnectionRegistry::new(LISTENER);
        for &c in clients {
            registry.add(c);
        }
        registry
    }

    /// Marks the endpoints whose handles are in `ready` as readable.
    struct FixedReady {
        ready: Vec<u32>,
        calls: usize,
    }

    impl Multiplexer<u32> for FixedReady {
        fn wait(&mut self, endpoints: &mut [Endpoint<u32>]) -> Result<usize, MultiplexError> {
            self.calls += 1;
            let mut n = 0;
            for ep in endpoints.iter_mut() {
                if self.ready.contains(&ep.handle()) {
                    ep.set_readiness(Readiness::readable());
                    n += 1;
                }
            }
            Ok(n)
        }
    }

    // ── Construction ──────────────────────────────────────────────────────────

    #[test]
    fn test_new_registry_holds_only_listener_at_index_zero() {
        // Arrange / Act
        let registry = ConnectionRegistry::new(LISTENER);

        // Assert
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.client_count(), 0);
        assert_eq!(registry.listener_handle(), LISTENER);
        assert!(registry.is_listener(0));
        assert_eq!(registry.capacity(), DEFAULT_INITIAL_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let registry = ConnectionRegistry::with_capacity(LISTENER, 0);
        assert_eq!(registry.capacity(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unreservable_capacity_does_not_panic() {
        // Arrange / Act: far more slots than any allocator can provide.
        let mut registry = ConnectionRegistry::with_capacity(LISTENER, usize::MAX);
        let index = registry.add(4);

        // Assert
        assert_eq!(registry.capacity(), usize::MAX);
        assert_eq!(index, 1);
        assert_eq!(registry.handles(), vec![LISTENER, 4]);
    }

    // ── add ───────────────────────────────────────────────────────────────────

    #[test]
    fn test_add_appends_and_returns_index() {
        let mut registry = ConnectionRegistry::new(LISTENER);
        assert_eq!(registry.add(4), 1);
        assert_eq!(registry.add(5), 2);
        assert_eq!(registry.handles(), vec![LISTENER, 4, 5]);
    }

    #[test]
    fn test_add_does_not_grow_below_capacity() {
        // Arrange: capacity 5 holds the listener + 4 clients.
        let mut registry = ConnectionRegistry::new(LISTENER);

        // Act
        for h in 4..8 {
            registry.add(h);
        }

        // Assert
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.capacity(), 5);
    }

    #[test]
    fn test_add_doubles_capacity_exactly_when_full() {
        // Arrange: fill to capacity.
        let mut registry = ConnectionRegistry::new(LISTENER);
        for h in 4..8 {
            registry.add(h);
        }

        // Act: the sixth occupant triggers a doubling.
        registry.add(8);

        // Assert
        assert_eq!(registry.capacity(), 10);
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_capacity_never_shrinks_after_removal() {
        let mut registry = registry_with_clients(&[4, 5, 6, 7, 8]);
        assert_eq!(registry.capacity(), 10);
        while registry.client_count() > 0 {
            registry.remove_at(1).unwrap();
        }
        assert_eq!(registry.capacity(), 10);
    }

    #[test]
    fn test_new_client_endpoint_starts_idle() {
        let mut registry = ConnectionRegistry::new(LISTENER);
        let idx = registry.add(4);
        assert!(registry.get(idx).unwrap().readiness().is_empty());
    }

    // ── remove_at ─────────────────────────────────────────────────────────────

    #[test]
    fn test_remove_at_moves_last_into_hole() {
        // Arrange: [L, 4, 5, 6, 7]
        let mut registry = registry_with_clients(&[4, 5, 6, 7]);

        // Act
        let removed = registry.remove_at(1).unwrap();

        // Assert: [L, 7, 5, 6]
        assert_eq!(removed.handle(), 4);
        assert_eq!(registry.handles(), vec![LISTENER, 7, 5, 6]);
    }

    #[test]
    fn test_remove_at_last_index_just_shrinks() {
        let mut registry = registry_with_clients(&[4, 5, 6]);
        registry.remove_at(3).unwrap();
        assert_eq!(registry.handles(), vec![LISTENER, 4, 5]);
    }

    #[test]
    fn test_remove_at_rejects_listener() {
        let mut registry = registry_with_clients(&[4]);
        assert_eq!(registry.remove_at(0), Err(RegistryError::ListenerRemoval));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_at_rejects_out_of_range_index() {
        let mut registry = registry_with_clients(&[4]);
        assert_eq!(
            registry.remove_at(2),
            Err(RegistryError::OutOfRange { index: 2, len: 2 })
        );
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    #[test]
    fn test_position_of_tracks_swaps() {
        let mut registry = registry_with_clients(&[4, 5, 6]);
        registry.remove_at(1).unwrap();
        assert_eq!(registry.position_of(6), Some(1));
        assert_eq!(registry.position_of(4), None);
        assert!(!registry.contains(4));
    }

    #[test]
    fn test_clients_skips_listener() {
        let registry = registry_with_clients(&[4, 5]);
        let handles: Vec<u32> = registry.clients().map(|(_, ep)| ep.handle()).collect();
        assert_eq!(handles, vec![4, 5]);
    }

    #[test]
    fn test_iter_is_restartable() {
        let registry = registry_with_clients(&[4, 5]);
        assert_eq!(registry.iter().count(), 3);
        assert_eq!(registry.iter().count(), 3);
    }

    // ── PassCursor ────────────────────────────────────────────────────────────

    #[test]
    fn test_cursor_visits_every_index_once_without_removal() {
        let registry = registry_with_clients(&[4, 5]);
        let mut cursor = PassCursor::new();
        let mut seen = Vec::new();
        while let Some(i) = cursor.next_index(&registry) {
            seen.push(i);
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn test_cursor_revisit_examines_swapped_in_endpoint() {
        // Arrange: [L, 4, 5, 6]; remove every even handle during the pass.
        let mut registry = registry_with_clients(&[4, 5, 6]);
        let mut cursor = PassCursor::new();
        let mut visited = Vec::new();

        // Act
        while let Some(i) = cursor.next_index(&registry) {
            let h = registry.get(i).unwrap().handle();
            visited.push(h);
            if i != LISTENER_INDEX && h % 2 == 0 {
                registry.remove_at(i).unwrap();
                cursor.revisit();
            }
        }

        // Assert: every handle was seen exactly once.
        visited.sort_unstable();
        assert_eq!(visited, vec![LISTENER, 4, 5, 6]);
        assert_eq!(registry.handles(), vec![LISTENER, 5]);
    }

    #[test]
    fn test_cursor_removing_every_client_terminates() {
        let mut registry = registry_with_clients(&[4, 5, 6, 7]);
        let mut cursor = PassCursor::new();
        let mut steps = 0;
        while let Some(i) = cursor.next_index(&registry) {
            steps += 1;
            if !registry.is_listener(i) {
                registry.remove_at(i).unwrap();
                cursor.revisit();
            }
        }
        assert_eq!(registry.len(), 1);
        assert_eq!(steps, 5);
    }

    // ── wait ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_wait_marks_only_ready_endpoints() {
        let mut registry = registry_with_clients(&[4, 5]);
        let mut mux = FixedReady {
            ready: vec![5],
            calls: 0,
        };

        let n = registry.wait(&mut mux).unwrap();

        assert_eq!(n, 1);
        assert!(registry.get(2).unwrap().readiness().readable);
        assert!(registry.get(1).unwrap().readiness().is_empty());
        assert!(registry.listener().readiness().is_empty());
    }

    #[test]
    fn test_wait_clears_stale_readiness() {
        // Arrange: first wait marks 4, second wait marks nothing.
        let mut registry = registry_with_clients(&[4]);
        let mut mux = FixedReady {
            ready: vec![4],
            calls: 0,
        };
        registry.wait(&mut mux).unwrap();
        mux.ready.clear();

        // Act
        registry.wait(&mut mux).unwrap();

        // Assert
        assert_eq!(mux.calls, 2);
        assert!(registry.get(1).unwrap().readiness().is_empty());
    }

    #[test]
    fn test_registry_error_messages() {
        assert_eq!(
            RegistryError::ListenerRemoval.to_string(),
            "the listening endpoint cannot be removed"
        );
        assert_eq!(
            RegistryError::OutOfRange { index: 9, len: 3 }.to_string(),
            "index 9 is outside the occupied range (len 3)"
        );
    }
}
