//! Counters maintained by the dispatch loop.

use std::fmt;

/// Monotonic counters since the relay started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub connections_accepted: u64,
    pub accept_failures: u64,
    /// Clients torn down because their read returned EOF or an error.
    pub clients_disconnected: u64,
    /// Successful reads, each broadcast once.
    pub messages_relayed: u64,
    pub bytes_received: u64,
    /// Successful per-destination writes.
    pub deliveries_completed: u64,
    pub deliveries_failed: u64,
    /// Destinations closed by [`DeliveryPolicy::DropPeer`].
    ///
    /// [`DeliveryPolicy::DropPeer`]: super::settings::DeliveryPolicy::DropPeer
    pub destinations_evicted: u64,
}

impl fmt::Display for RelayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepted={} accept_failures={} disconnected={} messages={} bytes={} \
             delivered={} delivery_failures={} evicted={}",
            self.connections_accepted,
            self.accept_failures,
            self.clients_disconnected,
            self.messages_relayed,
            self.bytes_received,
            self.deliveries_completed,
            self.deliveries_failed,
            self.destinations_evicted,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stats_are_zero() {
        let stats = RelayStats::default();
        assert_eq!(stats.connections_accepted, 0);
        assert_eq!(stats.deliveries_failed, 0);
    }

    #[test]
    fn test_display_includes_every_counter() {
        let stats = RelayStats {
            connections_accepted: 1,
            accept_failures: 2,
            clients_disconnected: 3,
            messages_relayed: 4,
            bytes_received: 5,
            deliveries_completed: 6,
            deliveries_failed: 7,
            destinations_evicted: 8,
        };
        assert_eq!(
            stats.to_string(),
            "accepted=1 accept_failures=2 disconnected=3 messages=4 bytes=5 \
             delivered=6 delivery_failures=7 evicted=8"
        );
    }
}
