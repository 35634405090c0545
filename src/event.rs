//! Gate event system.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Events emitted by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// An actor without access was handed an invoice.
    PaymentRequested {
        /// Actor public key.
        identity: String,
    },

    /// A payment was confirmed and access granted.
    AccessGranted {
        /// Actor public key.
        identity: String,
        /// Payment that produced the grant.
        payment_hash: String,
        /// End of access; `None` never expires.
        expires_at: Option<DateTime<Utc>>,
    },

    /// Expired grants were evicted.
    ExpiredRemoved {
        /// Number of records removed.
        count: usize,
    },

    /// Stale charge mappings were pruned.
    MappingsPruned {
        /// Number of mappings removed.
        count: usize,
    },
}

/// Channel for receiving gate events.
pub type GateEventsChannel = broadcast::Receiver<GateEvent>;

/// Sender for gate events.
pub type GateEventsSender = broadcast::Sender<GateEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (GateEventsSender, GateEventsChannel) {
    broadcast::channel(256)
}
