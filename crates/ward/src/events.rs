//! Events emitted by a [`crate::resource::ProtectedResource`] itself, distinct from the
//! lower-level bulkhead/breaker events its components already emit through their own
//! `EventListeners`.

use std::time::{Duration, Instant};

use ward_core::WardEvent;

/// An event observed at the `ProtectedResource` composition layer.
#[derive(Debug, Clone)]
pub enum ResourceEvent {
    /// The wrapped call ran and returned successfully.
    Success {
        /// Resource name.
        name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Wall-clock time spent inside the call, including admission waits.
        duration: Duration,
    },
    /// The bulkhead could not grant a ticket within its wait budget.
    Occupied {
        /// Resource name.
        name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Capacity of the bulkhead at the time of rejection.
        max_concurrent_calls: usize,
    },
    /// The breaker rejected the call before it ran.
    CircuitOpen {
        /// Resource name.
        name: String,
        /// When the event occurred.
        timestamp: Instant,
    },
}

impl WardEvent for ResourceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ResourceEvent::Success { .. } => "success",
            ResourceEvent::Occupied { .. } => "occupied",
            ResourceEvent::CircuitOpen { .. } => "circuit_open",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ResourceEvent::Success { timestamp, .. }
            | ResourceEvent::Occupied { timestamp, .. }
            | ResourceEvent::CircuitOpen { timestamp, .. } => *timestamp,
        }
    }

    fn resource_name(&self) -> &str {
        match self {
            ResourceEvent::Success { name, .. }
            | ResourceEvent::Occupied { name, .. }
            | ResourceEvent::CircuitOpen { name, .. } => name,
        }
    }
}
