//! Events emitted by a [`crate::Bulkhead`] as tickets are granted, rejected, and released.

use std::time::{Duration, Instant};
use ward_core::WardEvent;

/// Events a bulkhead emits through its configured listeners.
#[derive(Debug, Clone)]
pub enum BulkheadEvent {
    /// A ticket was granted.
    CallPermitted {
        /// Resource name.
        name: String,
        /// When the ticket was granted.
        timestamp: Instant,
        /// Concurrent calls holding a ticket immediately after this grant.
        concurrent_calls: usize,
    },
    /// A ticket could not be granted within the wait budget.
    CallRejected {
        /// Resource name.
        name: String,
        /// When the rejection happened.
        timestamp: Instant,
    },
    /// A call that held a ticket finished successfully.
    CallFinished {
        /// Resource name.
        name: String,
        /// When the call finished.
        timestamp: Instant,
        /// How long the call held its ticket.
        duration: Duration,
    },
    /// A call that held a ticket finished with an error.
    CallFailed {
        /// Resource name.
        name: String,
        /// When the call finished.
        timestamp: Instant,
        /// How long the call held its ticket.
        duration: Duration,
    },
}

impl BulkheadEvent {
    fn name(&self) -> &str {
        match self {
            BulkheadEvent::CallPermitted { name, .. }
            | BulkheadEvent::CallRejected { name, .. }
            | BulkheadEvent::CallFinished { name, .. }
            | BulkheadEvent::CallFailed { name, .. } => name,
        }
    }
}

impl WardEvent for BulkheadEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BulkheadEvent::CallPermitted { .. } => "call_permitted",
            BulkheadEvent::CallRejected { .. } => "call_rejected",
            BulkheadEvent::CallFinished { .. } => "call_finished",
            BulkheadEvent::CallFailed { .. } => "call_failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BulkheadEvent::CallPermitted { timestamp, .. }
            | BulkheadEvent::CallRejected { timestamp, .. }
            | BulkheadEvent::CallFinished { timestamp, .. }
            | BulkheadEvent::CallFailed { timestamp, .. } => *timestamp,
        }
    }

    fn resource_name(&self) -> &str {
        self.name()
    }
}
