//! Events emitted by an [`crate::AdaptiveBreaker`] as the controller reacts to load.

use std::time::Instant;
use ward_core::WardEvent;

/// Events an adaptive breaker emits through its configured listeners.
#[derive(Debug, Clone)]
pub enum AdaptiveEvent {
    /// A call was admitted; carries the rejection probability at admission time.
    CallPermitted {
        /// Resource name.
        name: String,
        /// When the call was permitted.
        timestamp: Instant,
        /// The rejection probability in effect when this call was admitted.
        rejection_rate: f64,
    },
    /// A call was probabilistically rejected.
    CallRejected {
        /// Resource name.
        name: String,
        /// When the rejection happened.
        timestamp: Instant,
        /// The rejection probability that caused this rejection.
        rejection_rate: f64,
    },
    /// The controller produced a new rejection probability.
    ControllerTicked {
        /// Resource name.
        name: String,
        /// When the tick happened.
        timestamp: Instant,
        /// The new rejection probability.
        rejection_rate: f64,
        /// The smoothed error rate driving the tick.
        error_rate: f64,
        /// The latency quantile driving the tick.
        latency_p: f64,
    },
    /// A background probe completed.
    ProbeCompleted {
        /// Resource name.
        name: String,
        /// When the probe completed.
        timestamp: Instant,
        /// Whether the probe succeeded.
        success: bool,
    },
}

impl AdaptiveEvent {
    fn name(&self) -> &str {
        match self {
            AdaptiveEvent::CallPermitted { name, .. }
            | AdaptiveEvent::CallRejected { name, .. }
            | AdaptiveEvent::ControllerTicked { name, .. }
            | AdaptiveEvent::ProbeCompleted { name, .. } => name,
        }
    }
}

impl WardEvent for AdaptiveEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AdaptiveEvent::CallPermitted { .. } => "call_permitted",
            AdaptiveEvent::CallRejected { .. } => "call_rejected",
            AdaptiveEvent::ControllerTicked { .. } => "controller_ticked",
            AdaptiveEvent::ProbeCompleted { .. } => "probe_completed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            AdaptiveEvent::CallPermitted { timestamp, .. }
            | AdaptiveEvent::CallRejected { timestamp, .. }
            | AdaptiveEvent::ControllerTicked { timestamp, .. }
            | AdaptiveEvent::ProbeCompleted { timestamp, .. } => *timestamp,
        }
    }

    fn resource_name(&self) -> &str {
        self.name()
    }
}
