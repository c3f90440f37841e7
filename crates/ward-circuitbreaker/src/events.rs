//! Events emitted by a [`crate::CircuitBreaker`] as it admits calls and transitions state.

use std::time::Instant;
use ward_core::WardEvent;

use crate::circuit::BreakerState;

/// Events a classic circuit breaker emits through its configured listeners.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The breaker moved from one state to another.
    StateTransition {
        /// Resource name.
        name: String,
        /// When the transition happened.
        timestamp: Instant,
        /// State before the transition.
        from: BreakerState,
        /// State after the transition.
        to: BreakerState,
    },
    /// A call was admitted.
    CallPermitted {
        /// Resource name.
        name: String,
        /// When the call was admitted.
        timestamp: Instant,
        /// State at admission time.
        state: BreakerState,
    },
    /// A call was rejected because the breaker is open (or half-open and already
    /// probing).
    CallRejected {
        /// Resource name.
        name: String,
        /// When the call was rejected.
        timestamp: Instant,
    },
    /// A call succeeded and was recorded against the breaker.
    SuccessRecorded {
        /// Resource name.
        name: String,
        /// When the success was recorded.
        timestamp: Instant,
        /// State at the time of recording.
        state: BreakerState,
    },
    /// A counted failure was recorded against the breaker.
    FailureRecorded {
        /// Resource name.
        name: String,
        /// When the failure was recorded.
        timestamp: Instant,
        /// State at the time of recording.
        state: BreakerState,
    },
}

impl CircuitBreakerEvent {
    fn name(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { name, .. }
            | CircuitBreakerEvent::CallPermitted { name, .. }
            | CircuitBreakerEvent::CallRejected { name, .. }
            | CircuitBreakerEvent::SuccessRecorded { name, .. }
            | CircuitBreakerEvent::FailureRecorded { name, .. } => name,
        }
    }
}

impl WardEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::CallPermitted { .. } => "call_permitted",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::CallPermitted { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. } => *timestamp,
        }
    }

    fn resource_name(&self) -> &str {
        self.name()
    }
}
