//! Error types for the dual breaker.

use thiserror::Error;
use ward_adaptive::AdaptiveError;
use ward_circuitbreaker::CircuitBreakerError;

/// Errors a [`crate::DualBreaker`] can raise, unifying whichever breaker was
/// authoritative for the call.
#[derive(Debug, Clone, Error)]
pub enum DualBreakerError<E> {
    /// The authoritative breaker rejected the call before it ran.
    #[error("dual breaker rejected the call")]
    Rejected,
    /// The wrapped call itself failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> DualBreakerError<E> {
    /// `true` when the call was rejected without running.
    pub fn is_rejected(&self) -> bool {
        matches!(self, DualBreakerError::Rejected)
    }

    /// Unwraps the inner application error, if the call ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            DualBreakerError::Inner(e) => Some(e),
            DualBreakerError::Rejected => None,
        }
    }

    pub(crate) fn from_legacy(err: CircuitBreakerError<E>) -> Self {
        match err {
            CircuitBreakerError::OpenCircuit => DualBreakerError::Rejected,
            CircuitBreakerError::Inner(e) => DualBreakerError::Inner(e),
        }
    }

    pub(crate) fn from_adaptive(err: AdaptiveError<E>) -> Self {
        match err {
            AdaptiveError::Rejected => DualBreakerError::Rejected,
            AdaptiveError::Inner(e) => DualBreakerError::Inner(e),
        }
    }
}
