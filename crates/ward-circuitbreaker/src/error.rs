//! Errors raised by [`crate::CircuitBreaker::call`].

use thiserror::Error;

/// The error returned when a circuit-breaker-wrapped call is rejected or the inner call
/// itself fails.
#[derive(Debug, Error, Clone)]
pub enum CircuitBreakerError<E> {
    /// The breaker is open (or half-open with a probe already in flight) and the call
    /// never ran.
    #[error("circuit breaker is open")]
    OpenCircuit,
    /// The wrapped call ran and returned an error.
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// `true` if the call was rejected without running.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::OpenCircuit)
    }

    /// Unwraps the inner application error, if the call ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            CircuitBreakerError::OpenCircuit => None,
        }
    }
}

impl<E> From<E> for CircuitBreakerError<E> {
    fn from(e: E) -> Self {
        CircuitBreakerError::Inner(e)
    }
}
