//! Error types for the adaptive breaker.

use thiserror::Error;

/// Errors an [`crate::AdaptiveBreaker`] can raise.
#[derive(Debug, Clone, Error)]
pub enum AdaptiveError<E> {
    /// The controller's rejection probability rejected this call.
    #[error("adaptive circuit rejected the call")]
    Rejected,
    /// The wrapped call itself failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> AdaptiveError<E> {
    /// `true` for [`AdaptiveError::Rejected`].
    pub fn is_rejected(&self) -> bool {
        matches!(self, AdaptiveError::Rejected)
    }

    /// Unwraps the inner application error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            AdaptiveError::Inner(e) => Some(e),
            AdaptiveError::Rejected => None,
        }
    }
}

impl<E> From<E> for AdaptiveError<E> {
    fn from(e: E) -> Self {
        AdaptiveError::Inner(e)
    }
}
