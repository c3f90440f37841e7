//! Deciding which of the wrapped call's errors should count against the breaker.
//!
//! Mirrors spec's `exceptions` option: by default every `Err` counts as a failure
//! (matching the donor's `DefaultClassifier`), but a caller can supply their own
//! predicate to whitelist only the error kinds that indicate the dependency itself is
//! unhealthy (as opposed to, say, a caller validation error).

use std::sync::Arc;

/// A classifier deciding whether an application error `E` should count as a circuit
/// breaker failure.
pub type SharedFailureClassifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// The default classifier: every error counts as a failure.
pub fn default_classifier<E>() -> SharedFailureClassifier<E>
where
    E: 'static,
{
    Arc::new(|_: &E| true)
}
