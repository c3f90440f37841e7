//! Common error envelope for ward resiliency patterns.
//!
//! [`WardError`] folds every pattern's error (bulkhead, circuit breaker, adaptive
//! breaker) plus the caller's own application error into one type so a
//! [`ProtectedResource`](https://docs.rs/ward) built from several layers doesn't need
//! hand-written `From` impls at each seam.
//!
//! # Example
//!
//! ```
//! use ward_core::WardError;
//!
//! #[derive(Debug)]
//! enum AppError {
//!     DatabaseDown,
//! }
//!
//! impl std::fmt::Display for AppError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "database down")
//!     }
//! }
//!
//! impl std::error::Error for AppError {}
//!
//! type ServiceError = WardError<AppError>;
//!
//! fn handle(err: ServiceError) {
//!     if err.is_open_circuit() {
//!         eprintln!("dependency is unhealthy, not even trying");
//!     }
//! }
//! ```

use std::fmt;
use std::time::Duration;

/// A common error type folding every ward pattern's failure mode plus the caller's own
/// application error `E`.
#[derive(Debug, Clone)]
pub enum WardError<E> {
    /// The circuit breaker (classic, adaptive, or dual) rejected the call.
    OpenCircuit {
        /// Resource name, if the breaker was configured with one.
        name: Option<String>,
    },

    /// The bulkhead could not grant a ticket within its wait budget.
    ResourceOccupied {
        /// Current number of calls holding a ticket.
        concurrent_calls: usize,
        /// Capacity of the bulkhead.
        max_concurrent: usize,
    },

    /// A breaker/bulkhead/shared-atomic invariant was violated.
    Internal {
        /// Human-readable description of the violated invariant.
        reason: String,
    },

    /// An enum decode, negative smoother input, or out-of-range configuration value.
    InvalidValue {
        /// Human-readable description of the bad value.
        reason: String,
    },

    /// A retry-after hint surfaced by a rate-limited dependency; unused by the core
    /// bulkhead/breaker patterns but kept so adapters can surface it uniformly.
    RetryAfter {
        /// Suggested wait before retrying, if known.
        retry_after: Option<Duration>,
    },

    /// The underlying application call returned an error counted against the breaker.
    Application(E),
}

impl<E> fmt::Display for WardError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WardError::OpenCircuit { name } => match name {
                Some(n) => write!(f, "circuit '{n}' is open"),
                None => write!(f, "circuit is open"),
            },
            WardError::ResourceOccupied {
                concurrent_calls,
                max_concurrent,
            } => write!(f, "resource occupied ({concurrent_calls}/{max_concurrent})"),
            WardError::Internal { reason } => write!(f, "internal error: {reason}"),
            WardError::InvalidValue { reason } => write!(f, "invalid value: {reason}"),
            WardError::RetryAfter { retry_after } => match retry_after {
                Some(d) => write!(f, "retry after {d:?}"),
                None => write!(f, "retry later"),
            },
            WardError::Application(e) => write!(f, "application error: {e}"),
        }
    }
}

impl<E> std::error::Error for WardError<E> where E: std::error::Error {}

impl<E> WardError<E> {
    /// Returns `true` if this is an open-circuit error.
    pub fn is_open_circuit(&self) -> bool {
        matches!(self, WardError::OpenCircuit { .. })
    }

    /// Returns `true` if this is a bulkhead-occupied error.
    pub fn is_resource_occupied(&self) -> bool {
        matches!(self, WardError::ResourceOccupied { .. })
    }

    /// Returns `true` if this is an internal invariant error.
    pub fn is_internal(&self) -> bool {
        matches!(self, WardError::Internal { .. })
    }

    /// Returns `true` if this is an application error.
    pub fn is_application(&self) -> bool {
        matches!(self, WardError::Application(_))
    }

    /// Extracts the application error, if this is an `Application` variant.
    pub fn application_error(self) -> Option<E> {
        match self {
            WardError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Maps the application error using a function.
    ///
    /// ```
    /// use ward_core::WardError;
    ///
    /// let err: WardError<String> = WardError::Application("boom".to_string());
    /// let mapped: WardError<usize> = err.map_application(|s| s.len());
    /// assert_eq!(mapped.application_error(), Some(4));
    /// ```
    pub fn map_application<F, T>(self, f: F) -> WardError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            WardError::OpenCircuit { name } => WardError::OpenCircuit { name },
            WardError::ResourceOccupied {
                concurrent_calls,
                max_concurrent,
            } => WardError::ResourceOccupied {
                concurrent_calls,
                max_concurrent,
            },
            WardError::Internal { reason } => WardError::Internal { reason },
            WardError::InvalidValue { reason } => WardError::InvalidValue { reason },
            WardError::RetryAfter { retry_after } => WardError::RetryAfter { retry_after },
            WardError::Application(e) => WardError::Application(f(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TestError;

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error")
        }
    }

    impl std::error::Error for TestError {}

    const _: () = {
        const fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<WardError<TestError>>();
    };

    #[test]
    fn boxes_as_a_standard_error() {
        let err: WardError<TestError> = WardError::OpenCircuit { name: None };
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
        assert!(boxed.to_string().contains("open"));
    }

    #[test]
    fn application_error_boxes_through() {
        let err: WardError<TestError> = WardError::Application(TestError);
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
        assert!(boxed.to_string().contains("test error"));
    }

    #[test]
    fn predicates_match_their_variant() {
        let occupied: WardError<TestError> = WardError::ResourceOccupied {
            concurrent_calls: 5,
            max_concurrent: 5,
        };
        assert!(occupied.is_resource_occupied());
        assert!(!occupied.is_open_circuit());
    }
}
