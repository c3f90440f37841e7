//! A fan-out wrapper holding a classic and an adaptive breaker side by side.
//!
//! Every call's outcome is reported to both breakers so each keeps an independent,
//! up-to-date picture of the dependency — but only one of them, chosen per call by a
//! caller-supplied selector, actually decides admission. Grounded on the donor
//! workspace's `Algorithm` enum, which fans a single call out across `Aimd`/`Vegas`
//! concurrency strategies; here the fan-out is generalized from "pick one variant to run"
//! into "run one variant, but tell both".

pub mod error;

pub use error::DualBreakerError;

use std::future::Future;
use std::sync::Arc;

use ward_adaptive::{AdaptiveBreaker, AdaptiveError, AdaptiveMetrics};
use ward_circuitbreaker::{BreakerState, CircuitBreaker, CircuitBreakerError, CircuitMetrics};

/// Which breaker is authoritative for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// The classic sliding-window breaker decides admission.
    Legacy,
    /// The PID-driven adaptive breaker decides admission.
    Adaptive,
}

/// A selector deciding, per call, which breaker is authoritative. A selector that panics
/// is treated as "use legacy" — selector failures never propagate to the caller.
pub type Selector = Arc<dyn Fn() -> Authority + Send + Sync>;

/// A snapshot of both breakers' state.
#[derive(Debug, Clone)]
pub struct DualMetrics {
    /// Which breaker currently gates admission.
    pub active: Authority,
    /// The classic breaker's metrics.
    pub legacy: CircuitMetrics,
    /// The adaptive breaker's metrics.
    pub adaptive: AdaptiveMetrics,
}

impl DualMetrics {
    /// The authoritative breaker's `last_error`. Both breakers observe every outcome, but
    /// only the one currently gating admission speaks for the pair.
    pub fn last_error(&self) -> Option<&str> {
        match self.active {
            Authority::Legacy => self.legacy.last_error.as_deref(),
            Authority::Adaptive => self.adaptive.last_error.as_deref(),
        }
    }
}

/// Holds a classic and an adaptive breaker; a selector decides which one gates admission
/// for each call, while both always observe the outcome.
pub struct DualBreaker<E> {
    legacy: CircuitBreaker<E>,
    adaptive: Arc<AdaptiveBreaker>,
    selector: Selector,
}

impl<E> DualBreaker<E>
where
    E: Send + 'static,
{
    /// Builds a dual breaker from an already-constructed classic and adaptive breaker,
    /// plus a `selector` deciding authority per call.
    pub fn new(legacy: CircuitBreaker<E>, adaptive: Arc<AdaptiveBreaker>, selector: Selector) -> Self {
        Self { legacy, adaptive, selector }
    }

    /// Builds a dual breaker that is always authoritative on the classic breaker.
    pub fn legacy_only(legacy: CircuitBreaker<E>, adaptive: Arc<AdaptiveBreaker>) -> Self {
        Self::new(legacy, adaptive, Arc::new(|| Authority::Legacy))
    }

    /// Builds a dual breaker that is always authoritative on the adaptive breaker.
    pub fn adaptive_only(legacy: CircuitBreaker<E>, adaptive: Arc<AdaptiveBreaker>) -> Self {
        Self::new(legacy, adaptive, Arc::new(|| Authority::Adaptive))
    }

    fn authority(&self) -> Authority {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (self.selector)()))
            .unwrap_or(Authority::Legacy)
    }

    /// Which breaker is authoritative right now.
    pub fn active(&self) -> Authority {
        self.authority()
    }

    /// A snapshot of both breakers' state, tagged with which one is currently
    /// authoritative.
    pub async fn metrics(&self) -> DualMetrics {
        DualMetrics {
            active: self.authority(),
            legacy: self.legacy.metrics().await,
            adaptive: self.adaptive.metrics().await,
        }
    }

    /// The classic breaker's state, regardless of which breaker is authoritative.
    pub async fn legacy_state(&self) -> BreakerState {
        self.legacy.state().await
    }

    /// Runs `f` through whichever breaker is authoritative for this call, then reports the
    /// outcome to the other breaker as well so its window stays current.
    pub async fn acquire<F, Fut, T>(&self, f: F) -> Result<T, DualBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let authority = self.authority();
        #[cfg(feature = "metrics")]
        metrics::counter!(
            "dual_breaker_calls_total",
            "authority" => format!("{authority:?}")
        )
        .increment(1);

        match authority {
            Authority::Legacy => {
                #[cfg(feature = "tracing")]
                tracing::debug!(resource = self.legacy.name(), "dual breaker routed to legacy breaker");
                let result = self.legacy.call(f).await;
                match &result {
                    Ok(_) => self.adaptive.mark_success().await,
                    Err(CircuitBreakerError::Inner(e)) => {
                        self.adaptive.mark_failure_with_reason(Some(e.to_string())).await
                    }
                    Err(CircuitBreakerError::OpenCircuit) => {}
                }
                result.map_err(DualBreakerError::from_legacy)
            }
            Authority::Adaptive => {
                #[cfg(feature = "tracing")]
                tracing::debug!(resource = self.adaptive.name(), "dual breaker routed to adaptive breaker");
                let result = self.adaptive.acquire(f).await;
                match &result {
                    Ok(_) => self.legacy.mark_success().await,
                    Err(AdaptiveError::Inner(e)) => {
                        self.legacy.mark_failure_with_reason(Some(e.to_string())).await
                    }
                    Err(AdaptiveError::Rejected) => {}
                }
                result.map_err(DualBreakerError::from_adaptive)
            }
        }
    }

    /// Tears down both breakers, stopping the adaptive breaker's background prober.
    pub async fn destroy(&self) {
        self.adaptive.destroy().await;
    }
}
