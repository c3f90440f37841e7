//! Composes a bulkhead with an (optional) circuit breaker into one admission, execution,
//! and bookkeeping call.
//!
//! Grounded on the donor's Tower-layer composition (`ServiceBuilder::new().layer(breaker)
//! .layer(bulkhead).service(inner)`), but
//! flattened: a [`ProtectedResource`] owns one bulkhead and one [`BreakerStrategy`]
//! directly and drives both from a single async closure, rather than nesting `tower`
//! layers around an inner `Service`.

use std::future::Future;
use std::time::Instant;

#[cfg(feature = "circuitbreaker")]
use std::time::Duration;

use std::sync::Arc;

use ward_bulkhead::{Bulkhead, BulkheadError};
use ward_core::{EventListener, EventListeners, WardError};

#[cfg(feature = "circuitbreaker")]
use ward_circuitbreaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

#[cfg(feature = "adaptive")]
use ward_adaptive::{AdaptiveBreaker, AdaptiveError};

#[cfg(feature = "dual")]
use ward_dual_breaker::{DualBreaker, DualBreakerError};

use crate::events::ResourceEvent;

/// Internal adapter distinguishing a bulkhead rejection from the caller's own application
/// error, so a breaker's failure classifier (configured against the caller's error type
/// alone) still sees a bulkhead timeout as an always-counted failure without the classifier
/// ever needing to know bulkheads exist.
///
/// Kept private: a caller can't write a classifier closure over `Outcome<A>` directly since
/// the type can't be named outside this crate. Instead, [`BreakerStrategy::classic`] and
/// friends accept an `exceptions: Fn(&A) -> bool` predicate over the caller's own error type
/// and fold it into an `Outcome`-aware classifier here, so a bulkhead rejection still always
/// counts regardless of what `exceptions` says about `A`.
#[derive(Debug, Clone)]
pub enum Outcome<A> {
    BulkheadRejected { max_concurrent_calls: usize },
    Application(A),
}

impl<A> From<BulkheadError> for Outcome<A> {
    fn from(err: BulkheadError) -> Self {
        match err {
            BulkheadError::ResourceOccupied { max_concurrent_calls } => {
                Outcome::BulkheadRejected { max_concurrent_calls }
            }
        }
    }
}

impl<A: std::fmt::Display> std::fmt::Display for Outcome<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::BulkheadRejected { max_concurrent_calls } => {
                write!(f, "bulkhead rejected: {max_concurrent_calls} concurrent calls already running")
            }
            Outcome::Application(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(feature = "circuitbreaker")]
fn classifier_for<A>(
    exceptions: Arc<dyn Fn(&A) -> bool + Send + Sync>,
) -> ward_circuitbreaker::SharedFailureClassifier<Outcome<A>>
where
    A: Send + Sync + 'static,
{
    Arc::new(move |outcome: &Outcome<A>| match outcome {
        Outcome::BulkheadRejected { .. } => true,
        Outcome::Application(e) => exceptions(e),
    })
}

/// Which breaker, if any, gates admission for a [`ProtectedResource`].
pub enum BreakerStrategy<A> {
    /// No breaker; the bulkhead alone gates admission.
    None,
    /// A classic sliding-window breaker.
    #[cfg(feature = "circuitbreaker")]
    Classic(CircuitBreaker<Outcome<A>>),
    /// A PID-driven adaptive breaker.
    #[cfg(feature = "adaptive")]
    Adaptive(Arc<AdaptiveBreaker>),
    /// Both, fanned out with a selector choosing which is authoritative per call.
    #[cfg(feature = "dual")]
    Dual(DualBreaker<Outcome<A>>),
}

#[cfg(feature = "circuitbreaker")]
impl<A> BreakerStrategy<A>
where
    A: Send + Sync + 'static,
{
    /// A classic breaker counting every application error as a failure (plus bulkhead
    /// rejections, which always count).
    pub fn classic(config: CircuitBreakerConfig) -> Self {
        BreakerStrategy::Classic(CircuitBreaker::new(config))
    }

    /// A classic breaker that only counts an application error as a failure when
    /// `exceptions` returns `true` for it — e.g. to trip on a dependency's own errors
    /// (listed in `exceptions`) while letting caller-side validation errors pass through
    /// unclassified. Bulkhead rejections always count, regardless of `exceptions`.
    pub fn classic_with_exceptions(
        config: CircuitBreakerConfig,
        exceptions: impl Fn(&A) -> bool + Send + Sync + 'static,
    ) -> Self {
        BreakerStrategy::Classic(CircuitBreaker::with_classifier(config, classifier_for(Arc::new(exceptions))))
    }
}

#[cfg(feature = "dual")]
impl<A> BreakerStrategy<A>
where
    A: Send + Sync + 'static,
{
    /// A dual breaker whose classic half only counts an application error as a failure
    /// when `exceptions` returns `true` for it. See
    /// [`BreakerStrategy::classic_with_exceptions`].
    pub fn dual_with_exceptions(
        legacy_config: CircuitBreakerConfig,
        adaptive: Arc<AdaptiveBreaker>,
        selector: ward_dual_breaker::Selector,
        exceptions: impl Fn(&A) -> bool + Send + Sync + 'static,
    ) -> Self {
        let legacy = CircuitBreaker::with_classifier(legacy_config, classifier_for(Arc::new(exceptions)));
        BreakerStrategy::Dual(DualBreaker::new(legacy, adaptive, selector))
    }
}

/// A bulkhead and a breaker strategy composed into one admission-controlled resource.
///
/// `acquire` runs the following steps, matching the component contract each piece
/// documents individually: ask the breaker for admission; ask the bulkhead for a ticket
/// (tightened to `half_open_resource_timeout` while a classic breaker is half-open); run
/// the block; report the outcome back to the breaker and release the ticket; on the
/// block's own error, still report success to the breaker (the dependency answered, the
/// caller just didn't like the answer) and re-raise unchanged.
pub struct ProtectedResource<A> {
    name: String,
    bulkhead: Bulkhead,
    strategy: BreakerStrategy<A>,
    #[cfg(feature = "circuitbreaker")]
    half_open_resource_timeout: Option<Duration>,
    event_listeners: EventListeners<ResourceEvent>,
}

impl<A> ProtectedResource<A>
where
    A: Send + std::fmt::Display + 'static,
{
    /// Builds a resource from an already-constructed bulkhead and breaker strategy.
    pub fn new(name: impl Into<String>, bulkhead: Bulkhead, strategy: BreakerStrategy<A>) -> Self {
        Self {
            name: name.into(),
            bulkhead,
            strategy,
            #[cfg(feature = "circuitbreaker")]
            half_open_resource_timeout: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// While a classic breaker is half-open, the bulkhead waits at most this long for a
    /// ticket instead of its normally configured wait budget, so a single slow half-open
    /// probe can't also starve every other waiter's ticket. No-op for `Adaptive`/`Dual`
    /// strategies, which have no half-open concept.
    #[cfg(feature = "circuitbreaker")]
    pub fn half_open_resource_timeout(mut self, timeout: Duration) -> Self {
        self.half_open_resource_timeout = Some(timeout);
        self
    }

    /// Registers a listener for this resource's own composition-level events (as opposed
    /// to the lower-level events its bulkhead/breaker already emit individually).
    pub fn on_event<L>(mut self, listener: L) -> Self
    where
        L: EventListener<ResourceEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// The resource's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn emit(&self, event: ResourceEvent) {
        self.event_listeners.emit(&event);
    }

    /// Runs `f` through the bulkhead and breaker, reporting the outcome back to both.
    pub async fn acquire<F, Fut, T>(&self, f: F) -> Result<T, WardError<A>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, A>>,
    {
        let started = Instant::now();
        let adapted = || async { f().await.map_err(Outcome::Application) };

        let outcome: Result<T, Outcome<A>> = match &self.strategy {
            BreakerStrategy::None => self.bulkhead.acquire(adapted).await,

            #[cfg(feature = "circuitbreaker")]
            BreakerStrategy::Classic(breaker) => {
                let half_open = breaker.state().await == BreakerState::HalfOpen;
                let wait_override = if half_open { self.half_open_resource_timeout } else { None };
                let bulkhead = &self.bulkhead;
                let result = breaker
                    .call(|| async {
                        match wait_override {
                            Some(wait) => bulkhead.acquire_with_wait(Some(wait), adapted).await,
                            None => bulkhead.acquire(adapted).await,
                        }
                    })
                    .await;
                match result {
                    Ok(v) => Ok(v),
                    Err(CircuitBreakerError::OpenCircuit) => {
                        self.emit(ResourceEvent::CircuitOpen {
                            name: self.name.clone(),
                            timestamp: Instant::now(),
                        });
                        return Err(WardError::OpenCircuit { name: Some(self.name.clone()) });
                    }
                    Err(CircuitBreakerError::Inner(outcome)) => Err(outcome),
                }
            }

            #[cfg(feature = "adaptive")]
            BreakerStrategy::Adaptive(breaker) => {
                let result = breaker.acquire(adapted).await;
                match result {
                    Ok(v) => Ok(v),
                    Err(AdaptiveError::Rejected) => {
                        self.emit(ResourceEvent::CircuitOpen {
                            name: self.name.clone(),
                            timestamp: Instant::now(),
                        });
                        return Err(WardError::OpenCircuit { name: Some(self.name.clone()) });
                    }
                    Err(AdaptiveError::Inner(outcome)) => Err(outcome),
                }
            }

            #[cfg(feature = "dual")]
            BreakerStrategy::Dual(breaker) => {
                let result = breaker.acquire(adapted).await;
                match result {
                    Ok(v) => Ok(v),
                    Err(DualBreakerError::Rejected) => {
                        self.emit(ResourceEvent::CircuitOpen {
                            name: self.name.clone(),
                            timestamp: Instant::now(),
                        });
                        return Err(WardError::OpenCircuit { name: Some(self.name.clone()) });
                    }
                    Err(DualBreakerError::Inner(outcome)) => Err(outcome),
                }
            }
        };

        match outcome {
            Ok(v) => {
                self.emit(ResourceEvent::Success {
                    name: self.name.clone(),
                    timestamp: Instant::now(),
                    duration: started.elapsed(),
                });
                Ok(v)
            }
            Err(Outcome::BulkheadRejected { max_concurrent_calls }) => {
                self.emit(ResourceEvent::Occupied {
                    name: self.name.clone(),
                    timestamp: Instant::now(),
                    max_concurrent_calls,
                });
                Err(WardError::ResourceOccupied {
                    concurrent_calls: max_concurrent_calls,
                    max_concurrent: max_concurrent_calls,
                })
            }
            Err(Outcome::Application(e)) => Err(WardError::Application(e)),
        }
    }

    /// Like [`ProtectedResource::acquire`], but converts any library-level error
    /// (`OpenCircuit`, `ResourceOccupied`, ...) or application error into a fallback value
    /// computed by `fallback` rather than propagating it.
    pub async fn acquire_or_fallback<F, Fut, T>(
        &self,
        f: F,
        fallback: impl FnOnce(&WardError<A>) -> T,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, A>>,
    {
        match self.acquire(f).await {
            Ok(v) => v,
            Err(e) => fallback(&e),
        }
    }

    /// Tears down the breaker strategy (stopping the adaptive prober, if any). The
    /// bulkhead itself needs no explicit teardown; its tickets are released as in-flight
    /// calls complete and the semaphore is dropped with the resource.
    pub async fn destroy(&self) {
        match &self.strategy {
            BreakerStrategy::None => {}
            #[cfg(feature = "circuitbreaker")]
            BreakerStrategy::Classic(_) => {}
            #[cfg(feature = "adaptive")]
            BreakerStrategy::Adaptive(breaker) => breaker.destroy().await,
            #[cfg(feature = "dual")]
            BreakerStrategy::Dual(breaker) => breaker.destroy().await,
        }
    }
}
