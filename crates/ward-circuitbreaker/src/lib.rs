//! A classic, sliding-window circuit breaker for protecting calls to a dependency.
//!
//! The breaker counts failures in a rolling window; once `error_threshold` failures land
//! within `error_threshold_timeout`, it opens and fails calls fast for `error_timeout`
//! before admitting a single half-open probe. `success_threshold` consecutive probe
//! successes close it again; any half-open failure reopens it immediately.
//!
//! # Example
//!
//! ```
//! use ward_circuitbreaker::CircuitBreaker;
//! use std::time::Duration;
//!
//! # #[derive(Debug)]
//! # struct DbError;
//! # impl std::fmt::Display for DbError {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "db error") }
//! # }
//! # impl std::error::Error for DbError {}
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config = ward_circuitbreaker::CircuitBreakerConfig::builder()
//!     .name("mysql-primary")
//!     .error_threshold(3)
//!     .error_threshold_timeout(Duration::from_secs(10))
//!     .build()
//!     .unwrap();
//!
//! let breaker = CircuitBreaker::<DbError>::new(config);
//! let result = breaker.call(|| async { Ok::<_, DbError>(42) }).await;
//! assert_eq!(result.unwrap(), 42);
//! # });
//! ```

pub mod circuit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;

pub use circuit::{BreakerState, CircuitMetrics};
pub use classifier::SharedFailureClassifier;
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use circuit::Circuit;

/// A classic circuit breaker wrapping calls whose application error type is `E`.
pub struct CircuitBreaker<E> {
    circuit: Mutex<Circuit>,
    state_atomic: Arc<AtomicU8>,
    config: Arc<CircuitBreakerConfig>,
    classifier: SharedFailureClassifier<E>,
    fallback: Option<Arc<dyn Fn(&CircuitBreakerError<E>) -> Option<E> + Send + Sync>>,
}

impl<E> CircuitBreaker<E>
where
    E: Send + 'static,
{
    /// Builds a breaker from `config`, counting every error as a failure.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_classifier(config, classifier::default_classifier())
    }

    /// Builds a breaker that only counts errors for which `classifier` returns `true`.
    pub fn with_classifier(config: CircuitBreakerConfig, classifier: SharedFailureClassifier<E>) -> Self {
        let state_atomic = Arc::new(AtomicU8::new(BreakerState::Closed as u8));
        let circuit = Circuit::new(Arc::clone(&state_atomic), config.error_threshold_timeout);
        Self {
            circuit: Mutex::new(circuit),
            state_atomic,
            config: Arc::new(config),
            classifier,
            fallback: None,
        }
    }

    /// The resource name this breaker was configured with.
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Current state, read without awaiting the internal lock.
    pub fn state_sync(&self) -> BreakerState {
        BreakerState::from_u8(self.state_atomic.load(Ordering::SeqCst))
    }

    /// Current state.
    pub async fn state(&self) -> BreakerState {
        self.circuit.lock().await.state()
    }

    /// A consistent snapshot of the breaker's counters.
    pub async fn metrics(&self) -> CircuitMetrics {
        self.circuit.lock().await.metrics(Instant::now())
    }

    /// Forces the breaker open, regardless of its failure window.
    pub async fn force_open(&self) {
        let mut c = self.circuit.lock().await;
        c.force_open(&self.config, Instant::now(), &self.config.event_listeners);
    }

    /// Forces the breaker closed, clearing its failure window.
    pub async fn force_closed(&self) {
        let mut c = self.circuit.lock().await;
        c.force_closed(&self.config, Instant::now(), &self.config.event_listeners);
    }

    /// Resets the breaker to closed with an empty failure window.
    pub async fn reset(&self) {
        let mut c = self.circuit.lock().await;
        c.reset(&self.config, Instant::now(), &self.config.event_listeners);
    }

    /// Records a success directly, without going through admission. Used by callers (such
    /// as a dual breaker) that need to keep this breaker's window current even while a
    /// sibling breaker is the one deciding admission.
    pub async fn mark_success(&self) {
        let mut c = self.circuit.lock().await;
        c.record_success(&self.config, Instant::now(), &self.config.event_listeners);
    }

    /// Records a failure directly, without going through admission. See
    /// [`CircuitBreaker::mark_success`].
    pub async fn mark_failure(&self) {
        self.mark_failure_with_reason(None).await;
    }

    /// Like [`CircuitBreaker::mark_failure`], additionally recording `reason` as the
    /// breaker's `last_error` for callers (such as a dual breaker) that observed the
    /// failure on a sibling breaker and want this one's metrics to reflect it too.
    pub async fn mark_failure_with_reason(&self, reason: Option<String>) {
        let mut c = self.circuit.lock().await;
        c.record_failure(&self.config, Instant::now(), &self.config.event_listeners, reason);
    }

    /// Attempts to run `f`, admitting it through the breaker first and recording the
    /// outcome afterward.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let admitted = {
            let mut c = self.circuit.lock().await;
            c.try_acquire(&self.config, Instant::now(), &self.config.event_listeners)
        };
        if !admitted {
            #[cfg(feature = "tracing")]
            tracing::debug!(resource = self.name(), "circuit breaker rejected call");
            #[cfg(feature = "metrics")]
            metrics::counter!("circuitbreaker_calls_rejected_total", "resource" => self.name().to_string())
                .increment(1);
            return Err(CircuitBreakerError::OpenCircuit);
        }

        let result = f().await;
        let mut c = self.circuit.lock().await;
        let now = Instant::now();
        match &result {
            Ok(_) => {
                c.record_success(&self.config, now, &self.config.event_listeners);
                #[cfg(feature = "metrics")]
                metrics::counter!("circuitbreaker_calls_succeeded_total", "resource" => self.name().to_string())
                    .increment(1);
            }
            Err(e) => {
                if (self.classifier)(e) {
                    c.record_failure(&self.config, now, &self.config.event_listeners, Some(e.to_string()));
                } else {
                    c.record_success(&self.config, now, &self.config.event_listeners);
                }
                #[cfg(feature = "metrics")]
                metrics::counter!("circuitbreaker_calls_failed_total", "resource" => self.name().to_string())
                    .increment(1);
            }
        }
        drop(c);
        result.map_err(CircuitBreakerError::Inner)
    }

    /// Registers a fallback invoked when the call is rejected or fails, converting the
    /// [`CircuitBreakerError`] back into an application value `E` (from which the caller
    /// can build their own `Ok` path, e.g. a cached/default response).
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&CircuitBreakerError<E>) -> Option<E> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Like [`CircuitBreaker::call`], but on any error consults the configured fallback;
    /// if the fallback returns `Some`, that value is run back through `f`'s error channel
    /// as a substitute outcome rather than propagating the original error.
    pub async fn call_with_fallback<F, Fut, T>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match self.call(f).await {
            Ok(v) => Ok(v),
            Err(err) => match &self.fallback {
                Some(fb) => match fb(&err) {
                    Some(e) => Err(CircuitBreakerError::Inner(e)),
                    None => Err(err),
                },
                None => Err(err),
            },
        }
    }
}
