//! A PID-driven adaptive circuit breaker.
//!
//! Rather than a hard open/closed state, the breaker tracks a smoothed error rate and a
//! latency quantile and feeds both into a discrete PID controller that produces a single
//! rejection probability `r`. Admission draws a uniform random number and admits when it
//! is at least `r` — `r = 0` admits everything, `r = 1` rejects everything, and values in
//! between shed load proportionally to how far the dependency is from its setpoints. A
//! background task periodically invokes a caller-supplied probe so the controller keeps
//! adjusting even while live traffic is being shed.
//!
//! # Example
//!
//! ```
//! use ward_adaptive::{AdaptiveBreaker, AdaptiveConfig};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let breaker = AdaptiveBreaker::new(AdaptiveConfig::builder().build().unwrap());
//! let result: Result<_, ward_adaptive::AdaptiveError<std::convert::Infallible>> =
//!     breaker.acquire(|| async { Ok(42) }).await;
//! assert_eq!(result.unwrap(), 42);
//! breaker.destroy().await;
//! # });
//! ```

pub mod config;
pub mod error;
pub mod events;

pub use config::{AdaptiveConfig, AdaptiveConfigBuilder, PingProbe};
pub use error::AdaptiveError;
pub use events::AdaptiveEvent;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use ward_pid::Pid;
use ward_quantile::P2Estimator;
use ward_smoother::Smoother;

/// A point-in-time snapshot of an adaptive breaker's controller state.
#[derive(Debug, Clone)]
pub struct AdaptiveMetrics {
    /// Current rejection probability in `[0, 1]`.
    pub rejection_rate: f64,
    /// Smoothed error rate.
    pub error_rate: f64,
    /// Tracked latency quantile, in milliseconds.
    pub latency_p: f64,
    /// The last recorded failure's rendered message, if any has been recorded yet.
    pub last_error: Option<String>,
}

struct Controller {
    smoother: Smoother,
    quantile: P2Estimator,
    pid: Pid,
    last_error: Option<String>,
}

/// A PID-driven adaptive breaker.
pub struct AdaptiveBreaker {
    name: String,
    config: Arc<AdaptiveConfig>,
    controller: Mutex<Controller>,
    rejection_bits: AtomicU64,
    stopped: AtomicBool,
    notify: Arc<Notify>,
    prober: Mutex<Option<JoinHandle<()>>>,
}

fn to_bits(v: f64) -> u64 {
    v.to_bits()
}

fn from_bits(b: u64) -> f64 {
    f64::from_bits(b)
}

impl AdaptiveBreaker {
    /// Builds an adaptive breaker from `config`, spawning its background prober task if a
    /// `ping_probe` was configured.
    pub fn new(config: AdaptiveConfig) -> Arc<Self> {
        let name = config.name.clone();
        let smoother = Smoother::builder()
            .cap_value(config.smoother_cap)
            .initial_alpha(config.initial_alpha)
            .build()
            .expect("validated at AdaptiveConfigBuilder::build");
        let quantile =
            P2Estimator::new(config.latency_quantile).expect("validated at AdaptiveConfigBuilder::build");
        let pid = Pid::new(config.pid.clone());

        let breaker = Arc::new(Self {
            name,
            config: Arc::new(config),
            controller: Mutex::new(Controller { smoother, quantile, pid, last_error: None }),
            rejection_bits: AtomicU64::new(to_bits(0.0)),
            stopped: AtomicBool::new(false),
            notify: Arc::new(Notify::new()),
            prober: Mutex::new(None),
        });

        if breaker.config.ping_probe.is_some() {
            let handle = tokio::spawn(Self::run_prober(Arc::clone(&breaker)));
            // Safe: no other task can have observed `breaker` (and thus locked `prober`)
            // before this store, since the task was only just spawned above.
            if let Ok(mut guard) = breaker.prober.try_lock() {
                *guard = Some(handle);
            }
        }

        breaker
    }

    async fn run_prober(breaker: Arc<Self>) {
        let probe = match &breaker.config.ping_probe {
            Some(p) => Arc::clone(p),
            None => return,
        };
        loop {
            let sleep = tokio::time::sleep(breaker.config.ping_interval);
            tokio::select! {
                _ = sleep => {}
                _ = breaker.notify.notified() => {
                    if breaker.stopped.load(Ordering::SeqCst) {
                        return;
                    }
                }
            }
            if breaker.stopped.load(Ordering::SeqCst) {
                return;
            }
            let started = Instant::now();
            let success = probe().await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            let reason = (!success).then(|| format!("{} probe failed", breaker.name));
            breaker.record_outcome(success, latency_ms, reason).await;
            breaker.config.event_listeners.emit(&AdaptiveEvent::ProbeCompleted {
                name: breaker.name.clone(),
                timestamp: Instant::now(),
                success,
            });
        }
    }

    /// The resource name this breaker was configured with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rejection probability as of the last controller tick, readable without
    /// acquiring the controller lock.
    pub fn rejection_rate(&self) -> f64 {
        from_bits(self.rejection_bits.load(Ordering::SeqCst))
    }

    /// A snapshot of the controller's current state.
    pub async fn metrics(&self) -> AdaptiveMetrics {
        let controller = self.controller.lock().await;
        AdaptiveMetrics {
            rejection_rate: self.rejection_rate(),
            error_rate: controller.smoother.forecast(),
            latency_p: controller.quantile.estimate(),
            last_error: controller.last_error.clone(),
        }
    }

    async fn record_outcome(&self, success: bool, latency_ms: f64, reason: Option<String>) {
        let mut controller = self.controller.lock().await;
        if let Some(reason) = reason {
            controller.last_error = Some(reason);
        }
        let _ = controller.smoother.add_observation(if success { 0.0 } else { 1.0 });
        controller.quantile.add_observation(latency_ms);
        let error_rate = controller.smoother.forecast();
        let latency_p = controller.quantile.estimate();
        let r = controller.pid.tick(error_rate, latency_p);
        self.rejection_bits.store(to_bits(r), Ordering::SeqCst);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            resource = %self.name,
            rejection_rate = r,
            error_rate,
            latency_p,
            "adaptive controller tick"
        );
        #[cfg(feature = "metrics")]
        {
            metrics::gauge!("adaptive_rejection_rate", "resource" => self.name.clone()).set(r);
            metrics::gauge!("adaptive_error_rate", "resource" => self.name.clone()).set(error_rate);
            metrics::gauge!("adaptive_latency_p", "resource" => self.name.clone()).set(latency_p);
        }

        self.config.event_listeners.emit(&AdaptiveEvent::ControllerTicked {
            name: self.name.clone(),
            timestamp: Instant::now(),
            rejection_rate: r,
            error_rate,
            latency_p,
        });
    }

    /// Draws an admission decision and, if admitted, runs `f`, feeding its outcome back
    /// into the controller.
    pub async fn acquire<F, Fut, T, E>(&self, f: F) -> Result<T, AdaptiveError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let r = self.rejection_rate();
        let u: f64 = {
            use rand::Rng;
            rand::rng().random::<f64>()
        };
        if u < r {
            #[cfg(feature = "metrics")]
            metrics::counter!("adaptive_calls_rejected_total", "resource" => self.name.clone())
                .increment(1);
            self.config.event_listeners.emit(&AdaptiveEvent::CallRejected {
                name: self.name.clone(),
                timestamp: Instant::now(),
                rejection_rate: r,
            });
            return Err(AdaptiveError::Rejected);
        }

        self.config.event_listeners.emit(&AdaptiveEvent::CallPermitted {
            name: self.name.clone(),
            timestamp: Instant::now(),
            rejection_rate: r,
        });

        let started = Instant::now();
        let result = f().await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let reason = result.as_ref().err().map(ToString::to_string);
        self.record_outcome(result.is_ok(), latency_ms, reason).await;
        result.map_err(AdaptiveError::Inner)
    }

    /// Records a success directly, without drawing an admission decision. Used by callers
    /// (such as a dual breaker) that need to keep this breaker's controller current even
    /// while a sibling breaker is the one deciding admission. The latency input is the
    /// controller's own current quantile estimate, so a passively recorded outcome nudges
    /// the error rate without skewing the latency quantile one way or the other.
    pub async fn mark_success(&self) {
        let latency_p = self.controller.lock().await.quantile.estimate();
        self.record_outcome(true, latency_p, None).await;
    }

    /// Records a failure directly, without drawing an admission decision. See
    /// [`AdaptiveBreaker::mark_success`].
    pub async fn mark_failure(&self) {
        self.mark_failure_with_reason(None).await;
    }

    /// Like [`AdaptiveBreaker::mark_failure`], additionally recording `reason` as this
    /// breaker's `last_error` for callers (such as a dual breaker) that observed the
    /// failure on a sibling breaker and want this one's metrics to reflect it too.
    pub async fn mark_failure_with_reason(&self, reason: Option<String>) {
        let latency_p = self.controller.lock().await.quantile.estimate();
        self.record_outcome(false, latency_p, reason).await;
    }

    /// Stops the background prober (if running) and waits for it to exit. After this
    /// returns, [`AdaptiveBreaker::is_stopped`] is observably `true`.
    pub async fn destroy(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        if let Some(handle) = self.prober.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// `true` once [`AdaptiveBreaker::destroy`] has completed.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resets the controller, smoother, and quantile estimator to their initial state.
    pub async fn reset(&self) {
        let mut controller = self.controller.lock().await;
        controller.smoother.reset();
        controller.quantile.reset();
        controller.pid.reset();
        controller.last_error = None;
        self.rejection_bits.store(to_bits(0.0), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn admits_all_calls_with_no_overshoot() {
        let breaker = AdaptiveBreaker::new(AdaptiveConfig::builder().build().unwrap());
        for _ in 0..20 {
            let r: Result<_, AdaptiveError<std::convert::Infallible>> =
                breaker.acquire(|| async { Ok(()) }).await;
            assert!(r.is_ok());
        }
        breaker.destroy().await;
    }

    #[tokio::test]
    async fn sustained_failures_raise_rejection_rate() {
        let breaker = AdaptiveBreaker::new(
            AdaptiveConfig::builder()
                .target_error_rate(0.01)
                .initial_alpha(0.4)
                .build()
                .unwrap(),
        );
        for _ in 0..50 {
            let _: Result<(), AdaptiveError<&str>> = breaker.acquire(|| async { Err("boom") }).await;
        }
        assert!(breaker.rejection_rate() > 0.0);
        breaker.destroy().await;
    }

    #[tokio::test]
    async fn destroy_stops_the_prober() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let breaker = AdaptiveBreaker::new(
            AdaptiveConfig::builder()
                .ping_interval(Duration::from_millis(5))
                .ping_probe(move || {
                    let c = Arc::clone(&c);
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        true
                    }
                })
                .build()
                .unwrap(),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        breaker.destroy().await;
        assert!(breaker.is_stopped());
        let seen_at_destroy = calls.load(Ordering::SeqCst);
        assert!(seen_at_destroy > 0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen_at_destroy, "prober must not tick after destroy");
    }

    #[tokio::test]
    async fn metrics_reports_current_controller_state() {
        let breaker = AdaptiveBreaker::new(AdaptiveConfig::builder().build().unwrap());
        let _: Result<(), AdaptiveError<std::convert::Infallible>> = breaker.acquire(|| async { Ok(()) }).await;
        let metrics = breaker.metrics().await;
        assert_eq!(metrics.rejection_rate, breaker.rejection_rate());
        breaker.destroy().await;
    }

    #[tokio::test]
    async fn metrics_surface_the_last_counted_failure() {
        let breaker = AdaptiveBreaker::new(AdaptiveConfig::builder().build().unwrap());
        assert!(breaker.metrics().await.last_error.is_none());
        let _: Result<(), AdaptiveError<&str>> = breaker.acquire(|| async { Err("boom") }).await;
        assert_eq!(breaker.metrics().await.last_error.as_deref(), Some("boom"));
        breaker.destroy().await;
    }

    #[tokio::test]
    async fn reset_clears_controller_state() {
        let breaker = AdaptiveBreaker::new(
            AdaptiveConfig::builder().target_error_rate(0.0).build().unwrap(),
        );
        for _ in 0..20 {
            let _: Result<(), AdaptiveError<&str>> = breaker.acquire(|| async { Err("boom") }).await;
        }
        assert!(breaker.rejection_rate() > 0.0);
        breaker.reset().await;
        assert_eq!(breaker.rejection_rate(), 0.0);
        breaker.destroy().await;
    }
}
