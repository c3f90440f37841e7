//! Configuration for an [`crate::AdaptiveBreaker`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use ward_core::{EventListener, EventListeners, FnListener};
use ward_pid::PidConfig;

use crate::events::AdaptiveEvent;

/// A boxed async probe, invoked by the background prober on every `ping_interval`.
pub type PingProbe = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync>;

/// Configuration for an [`crate::AdaptiveBreaker`], built through
/// [`AdaptiveConfigBuilder`].
pub struct AdaptiveConfig {
    pub(crate) name: String,
    pub(crate) pid: PidConfig,
    pub(crate) latency_quantile: f64,
    pub(crate) initial_alpha: f64,
    pub(crate) smoother_cap: f64,
    pub(crate) ping_interval: Duration,
    pub(crate) ping_probe: Option<PingProbe>,
    pub(crate) event_listeners: EventListeners<AdaptiveEvent>,
}

impl AdaptiveConfig {
    /// Starts a builder with Semian-style defaults.
    pub fn builder() -> AdaptiveConfigBuilder {
        AdaptiveConfigBuilder::new()
    }

    /// The configured resource name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for [`AdaptiveConfig`].
pub struct AdaptiveConfigBuilder {
    name: String,
    pid: PidConfig,
    latency_quantile: f64,
    initial_alpha: f64,
    smoother_cap: f64,
    ping_interval: Duration,
    ping_probe: Option<PingProbe>,
    event_listeners: EventListeners<AdaptiveEvent>,
}

impl AdaptiveConfigBuilder {
    /// Starts a new builder: p99 latency tracking, a 1% target error rate, a 200ms target
    /// latency, and a 10 second ping interval with no probe configured.
    pub fn new() -> Self {
        Self {
            name: "adaptive".to_string(),
            pid: PidConfig::default(),
            latency_quantile: 0.99,
            initial_alpha: 0.3,
            smoother_cap: f64::INFINITY,
            ping_interval: Duration::from_secs(10),
            ping_probe: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the resource name surfaced in events, logs, and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the target error rate the controller drives toward.
    pub fn target_error_rate(mut self, rate: f64) -> Self {
        self.pid.target_error_rate = rate;
        self
    }

    /// Sets the target latency (milliseconds) the controller drives toward.
    pub fn target_latency_ms(mut self, ms: f64) -> Self {
        self.pid.target_latency_ms = ms;
        self
    }

    /// Sets the latency quantile tracked by the P² estimator feeding the controller.
    pub fn latency_quantile(mut self, p: f64) -> Self {
        self.latency_quantile = p;
        self
    }

    /// Sets the proportional gain.
    pub fn kp(mut self, kp: f64) -> Self {
        self.pid.kp = kp;
        self
    }

    /// Sets the integral gain.
    pub fn ki(mut self, ki: f64) -> Self {
        self.pid.ki = ki;
        self
    }

    /// Sets the derivative gain.
    pub fn kd(mut self, kd: f64) -> Self {
        self.pid.kd = kd;
        self
    }

    /// Sets the error smoother's starting learning rate. Must be in `(0, 0.5)`.
    pub fn initial_alpha(mut self, alpha: f64) -> Self {
        self.initial_alpha = alpha;
        self
    }

    /// Outcomes whose latency exceeds this value are dropped from the smoother/quantile
    /// inputs rather than dragging them toward an outlier.
    pub fn smoother_cap(mut self, cap: f64) -> Self {
        self.smoother_cap = cap;
        self
    }

    /// How often the background prober invokes `ping_probe`.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// The probe the background task invokes on every `ping_interval`; its outcome is fed
    /// into the smoother and quantile exactly as a real call's outcome would be.
    pub fn ping_probe<F, Fut>(mut self, probe: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.ping_probe = Some(Arc::new(move || Box::pin(probe())));
        self
    }

    /// Registers a listener called on every controller tick.
    pub fn on_controller_tick<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, f64, f64) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |e: &AdaptiveEvent| {
            if let AdaptiveEvent::ControllerTicked {
                rejection_rate,
                error_rate,
                latency_p,
                ..
            } = e
            {
                f(*rejection_rate, *error_rate, *latency_p);
            }
        }));
        self
    }

    /// Adds a raw listener for any [`AdaptiveEvent`].
    pub fn add_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<AdaptiveEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<AdaptiveConfig, ward_core::WardError<()>> {
        if !(self.initial_alpha > 0.0 && self.initial_alpha < 0.5) {
            return Err(ward_core::WardError::InvalidValue {
                reason: format!("initial_alpha must be in (0, 0.5), got {}", self.initial_alpha),
            });
        }
        if !(self.latency_quantile > 0.0 && self.latency_quantile < 1.0) {
            return Err(ward_core::WardError::InvalidValue {
                reason: format!("latency_quantile must be in (0, 1), got {}", self.latency_quantile),
            });
        }
        if self.ping_interval.is_zero() {
            return Err(ward_core::WardError::InvalidValue {
                reason: "ping_interval must be positive".to_string(),
            });
        }
        Ok(AdaptiveConfig {
            name: self.name,
            pid: self.pid,
            latency_quantile: self.latency_quantile,
            initial_alpha: self.initial_alpha,
            smoother_cap: self.smoother_cap,
            ping_interval: self.ping_interval,
            ping_probe: self.ping_probe,
            event_listeners: self.event_listeners,
        })
    }
}

impl Default for AdaptiveConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_successfully() {
        let cfg = AdaptiveConfig::builder().build().unwrap();
        assert_eq!(cfg.name(), "adaptive");
    }

    #[test]
    fn rejects_out_of_range_alpha() {
        assert!(AdaptiveConfig::builder().initial_alpha(0.5).build().is_err());
    }

    #[test]
    fn rejects_out_of_range_quantile() {
        assert!(AdaptiveConfig::builder().latency_quantile(1.0).build().is_err());
    }

    #[test]
    fn rejects_zero_ping_interval() {
        assert!(AdaptiveConfig::builder()
            .ping_interval(Duration::ZERO)
            .build()
            .is_err());
    }
}
