//! Configuration for a classic circuit breaker.

use std::time::Duration;

use ward_core::{EventListener, EventListeners, FnListener};

use crate::circuit::BreakerState;
use crate::events::CircuitBreakerEvent;

/// Configuration for a classic circuit breaker, built through [`CircuitBreakerConfigBuilder`].
pub struct CircuitBreakerConfig {
    pub(crate) error_threshold: usize,
    pub(crate) error_threshold_timeout: Duration,
    pub(crate) success_threshold: usize,
    pub(crate) error_timeout: Duration,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfig {
    /// Starts a builder with Semian-style defaults: 3 failures within 10 seconds opens
    /// the breaker, 2 consecutive half-open successes close it, and the breaker waits 5
    /// seconds before probing again.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// A conservative preset: opens quickly, recovers slowly. Appropriate for a
    /// dependency with a small blast radius and a history of flapping.
    pub fn fast_fail() -> CircuitBreakerConfig {
        CircuitBreakerConfigBuilder::new()
            .error_threshold(2)
            .error_threshold_timeout(Duration::from_secs(5))
            .success_threshold(3)
            .error_timeout(Duration::from_secs(30))
            .build()
            .expect("fast_fail preset is always valid")
    }

    /// The default, balanced preset.
    pub fn standard() -> CircuitBreakerConfig {
        CircuitBreakerConfigBuilder::new()
            .build()
            .expect("standard preset is always valid")
    }

    /// A forgiving preset for a noisy but generally healthy dependency.
    pub fn tolerant() -> CircuitBreakerConfig {
        CircuitBreakerConfigBuilder::new()
            .error_threshold(10)
            .error_threshold_timeout(Duration::from_secs(30))
            .success_threshold(1)
            .error_timeout(Duration::from_secs(5))
            .build()
            .expect("tolerant preset is always valid")
    }

    /// The configured resource name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder {
    error_threshold: usize,
    error_threshold_timeout: Duration,
    success_threshold: usize,
    error_timeout: Duration,
    name: String,
    event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfigBuilder {
    /// Starts a new builder with default thresholds.
    pub fn new() -> Self {
        Self {
            error_threshold: 3,
            error_threshold_timeout: Duration::from_secs(10),
            success_threshold: 2,
            error_timeout: Duration::from_secs(5),
            name: "<unnamed>".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Number of counted failures within `error_threshold_timeout` that opens the
    /// breaker.
    pub fn error_threshold(mut self, n: usize) -> Self {
        self.error_threshold = n;
        self
    }

    /// Width of the rolling window `error_threshold` is measured against.
    pub fn error_threshold_timeout(mut self, d: Duration) -> Self {
        self.error_threshold_timeout = d;
        self
    }

    /// Consecutive half-open successes required to close the breaker.
    pub fn success_threshold(mut self, n: usize) -> Self {
        self.success_threshold = n;
        self
    }

    /// How long the breaker stays open before admitting a half-open probe.
    pub fn error_timeout(mut self, d: Duration) -> Self {
        self.error_timeout = d;
        self
    }

    /// Sets the resource name surfaced in events, logs, and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a listener called on every state transition.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, BreakerState, BreakerState) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |e: &CircuitBreakerEvent| {
            if let CircuitBreakerEvent::StateTransition { name, from, to, .. } = e {
                f(name, *from, *to);
            }
        }));
        self
    }

    /// Registers a listener called whenever a call is permitted.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |e: &CircuitBreakerEvent| {
            if let CircuitBreakerEvent::CallPermitted { name, .. } = e {
                f(name);
            }
        }));
        self
    }

    /// Registers a listener called whenever a call is rejected.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |e: &CircuitBreakerEvent| {
            if let CircuitBreakerEvent::CallRejected { name, .. } = e {
                f(name);
            }
        }));
        self
    }

    /// Adds a raw listener for any [`CircuitBreakerEvent`].
    pub fn add_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<CircuitBreakerEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<CircuitBreakerConfig, ward_core::WardError<()>> {
        if self.error_threshold == 0 {
            return Err(ward_core::WardError::InvalidValue {
                reason: "error_threshold must be at least 1".to_string(),
            });
        }
        if self.success_threshold == 0 {
            return Err(ward_core::WardError::InvalidValue {
                reason: "success_threshold must be at least 1".to_string(),
            });
        }
        Ok(CircuitBreakerConfig {
            error_threshold: self.error_threshold,
            error_threshold_timeout: self.error_threshold_timeout,
            success_threshold: self.success_threshold,
            error_timeout: self.error_timeout,
            name: self.name,
            event_listeners: self.event_listeners,
        })
    }
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_are_sane() {
        let cfg = CircuitBreakerConfig::standard();
        assert_eq!(cfg.error_threshold, 3);
        assert_eq!(cfg.success_threshold, 2);
    }

    #[test]
    fn rejects_zero_thresholds() {
        assert!(CircuitBreakerConfig::builder().error_threshold(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().success_threshold(0).build().is_err());
    }

    #[test]
    fn presets_differ_in_tolerance() {
        let fast = CircuitBreakerConfig::fast_fail();
        let tolerant = CircuitBreakerConfig::tolerant();
        assert!(fast.error_threshold < tolerant.error_threshold);
    }
}
