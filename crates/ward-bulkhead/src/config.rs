//! Configuration for a [`crate::Bulkhead`].

use std::time::Duration;
use ward_core::{EventListener, EventListeners, FnListener};

use crate::events::BulkheadEvent;

/// How a bulkhead's ticket capacity is determined.
#[derive(Debug, Clone, Copy)]
pub enum Capacity {
    /// A fixed number of tickets.
    Tickets(usize),
    /// A fraction `0 < q <= 1` of a discovered worker count, evaluated at build time as
    /// `max(1, ceil(q * worker_count))`.
    Quota(f64),
}

/// Configuration for a [`crate::Bulkhead`], built through [`BulkheadConfigBuilder`].
pub struct BulkheadConfig {
    pub(crate) max_concurrent_calls: usize,
    pub(crate) max_wait_duration: Option<Duration>,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<BulkheadEvent>,
}

impl BulkheadConfig {
    /// Starts a builder with Semian-style defaults: 25 tickets, wait indefinitely.
    pub fn builder() -> BulkheadConfigBuilder {
        BulkheadConfigBuilder::new()
    }

    /// A small preset: 10 tickets, fail fast (zero wait).
    pub fn small() -> BulkheadConfig {
        BulkheadConfigBuilder::new()
            .tickets(10)
            .max_wait_duration(Some(Duration::ZERO))
            .build()
            .expect("small preset is always valid")
    }

    /// The default, balanced preset.
    pub fn medium() -> BulkheadConfig {
        BulkheadConfigBuilder::new()
            .tickets(50)
            .build()
            .expect("medium preset is always valid")
    }

    /// A generous preset for a dependency with ample headroom.
    pub fn large() -> BulkheadConfig {
        BulkheadConfigBuilder::new()
            .tickets(200)
            .build()
            .expect("large preset is always valid")
    }

    /// The configured resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bulkhead's ticket capacity.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_concurrent_calls
    }
}

/// Builder for [`BulkheadConfig`].
pub struct BulkheadConfigBuilder {
    capacity: Capacity,
    max_wait_duration: Option<Duration>,
    name: String,
    event_listeners: EventListeners<BulkheadEvent>,
    worker_count_hint: Option<usize>,
}

impl BulkheadConfigBuilder {
    /// Starts a new builder with 25 tickets and an unbounded wait.
    pub fn new() -> Self {
        Self {
            capacity: Capacity::Tickets(25),
            max_wait_duration: None,
            name: "bulkhead".to_string(),
            event_listeners: EventListeners::new(),
            worker_count_hint: None,
        }
    }

    /// Sets a fixed ticket count.
    pub fn tickets(mut self, n: usize) -> Self {
        self.capacity = Capacity::Tickets(n);
        self
    }

    /// Sets capacity as a fraction of the worker count, resolved at `build()`.
    pub fn quota(mut self, q: f64) -> Self {
        self.capacity = Capacity::Quota(q);
        self
    }

    /// Overrides the worker count used to resolve a [`Capacity::Quota`]. Defaults to
    /// [`std::thread::available_parallelism`].
    pub fn worker_count_hint(mut self, n: usize) -> Self {
        self.worker_count_hint = Some(n);
        self
    }

    /// How long to wait for a ticket before giving up. `None` waits indefinitely;
    /// `Some(Duration::ZERO)` fails fast.
    pub fn max_wait_duration(mut self, d: Option<Duration>) -> Self {
        self.max_wait_duration = d;
        self
    }

    /// Sets the resource name surfaced in events, logs, and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a listener called whenever a ticket is granted.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |e: &BulkheadEvent| {
            if let BulkheadEvent::CallPermitted { concurrent_calls, .. } = e {
                f(*concurrent_calls);
            }
        }));
        self
    }

    /// Registers a listener called whenever a ticket request is rejected.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |e: &BulkheadEvent| {
            if matches!(e, BulkheadEvent::CallRejected { .. }) {
                f();
            }
        }));
        self
    }

    /// Adds a raw listener for any [`BulkheadEvent`].
    pub fn add_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<BulkheadEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Validates and builds the configuration, resolving a quota-based capacity against
    /// the worker count hint (or the detected parallelism).
    pub fn build(self) -> Result<BulkheadConfig, ward_core::WardError<()>> {
        let max_concurrent_calls = match self.capacity {
            Capacity::Tickets(n) => {
                if n == 0 {
                    return Err(ward_core::WardError::InvalidValue {
                        reason: "tickets must be at least 1".to_string(),
                    });
                }
                n
            }
            Capacity::Quota(q) => {
                if !(q > 0.0 && q <= 1.0) {
                    return Err(ward_core::WardError::InvalidValue {
                        reason: format!("quota must be in (0, 1], got {q}"),
                    });
                }
                let workers = self.worker_count_hint.unwrap_or_else(|| {
                    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
                });
                ((q * workers as f64).ceil() as usize).max(1)
            }
        };
        Ok(BulkheadConfig {
            max_concurrent_calls,
            max_wait_duration: self.max_wait_duration,
            name: self.name,
            event_listeners: self.event_listeners,
        })
    }
}

impl Default for BulkheadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_twenty_five_tickets() {
        let cfg = BulkheadConfig::builder().build().unwrap();
        assert_eq!(cfg.max_concurrent_calls(), 25);
    }

    #[test]
    fn rejects_zero_tickets() {
        assert!(BulkheadConfig::builder().tickets(0).build().is_err());
    }

    #[test]
    fn rejects_out_of_range_quota() {
        assert!(BulkheadConfig::builder().quota(0.0).build().is_err());
        assert!(BulkheadConfig::builder().quota(1.5).build().is_err());
    }

    #[test]
    fn quota_resolves_against_worker_count_hint() {
        let cfg = BulkheadConfig::builder()
            .quota(0.5)
            .worker_count_hint(10)
            .build()
            .unwrap();
        assert_eq!(cfg.max_concurrent_calls(), 5);
    }

    #[test]
    fn quota_never_resolves_below_one() {
        let cfg = BulkheadConfig::builder()
            .quota(0.01)
            .worker_count_hint(4)
            .build()
            .unwrap();
        assert_eq!(cfg.max_concurrent_calls(), 1);
    }

    #[test]
    fn presets_scale_up() {
        let small = BulkheadConfig::small();
        let large = BulkheadConfig::large();
        assert!(small.max_concurrent_calls() < large.max_concurrent_calls());
    }
}
