//! The classic breaker's state machine: a time-bounded failure window plus a three-state
//! cycle `closed -> open -> half_open -> closed`, grounded on the donor's
//! `Circuit`/`CallRecord` split (count failures within a rolling window, reset every
//! window on any state transition).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ward_core::sliding_window::TimeWindow;
use ward_core::EventListeners;

use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;

/// The three states a classic circuit breaker can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BreakerState {
    /// Calls run normally; failures accumulate in the sliding window.
    Closed = 0,
    /// Calls fail fast without running.
    Open = 1,
    /// A single probe call is admitted to test recovery.
    HalfOpen = 2,
}

impl BreakerState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => BreakerState::Open,
            2 => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }
}

/// A point-in-time snapshot of a breaker's counters, safe to read without blocking on
/// the breaker's internal lock for the state byte (the rest of the snapshot is taken
/// under lock so it stays internally consistent).
#[derive(Debug, Clone)]
pub struct CircuitMetrics {
    /// Current state.
    pub state: BreakerState,
    /// Failures currently retained in the sliding window.
    pub failures_in_window: usize,
    /// Consecutive successes recorded while half-open.
    pub consecutive_successes: usize,
    /// How long ago the breaker last changed state.
    pub time_since_state_change: Duration,
    /// The last counted failure's rendered message, if any has been recorded yet.
    pub last_error: Option<String>,
}

pub(crate) struct Circuit {
    state: BreakerState,
    state_atomic: Arc<AtomicU8>,
    last_state_change: Instant,
    opened_at: Option<Instant>,
    consecutive_successes: usize,
    half_open_probe_in_flight: bool,
    failures: TimeWindow<()>,
    last_error: Option<String>,
}

impl Circuit {
    pub(crate) fn new(state_atomic: Arc<AtomicU8>, window_duration: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            state_atomic,
            last_state_change: Instant::now(),
            opened_at: None,
            consecutive_successes: 0,
            half_open_probe_in_flight: false,
            failures: TimeWindow::new(window_duration),
            last_error: None,
        }
    }

    pub(crate) fn state(&self) -> BreakerState {
        self.state
    }

    pub(crate) fn metrics(&mut self, now: Instant) -> CircuitMetrics {
        CircuitMetrics {
            state: self.state,
            failures_in_window: self.failures.size(now),
            consecutive_successes: self.consecutive_successes,
            time_since_state_change: now.saturating_duration_since(self.last_state_change),
            last_error: self.last_error.clone(),
        }
    }

    fn transition_to(
        &mut self,
        to: BreakerState,
        config: &CircuitBreakerConfig,
        now: Instant,
        listeners: &EventListeners<CircuitBreakerEvent>,
    ) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        self.state_atomic.store(to as u8, Ordering::SeqCst);
        self.last_state_change = now;
        self.consecutive_successes = 0;
        self.half_open_probe_in_flight = false;
        self.failures.clear();
        if to == BreakerState::Open {
            self.opened_at = Some(now);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(resource = %config.name, ?from, ?to, "circuit breaker state transition");
        #[cfg(feature = "metrics")]
        {
            metrics::counter!(
                "circuitbreaker_state_transitions_total",
                "resource" => config.name.clone(),
                "to" => format!("{to:?}")
            )
            .increment(1);
            metrics::gauge!("circuitbreaker_state", "resource" => config.name.clone())
                .set(to as u8 as f64);
        }

        listeners.emit(&CircuitBreakerEvent::StateTransition {
            name: config.name.clone(),
            timestamp: now,
            from,
            to,
        });
    }

    /// Decides whether a call should be admitted right now, mutating state as needed
    /// (open -> half_open on dwell expiry).
    pub(crate) fn try_acquire(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
        listeners: &EventListeners<CircuitBreakerEvent>,
    ) -> bool {
        match self.state {
            BreakerState::Closed => {
                listeners.emit(&CircuitBreakerEvent::CallPermitted {
                    name: config.name.clone(),
                    timestamp: now,
                    state: self.state,
                });
                true
            }
            BreakerState::Open => {
                let dwell_elapsed = self
                    .opened_at
                    .map(|at| now.duration_since(at) >= config.error_timeout)
                    .unwrap_or(true);
                if dwell_elapsed {
                    self.transition_to(BreakerState::HalfOpen, config, now, listeners);
                    self.half_open_probe_in_flight = true;
                    listeners.emit(&CircuitBreakerEvent::CallPermitted {
                        name: config.name.clone(),
                        timestamp: now,
                        state: self.state,
                    });
                    true
                } else {
                    listeners.emit(&CircuitBreakerEvent::CallRejected {
                        name: config.name.clone(),
                        timestamp: now,
                    });
                    false
                }
            }
            BreakerState::HalfOpen => {
                if self.half_open_probe_in_flight {
                    listeners.emit(&CircuitBreakerEvent::CallRejected {
                        name: config.name.clone(),
                        timestamp: now,
                    });
                    false
                } else {
                    self.half_open_probe_in_flight = true;
                    listeners.emit(&CircuitBreakerEvent::CallPermitted {
                        name: config.name.clone(),
                        timestamp: now,
                        state: self.state,
                    });
                    true
                }
            }
        }
    }

    pub(crate) fn record_success(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
        listeners: &EventListeners<CircuitBreakerEvent>,
    ) {
        listeners.emit(&CircuitBreakerEvent::SuccessRecorded {
            name: config.name.clone(),
            timestamp: now,
            state: self.state,
        });
        if self.state == BreakerState::HalfOpen {
            self.half_open_probe_in_flight = false;
            self.consecutive_successes += 1;
            if self.consecutive_successes >= config.success_threshold {
                self.transition_to(BreakerState::Closed, config, now, listeners);
            }
        }
    }

    pub(crate) fn record_failure(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
        listeners: &EventListeners<CircuitBreakerEvent>,
        reason: Option<String>,
    ) {
        if let Some(reason) = reason {
            self.last_error = Some(reason);
        }
        listeners.emit(&CircuitBreakerEvent::FailureRecorded {
            name: config.name.clone(),
            timestamp: now,
            state: self.state,
        });
        match self.state {
            BreakerState::Closed => {
                self.failures.push(now, ());
                if self.failures.size(now) >= config.error_threshold {
                    self.transition_to(BreakerState::Open, config, now, listeners);
                }
            }
            BreakerState::HalfOpen => {
                self.half_open_probe_in_flight = false;
                self.transition_to(BreakerState::Open, config, now, listeners);
            }
            BreakerState::Open => {}
        }
    }

    pub(crate) fn force_open(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
        listeners: &EventListeners<CircuitBreakerEvent>,
    ) {
        self.transition_to(BreakerState::Open, config, now, listeners);
    }

    pub(crate) fn force_closed(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
        listeners: &EventListeners<CircuitBreakerEvent>,
    ) {
        self.transition_to(BreakerState::Closed, config, now, listeners);
    }

    pub(crate) fn reset(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
        listeners: &EventListeners<CircuitBreakerEvent>,
    ) {
        self.transition_to(BreakerState::Closed, config, now, listeners);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ward_core::EventListeners;

    fn config(error_threshold: usize) -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .name("test")
            .error_threshold(error_threshold)
            .error_threshold_timeout(Duration::from_secs(10))
            .success_threshold(2)
            .error_timeout(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    fn circuit(config: &CircuitBreakerConfig) -> Circuit {
        Circuit::new(Arc::new(AtomicU8::new(0)), config.error_threshold_timeout)
    }

    #[test]
    fn opens_after_error_threshold_failures() {
        let cfg = config(3);
        let mut c = circuit(&cfg);
        let listeners = EventListeners::new();
        let now = Instant::now();
        assert!(c.try_acquire(&cfg, now, &listeners));
        c.record_failure(&cfg, now, &listeners, None);
        c.record_failure(&cfg, now, &listeners, None);
        assert_eq!(c.state(), BreakerState::Closed);
        c.record_failure(&cfg, now, &listeners, None);
        assert_eq!(c.state(), BreakerState::Open);
    }

    #[test]
    fn stays_closed_under_the_threshold() {
        let cfg = config(5);
        let mut c = circuit(&cfg);
        let listeners = EventListeners::new();
        let now = Instant::now();
        for _ in 0..4 {
            c.record_failure(&cfg, now, &listeners, None);
        }
        assert_eq!(c.state(), BreakerState::Closed);
    }

    #[test]
    fn half_opens_after_dwell_and_permits_a_single_probe() {
        let cfg = config(1);
        let mut c = circuit(&cfg);
        let listeners = EventListeners::new();
        let t0 = Instant::now();
        c.record_failure(&cfg, t0, &listeners, None);
        assert_eq!(c.state(), BreakerState::Open);
        assert!(!c.try_acquire(&cfg, t0, &listeners));

        let t1 = t0 + Duration::from_millis(60);
        assert!(c.try_acquire(&cfg, t1, &listeners));
        assert_eq!(c.state(), BreakerState::HalfOpen);
        // A second concurrent admission attempt while the probe is in flight is rejected.
        assert!(!c.try_acquire(&cfg, t1, &listeners));
    }

    #[test]
    fn closes_after_success_threshold_in_half_open() {
        let cfg = config(1);
        let mut c = circuit(&cfg);
        let listeners = EventListeners::new();
        let t0 = Instant::now();
        c.record_failure(&cfg, t0, &listeners, None);
        let t1 = t0 + Duration::from_millis(60);
        c.try_acquire(&cfg, t1, &listeners);
        c.record_success(&cfg, t1, &listeners);
        assert_eq!(c.state(), BreakerState::HalfOpen);
        c.try_acquire(&cfg, t1, &listeners);
        c.record_success(&cfg, t1, &listeners);
        assert_eq!(c.state(), BreakerState::Closed);
    }

    #[test]
    fn any_half_open_failure_reopens_immediately() {
        let cfg = config(1);
        let mut c = circuit(&cfg);
        let listeners = EventListeners::new();
        let t0 = Instant::now();
        c.record_failure(&cfg, t0, &listeners, None);
        let t1 = t0 + Duration::from_millis(60);
        c.try_acquire(&cfg, t1, &listeners);
        c.record_failure(&cfg, t1, &listeners, None);
        assert_eq!(c.state(), BreakerState::Open);
    }

    #[test]
    fn a_full_cycle_leaves_the_window_empty() {
        let cfg = config(1);
        let mut c = circuit(&cfg);
        let listeners = EventListeners::new();
        let t0 = Instant::now();
        c.record_failure(&cfg, t0, &listeners, None);
        let t1 = t0 + Duration::from_millis(60);
        c.try_acquire(&cfg, t1, &listeners);
        c.record_success(&cfg, t1, &listeners);
        c.try_acquire(&cfg, t1, &listeners);
        c.record_success(&cfg, t1, &listeners);
        assert_eq!(c.state(), BreakerState::Closed);
        assert_eq!(c.metrics(t1).failures_in_window, 0);
    }

    #[test]
    fn manual_overrides_transition_immediately() {
        let cfg = config(10);
        let mut c = circuit(&cfg);
        let listeners = EventListeners::new();
        let now = Instant::now();
        c.force_open(&cfg, now, &listeners);
        assert_eq!(c.state(), BreakerState::Open);
        c.force_closed(&cfg, now, &listeners);
        assert_eq!(c.state(), BreakerState::Closed);
    }
}
