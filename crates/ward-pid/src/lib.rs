//! Discrete PID controller turning a smoothed error rate and a latency quantile into a
//! rejection probability `r` in `[0, 1]`.
//!
//! `r_t = clamp(Kp*e_t + Ki*sum(e) + Kd*(e_t - e_{t-1}), 0, 1)` where `e_t` is a weighted
//! combination of the error-rate overshoot and the latency overshoot against their
//! respective setpoints. The integral term is clamped to `[0, 1]` as it accumulates to
//! prevent windup from keeping the breaker rejecting long after conditions recover.
//!
//! Styled on [`ward_core`]'s numeric-controller convention (a `Config`/builder pair plus
//! a plain struct holding mutable state, intended to be driven from behind a mutex by the
//! caller rather than made internally thread-safe) as seen in the donor workspace's own
//! AIMD controller.

use std::sync::atomic::{AtomicU64, Ordering};

/// Configuration for a [`Pid`] controller.
#[derive(Debug, Clone)]
pub struct PidConfig {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    pub ki: f64,
    /// Derivative gain.
    pub kd: f64,
    /// Target error rate (e.g. 0.01 for 1%).
    pub target_error_rate: f64,
    /// Target latency in milliseconds.
    pub target_latency_ms: f64,
    /// Relative weight given to the latency term vs. the error-rate term, in `[0, 1]`.
    pub latency_weight: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 2.0,
            ki: 0.5,
            kd: 0.1,
            target_error_rate: 0.05,
            target_latency_ms: 200.0,
            latency_weight: 0.3,
        }
    }
}

impl PidConfig {
    /// Starts from defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the proportional gain.
    pub fn with_kp(mut self, kp: f64) -> Self {
        self.kp = kp;
        self
    }

    /// Sets the integral gain.
    pub fn with_ki(mut self, ki: f64) -> Self {
        self.ki = ki;
        self
    }

    /// Sets the derivative gain.
    pub fn with_kd(mut self, kd: f64) -> Self {
        self.kd = kd;
        self
    }

    /// Sets the target error rate setpoint.
    pub fn with_target_error_rate(mut self, rate: f64) -> Self {
        self.target_error_rate = rate;
        self
    }

    /// Sets the target latency setpoint, in milliseconds.
    pub fn with_target_latency_ms(mut self, ms: f64) -> Self {
        self.target_latency_ms = ms;
        self
    }

    /// Sets how much the latency overshoot contributes relative to the error-rate
    /// overshoot. Clamped to `[0, 1]` at use.
    pub fn with_latency_weight(mut self, weight: f64) -> Self {
        self.latency_weight = weight;
        self
    }
}

/// Bit pattern helpers so the rejection probability can be read lock-free from a hot
/// admission path while the full PID state lives behind the caller's mutex.
fn to_bits(v: f64) -> u64 {
    v.to_bits()
}

fn from_bits(b: u64) -> f64 {
    f64::from_bits(b)
}

/// A discrete PID controller producing a rejection probability from error-rate and
/// latency overshoot.
pub struct Pid {
    config: PidConfig,
    integral: f64,
    previous_error: f64,
    // Mirrors the last computed `r` so callers on other threads can peek at it without
    // taking whatever mutex guards the rest of the controller.
    last_output_bits: AtomicU64,
}

impl Pid {
    /// Builds a controller from `config`.
    pub fn new(config: PidConfig) -> Self {
        Self {
            config,
            integral: 0.0,
            previous_error: 0.0,
            last_output_bits: AtomicU64::new(to_bits(0.0)),
        }
    }

    /// Runs one control tick given the current smoothed error rate and latency quantile
    /// (milliseconds), returning the rejection probability in `[0, 1]`.
    pub fn tick(&mut self, error_rate: f64, latency_ms: f64) -> f64 {
        let error_overshoot = (error_rate - self.config.target_error_rate).max(0.0);
        let latency_overshoot = ((latency_ms - self.config.target_latency_ms)
            / self.config.target_latency_ms.max(1.0))
        .max(0.0);

        let w = self.config.latency_weight.clamp(0.0, 1.0);
        let e = (1.0 - w) * error_overshoot + w * latency_overshoot;

        self.integral = (self.integral + e).clamp(0.0, 1.0 / self.config.ki.max(f64::EPSILON));
        let derivative = e - self.previous_error;
        self.previous_error = e;

        let r = (self.config.kp * e + self.config.ki * self.integral + self.config.kd * derivative)
            .clamp(0.0, 1.0);

        self.last_output_bits.store(to_bits(r), Ordering::Relaxed);
        r
    }

    /// The last computed rejection probability, readable without mutable access.
    pub fn last_output(&self) -> f64 {
        from_bits(self.last_output_bits.load(Ordering::Relaxed))
    }

    /// Resets the controller's accumulated state (integral term and derivative memory).
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
        self.last_output_bits.store(to_bits(0.0), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_setpoints_produces_zero_rejection() {
        let mut pid = Pid::new(PidConfig::default());
        let r = pid.tick(0.0, 0.0);
        assert_eq!(r, 0.0);
    }

    #[test]
    fn sustained_overshoot_increases_rejection_probability() {
        let mut pid = Pid::new(PidConfig::default());
        let mut last = 0.0;
        for _ in 0..10 {
            let r = pid.tick(0.5, 1000.0);
            assert!(r >= last, "rejection probability should not decrease under sustained overshoot");
            last = r;
        }
        assert!(last > 0.0);
    }

    #[test]
    fn output_is_always_clamped() {
        let mut pid = Pid::new(PidConfig::default().with_kp(1000.0).with_ki(1000.0));
        for _ in 0..50 {
            let r = pid.tick(1.0, 100_000.0);
            assert!((0.0..=1.0).contains(&r));
        }
    }

    #[test]
    fn recovering_conditions_relax_rejection_eventually() {
        let mut pid = Pid::new(PidConfig::default().with_ki(0.05));
        for _ in 0..20 {
            pid.tick(0.9, 2000.0);
        }
        let peak = pid.last_output();
        for _ in 0..200 {
            pid.tick(0.0, 0.0);
        }
        assert!(pid.last_output() <= peak);
    }

    #[test]
    fn reset_clears_accumulated_state() {
        let mut pid = Pid::new(PidConfig::default());
        for _ in 0..10 {
            pid.tick(0.9, 2000.0);
        }
        pid.reset();
        assert_eq!(pid.last_output(), 0.0);
    }
}
