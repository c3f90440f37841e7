//! Exponentially weighted moving average with outlier rejection and a stepped-down
//! learning-rate schedule.
//!
//! `s_t = alpha * x_t + (1 - alpha) * s_{t-1}`. Observations above `cap_value` are
//! dropped entirely (not clamped to the cap) so a short, sharp incident doesn't drag the
//! forecast toward it. `alpha` starts at `initial_alpha` and halves after the 90th
//! observation, halves again after the 180th, then stays flat.

use thiserror::Error;

const STEP_ONE_AT: u64 = 90;
const STEP_TWO_AT: u64 = 180;

/// Errors constructing or driving a [`Smoother`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SmootherError {
    /// `initial_alpha` was not in `(0, 0.5)`.
    #[error("initial_alpha must be in (0, 0.5), got {0}")]
    InvalidAlpha(f64),
    /// A negative value was fed to `add_observation`.
    #[error("observation must be non-negative, got {0}")]
    NegativeObservation(f64),
}

/// Builder for [`Smoother`].
#[derive(Debug, Clone)]
pub struct SmootherConfig {
    initial_value: f64,
    initial_alpha: f64,
    cap_value: f64,
}

impl SmootherConfig {
    /// Starts a builder with the donor defaults: value 0.0, alpha 0.3, cap +infinity.
    pub fn new() -> Self {
        Self {
            initial_value: 0.0,
            initial_alpha: 0.3,
            cap_value: f64::INFINITY,
        }
    }

    /// Sets the starting forecast value.
    pub fn initial_value(mut self, v: f64) -> Self {
        self.initial_value = v;
        self
    }

    /// Sets the starting learning rate. Must be in `(0, 0.5)`.
    pub fn initial_alpha(mut self, a: f64) -> Self {
        self.initial_alpha = a;
        self
    }

    /// Observations strictly above this value are dropped, not clamped.
    pub fn cap_value(mut self, c: f64) -> Self {
        self.cap_value = c;
        self
    }

    /// Validates and builds the smoother.
    pub fn build(self) -> Result<Smoother, SmootherError> {
        if !(self.initial_alpha > 0.0 && self.initial_alpha < 0.5) {
            return Err(SmootherError::InvalidAlpha(self.initial_alpha));
        }
        Ok(Smoother {
            value: self.initial_value,
            initial_value: self.initial_value,
            alpha: self.initial_alpha,
            initial_alpha: self.initial_alpha,
            cap_value: self.cap_value,
            observations: 0,
        })
    }
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// An exponential smoother over a stream of non-negative observations.
#[derive(Debug, Clone)]
pub struct Smoother {
    value: f64,
    initial_value: f64,
    alpha: f64,
    initial_alpha: f64,
    cap_value: f64,
    observations: u64,
}

impl Smoother {
    /// Starts a builder.
    pub fn builder() -> SmootherConfig {
        SmootherConfig::new()
    }

    /// Feeds one observation. Values above the configured cap are silently dropped.
    /// Negative values are rejected.
    pub fn add_observation(&mut self, x: f64) -> Result<(), SmootherError> {
        if x < 0.0 {
            return Err(SmootherError::NegativeObservation(x));
        }
        if x > self.cap_value {
            return Ok(());
        }
        self.value = self.alpha * x + (1.0 - self.alpha) * self.value;
        self.observations += 1;
        if self.observations == STEP_ONE_AT || self.observations == STEP_TWO_AT {
            self.alpha /= 2.0;
        }
        Ok(())
    }

    /// The current smoothed forecast.
    pub fn forecast(&self) -> f64 {
        self.value
    }

    /// Alias for [`Smoother::forecast`].
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The current learning rate.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Number of observations accepted (dropped outliers don't count).
    pub fn observations(&self) -> u64 {
        self.observations
    }

    /// Resets to the initial value and learning rate.
    pub fn reset(&mut self) {
        self.value = self.initial_value;
        self.alpha = self.initial_alpha;
        self.observations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_alpha_out_of_range() {
        assert!(Smoother::builder().initial_alpha(0.5).build().is_err());
        assert!(Smoother::builder().initial_alpha(0.0).build().is_err());
        assert!(Smoother::builder().initial_alpha(-0.1).build().is_err());
    }

    #[test]
    fn rejects_negative_observations() {
        let mut s = Smoother::builder().build().unwrap();
        assert!(s.add_observation(-1.0).is_err());
    }

    #[test]
    fn accepts_zero_observation() {
        let mut s = Smoother::builder().initial_value(1.0).build().unwrap();
        s.add_observation(0.0).unwrap();
        assert!(s.forecast() < 1.0);
    }

    #[test]
    fn drops_values_above_cap_without_clamping() {
        let mut s = Smoother::builder()
            .initial_value(0.05)
            .cap_value(0.1)
            .build()
            .unwrap();
        let before = s.forecast();
        s.add_observation(0.2).unwrap();
        assert_eq!(s.forecast(), before, "dropped observation must not move the forecast");
    }

    #[test]
    fn learning_rate_halves_at_step_boundaries() {
        let mut s = Smoother::builder().initial_alpha(0.4).build().unwrap();
        for _ in 0..89 {
            s.add_observation(1.0).unwrap();
        }
        assert_eq!(s.alpha(), 0.4);
        s.add_observation(1.0).unwrap(); // observation 90
        assert_eq!(s.alpha(), 0.2);
        for _ in 0..89 {
            s.add_observation(1.0).unwrap();
        }
        assert_eq!(s.alpha(), 0.2);
        s.add_observation(1.0).unwrap(); // observation 180
        assert_eq!(s.alpha(), 0.1);
        for _ in 0..1000 {
            s.add_observation(1.0).unwrap();
        }
        assert_eq!(s.alpha(), 0.1, "alpha floors after the second halving");
    }

    #[test]
    fn converges_toward_a_constant_input() {
        let mut s = Smoother::builder().initial_value(0.0).build().unwrap();
        for _ in 0..200 {
            s.add_observation(1.0).unwrap();
        }
        assert!((s.forecast() - 1.0).abs() < 0.01);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut s = Smoother::builder().initial_value(0.5).initial_alpha(0.3).build().unwrap();
        for _ in 0..200 {
            s.add_observation(1.0).unwrap();
        }
        s.reset();
        assert_eq!(s.forecast(), 0.5);
        assert_eq!(s.alpha(), 0.3);
        assert_eq!(s.observations(), 0);
    }
}
