//! The P² (Jain & Chlamtac, 1985) online single-quantile estimator.
//!
//! Maintains five markers and their ideal positions, updating marker heights with
//! parabolic (falling back to linear) interpolation on every observation. Memory is O(1)
//! regardless of how many observations have been seen — no sample history is retained.

use thiserror::Error;

/// Errors raised constructing or driving a [`P2Estimator`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QuantileError {
    /// `p` was not in `(0, 1)`.
    #[error("quantile p must be in (0, 1), got {0}")]
    InvalidQuantile(f64),
}

/// An online estimator of a single quantile `p` of a data stream.
///
/// Before 5 observations have been seen, [`P2Estimator::estimate`] returns the exact
/// sorted quantile of what has been observed so far (there is no history to
/// interpolate from yet); afterwards it tracks the quantile approximately using the P²
/// marker-adjustment algorithm.
#[derive(Debug, Clone)]
pub struct P2Estimator {
    p: f64,
    count: u64,
    // Initial fill buffer, used only for the first 5 observations.
    initial: Vec<f64>,
    // Marker heights.
    q: [f64; 5],
    // Marker positions (integers, but stored as f64 for arithmetic convenience).
    n: [f64; 5],
    // Desired marker positions.
    np: [f64; 5],
    // Desired position increments.
    dn: [f64; 5],
}

impl P2Estimator {
    /// Creates a new estimator of the `p`-quantile. `p` must be strictly between 0 and 1.
    pub fn new(p: f64) -> Result<Self, QuantileError> {
        if !(p > 0.0 && p < 1.0) {
            return Err(QuantileError::InvalidQuantile(p));
        }
        Ok(Self {
            p,
            count: 0,
            initial: Vec::with_capacity(5),
            q: [0.0; 5],
            n: [1.0, 2.0, 3.0, 4.0, 5.0],
            np: [0.0; 5],
            dn: [0.0, p / 2.0, p, (1.0 + p) / 2.0, 1.0],
        })
    }

    /// The target quantile this estimator tracks.
    pub fn p(&self) -> f64 {
        self.p
    }

    /// Number of observations seen so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Feeds one observation into the estimator.
    pub fn add_observation(&mut self, x: f64) {
        self.count += 1;

        if self.initial.len() < 5 {
            self.initial.push(x);
            if self.initial.len() == 5 {
                self.initial.sort_by(|a, b| a.partial_cmp(b).unwrap());
                self.q.copy_from_slice(&self.initial);
                for i in 0..5 {
                    self.np[i] = 1.0 + 4.0 * self.dn[i];
                }
            }
            return;
        }

        // Find the cell k such that q[k] <= x < q[k+1], clamped to the marker range.
        let k = if x < self.q[0] {
            self.q[0] = x;
            0
        } else if x >= self.q[4] {
            self.q[4] = x;
            3
        } else {
            let mut k = 0;
            for i in 0..4 {
                if self.q[i] <= x && x < self.q[i + 1] {
                    k = i;
                    break;
                }
            }
            k
        };

        for i in (k + 1)..5 {
            self.n[i] += 1.0;
        }
        for i in 0..5 {
            self.np[i] += self.dn[i];
        }

        for i in 1..4 {
            let d = self.np[i] - self.n[i];
            if (d >= 1.0 && self.n[i + 1] - self.n[i] > 1.0)
                || (d <= -1.0 && self.n[i - 1] - self.n[i] < -1.0)
            {
                let d = if d >= 0.0 { 1.0 } else { -1.0 };
                let qp = self.parabolic(i, d);
                if self.q[i - 1] < qp && qp < self.q[i + 1] {
                    self.q[i] = qp;
                } else {
                    self.q[i] = self.linear(i, d);
                }
                self.n[i] += d;
            }
        }
    }

    fn parabolic(&self, i: usize, d: f64) -> f64 {
        let (qi, qim1, qip1) = (self.q[i], self.q[i - 1], self.q[i + 1]);
        let (ni, nim1, nip1) = (self.n[i], self.n[i - 1], self.n[i + 1]);
        qi + d / (nip1 - nim1)
            * ((ni - nim1 + d) * (qip1 - qi) / (nip1 - ni)
                + (nip1 - ni - d) * (qi - qim1) / (ni - nim1))
    }

    fn linear(&self, i: usize, d: f64) -> f64 {
        let j = if d >= 0.0 { i + 1 } else { i - 1 };
        self.q[i] + d * (self.q[j] - self.q[i]) / (self.n[j] - self.n[i])
    }

    /// Current estimate of the `p`-quantile.
    pub fn estimate(&self) -> f64 {
        if self.initial.len() < 5 {
            if self.initial.is_empty() {
                return 0.0;
            }
            let mut sorted = self.initial.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let rank = ((sorted.len() as f64 - 1.0) * self.p).round() as usize;
            return sorted[rank.min(sorted.len() - 1)];
        }
        self.q[2]
    }

    /// Resets the estimator to its freshly constructed state.
    pub fn reset(&mut self) {
        self.count = 0;
        self.initial.clear();
        self.q = [0.0; 5];
        self.n = [1.0, 2.0, 3.0, 4.0, 5.0];
        self.np = [0.0; 5];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Beta, Distribution, Exp, Normal};

    #[test]
    fn rejects_out_of_range_quantiles() {
        assert!(P2Estimator::new(0.0).is_err());
        assert!(P2Estimator::new(1.0).is_err());
        assert!(P2Estimator::new(-0.1).is_err());
    }

    #[test]
    fn exact_before_five_observations() {
        let mut est = P2Estimator::new(0.5).unwrap();
        for x in [3.0, 1.0, 2.0] {
            est.add_observation(x);
        }
        // median of {1,2,3} sorted, rank round((3-1)*0.5)=1 -> value 2
        assert_eq!(est.estimate(), 2.0);
    }

    #[test]
    fn tracks_median_of_normal_within_tolerance() {
        let mut rng = StdRng::seed_from_u64(42);
        let dist = Normal::new(0.0, 1.0).unwrap();
        let mut est = P2Estimator::new(0.5).unwrap();
        for _ in 0..5000 {
            est.add_observation(dist.sample(&mut rng));
        }
        assert!((est.estimate() - 0.0).abs() < 0.1, "got {}", est.estimate());
    }

    #[test]
    fn tracks_median_of_exponential_within_tolerance() {
        let mut rng = StdRng::seed_from_u64(7);
        let dist = Exp::new(1.0).unwrap();
        let mut est = P2Estimator::new(0.5).unwrap();
        for _ in 0..5000 {
            est.add_observation(dist.sample(&mut rng));
        }
        let expected = std::f64::consts::LN_2;
        assert!((est.estimate() - expected).abs() < 0.1, "got {}", est.estimate());
    }

    #[test]
    fn tracks_median_of_beta_within_tolerance() {
        let mut rng = StdRng::seed_from_u64(99);
        let dist = Beta::new(10.0, 2.0).unwrap();
        let mut est = P2Estimator::new(0.5).unwrap();
        for _ in 0..5000 {
            est.add_observation(dist.sample(&mut rng));
        }
        // Exact median of Beta(10,2) is close to 0.8567.
        assert!((est.estimate() - 0.8567).abs() < 0.05, "got {}", est.estimate());
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let mut est = P2Estimator::new(0.9).unwrap();
        for x in 0..20 {
            est.add_observation(x as f64);
        }
        est.reset();
        assert_eq!(est.count(), 0);
        assert_eq!(est.estimate(), 0.0);
    }

    #[test]
    fn p99_tracks_a_skewed_tail() {
        let mut rng = StdRng::seed_from_u64(123);
        let dist = Exp::new(1.0).unwrap();
        let mut est = P2Estimator::new(0.99).unwrap();
        let mut samples = Vec::new();
        for _ in 0..5000 {
            let x = dist.sample(&mut rng);
            samples.push(x);
            est.add_observation(x);
        }
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let exact = samples[(samples.len() as f64 * 0.99) as usize];
        assert!((est.estimate() - exact).abs() < 0.5, "got {} exact {}", est.estimate(), exact);
    }
}
