//! Angle-constrained random walk.
//!
//! `avulse` is a pure Gaussian perturbation of a scalar; bounding the result
//! is the caller's job (see `River::step_avulsion`).  Each river carries its
//! own `AvulsionState` so no generator is ever shared between rivers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::RiverError;

/// Standard normal deviate via the Box–Muller transform.
pub fn standard_normal(rng: &mut StdRng) -> f64 {
    // u1 in (0, 1] so ln(u1) is finite.
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen_range(0.0_f64..std::f64::consts::TAU);
    (-2.0 * u1.ln()).sqrt() * u2.cos()
}

/// Next angle of the walk: `current + N(0, σ)`.
///
/// `std_dev ≤ 0` means "no perturbation": the current angle is returned and
/// the generator is left untouched.
pub fn avulse(rng: &mut StdRng, current: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 || !std_dev.is_finite() {
        return current;
    }
    current + standard_normal(rng) * std_dev
}

/// Per-river avulsion context: its own generator plus the walk parameters.
#[derive(Debug, Clone)]
pub struct AvulsionState {
    rng: StdRng,
    /// Per-step standard deviation in radians.
    pub std_dev: f64,
    /// Seed the generator was created from; kept for snapshots.
    pub seed: u64,
    /// Whether merge/split may act on this river.
    pub can_branch: bool,
}

impl AvulsionState {
    pub fn new(seed: u64, std_dev: f64, can_branch: bool) -> Result<Self, RiverError> {
        if std_dev.is_nan() || std_dev <= 0.0 {
            return Err(RiverError::NonPositiveStdDev(std_dev));
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            std_dev,
            seed,
            can_branch,
        })
    }

    /// Draw the next unbounded angle.
    pub fn next_angle(&mut self, current: f64) -> f64 {
        avulse(&mut self.rng, current, self.std_dev)
    }

    /// Derive an independent child context for a new branch.
    pub fn fork(&mut self) -> Self {
        let seed = self.rng.gen::<u64>();
        Self {
            rng: StdRng::seed_from_u64(seed),
            std_dev: self.std_dev,
            seed,
            can_branch: self.can_branch,
        }
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

/// Serializable parameters of an avulsion context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvulsionParams {
    pub seed: u64,
    pub std_dev: f64,
    pub can_branch: bool,
}

impl From<&AvulsionState> for AvulsionParams {
    fn from(s: &AvulsionState) -> Self {
        Self { seed: s.seed, std_dev: s.std_dev, can_branch: s.can_branch }
    }
}

/// Degenerate single-scalar walk used by the `--lite` driver mode.
///
/// Each step draws a perturbation and clamps into `[min, max]`.  Returns the
/// angle after every step.
pub fn lite_walk(seed: u64, start: f64, std_dev: f64, min: f64, max: f64, n_steps: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut angle = start.clamp(min, max);
    let mut out = Vec::with_capacity(n_steps);
    for _ in 0..n_steps {
        angle = avulse(&mut rng, angle, std_dev).clamp(min, max);
        out.push(angle);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::deg_to_rad;

    #[test]
    fn perturbation_statistics_match_sigma() {
        let mut rng = StdRng::seed_from_u64(7);
        let sigma = 0.25;
        let n = 20_000;
        let draws: Vec<f64> = (0..n).map(|_| avulse(&mut rng, 1.0, sigma) - 1.0).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.01, "mean {mean:.4} should be near 0");
        assert!((var.sqrt() - sigma).abs() < 0.01, "std {:.4} should be near {sigma}", var.sqrt());
    }

    #[test]
    fn zero_sigma_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(avulse(&mut rng, 0.3, 0.0), 0.3);
        assert_eq!(avulse(&mut rng, 0.3, -1.0), 0.3);
    }

    #[test]
    fn same_seed_same_stream() {
        let mut a = AvulsionState::new(1945, 0.0131, false).unwrap();
        let mut b = AvulsionState::new(1945, 0.0131, false).unwrap();
        for _ in 0..50 {
            assert_eq!(a.next_angle(0.0), b.next_angle(0.0));
        }
    }

    #[test]
    fn non_positive_sigma_rejected() {
        assert_eq!(
            AvulsionState::new(1, 0.0, true).unwrap_err(),
            RiverError::NonPositiveStdDev(0.0)
        );
    }

    #[test]
    fn lite_walk_never_leaves_bounds() {
        let (min, max) = (deg_to_rad(60.0), deg_to_rad(120.0));
        let walk = lite_walk(1945, deg_to_rad(90.0), deg_to_rad(10.0), min, max, 500);
        assert_eq!(walk.len(), 500);
        for (i, &a) in walk.iter().enumerate() {
            assert!(a >= min && a <= max, "step {i}: {a} outside [{min}, {max}]");
        }
    }
}
