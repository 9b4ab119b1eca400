//! Noise calibration: invert "noise scale → ε" to meet a target budget.
//!
//! The search is an explicit, bounded bisection so that calibrated noise
//! scales are reproducible across platforms:
//!
//! 1. `ε = +∞` fixes the noise scale to zero.
//! 2. `δ = 0` with finite `ε` is rejected: Gaussian mechanisms cannot give
//!    pure ε-DP.
//! 3. The upper bound starts at [`DEFAULT_INITIAL_UPPER`] and grows by
//!    [`DEFAULT_GROWTH`] until ε drops below the target, at most
//!    [`DEFAULT_MAX_EXPANSIONS`] times.
//! 4. Bisection stops once `hi − lo ≤ DEFAULT_RELATIVE_TOLERANCE · hi` or
//!    after [`DEFAULT_MAX_ITERATIONS`] halvings. The feasible end `hi` is
//!    returned, so the calibrated mechanism never exceeds the target.

use serde::{Deserialize, Serialize};
use tracing::debug;

use gnn_privacy_core::{PrivacyError, Result};

use crate::mechanism::NoisyMechanism;
use crate::rdp::{default_orders, sanitize_orders};

/// First upper bound tried for the noise scale.
pub const DEFAULT_INITIAL_UPPER: f64 = 1.0;
/// Geometric growth factor of the upper bound.
pub const DEFAULT_GROWTH: f64 = 2.0;
/// Maximum number of upper-bound expansions.
pub const DEFAULT_MAX_EXPANSIONS: usize = 48;
/// Relative width of the final bracket.
pub const DEFAULT_RELATIVE_TOLERANCE: f64 = 1e-4;
/// Maximum number of bisection steps.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Bounded bisection search over the noise scale.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibrator {
    initial_upper: f64,
    growth: f64,
    max_expansions: usize,
    relative_tolerance: f64,
    max_iterations: usize,
    orders: Vec<f64>,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self {
            initial_upper: DEFAULT_INITIAL_UPPER,
            growth: DEFAULT_GROWTH,
            max_expansions: DEFAULT_MAX_EXPANSIONS,
            relative_tolerance: DEFAULT_RELATIVE_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            orders: default_orders(),
        }
    }
}

/// Reproducibility record of one calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Name of the calibrated mechanism.
    pub mechanism: String,
    /// Target ε, `None` when unconstrained.
    pub target_epsilon: Option<f64>,
    /// Target δ.
    pub delta: f64,
    /// Calibrated noise scale.
    pub noise_scale: f64,
    /// ε achieved at `noise_scale`, `None` when unbounded.
    pub achieved_epsilon: Option<f64>,
    /// Upper-bound expansions performed.
    pub expansions: usize,
    /// Bisection steps performed.
    pub iterations: usize,
    /// Rényi orders used for the (ε, δ) conversion.
    pub orders: Vec<f64>,
}

impl CalibrationRecord {
    /// Serialize the record as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PrivacyError::config(format!("cannot serialize calibration record: {e}")))
    }

    /// Parse a record produced by [`CalibrationRecord::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PrivacyError::config(format!("cannot parse calibration record: {e}")))
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl Calibrator {
    /// Create a calibrator with the default search parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the first upper bound tried.
    pub fn with_initial_upper(mut self, initial_upper: f64) -> Self {
        self.initial_upper = initial_upper;
        self
    }

    /// Set the relative bracket width at which bisection stops.
    pub fn with_relative_tolerance(mut self, relative_tolerance: f64) -> Self {
        self.relative_tolerance = relative_tolerance;
        self
    }

    /// Set the maximum number of upper-bound expansions.
    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = max_expansions;
        self
    }

    /// Set the maximum number of bisection steps.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the Rényi orders used for the (ε, δ) conversion.
    pub fn with_orders(mut self, orders: &[f64]) -> Self {
        self.orders = sanitize_orders(orders);
        self
    }

    /// Orders used for the (ε, δ) conversion.
    pub fn orders(&self) -> &[f64] {
        &self.orders
    }

    /// Calibrate `mechanism` in place and return its new noise scale.
    pub fn calibrate<M: NoisyMechanism + ?Sized>(
        &self,
        mechanism: &mut M,
        epsilon: f64,
        delta: f64,
    ) -> Result<f64> {
        self.calibrate_with_record(mechanism, epsilon, delta)
            .map(|record| record.noise_scale)
    }

    /// Calibrate `mechanism` in place and return the full record.
    ///
    /// On error the mechanism keeps the noise scale it had before the call.
    pub fn calibrate_with_record<M: NoisyMechanism + ?Sized>(
        &self,
        mechanism: &mut M,
        epsilon: f64,
        delta: f64,
    ) -> Result<CalibrationRecord> {
        self.validate(epsilon, delta)?;

        let previous = mechanism.noise_scale();
        let result = self.search(mechanism, epsilon, delta);
        if result.is_err() {
            mechanism.set_noise_scale(previous);
        }
        result
    }

    fn validate(&self, epsilon: f64, delta: f64) -> Result<()> {
        if epsilon.is_nan() || epsilon < 0.0 {
            return Err(PrivacyError::config(format!(
                "epsilon must be >= 0 or +inf, got {epsilon}"
            )));
        }
        if !(0.0..=1.0).contains(&delta) {
            return Err(PrivacyError::config(format!(
                "delta must be in [0, 1], got {delta}"
            )));
        }
        if !(self.initial_upper.is_finite() && self.initial_upper > 0.0) {
            return Err(PrivacyError::config("initial upper bound must be positive"));
        }
        if !(self.growth.is_finite() && self.growth > 1.0) {
            return Err(PrivacyError::config("growth factor must exceed 1"));
        }
        if !(self.relative_tolerance.is_finite() && self.relative_tolerance > 0.0) {
            return Err(PrivacyError::config("relative tolerance must be positive"));
        }
        Ok(())
    }

    fn search<M: NoisyMechanism + ?Sized>(
        &self,
        mechanism: &mut M,
        target: f64,
        delta: f64,
    ) -> Result<CalibrationRecord> {
        let mut record = CalibrationRecord {
            mechanism: mechanism.name().to_string(),
            target_epsilon: finite(target),
            delta,
            noise_scale: 0.0,
            achieved_epsilon: None,
            expansions: 0,
            iterations: 0,
            orders: self.orders.clone(),
        };

        if target == f64::INFINITY {
            mechanism.set_noise_scale(0.0);
            record.achieved_epsilon = finite(mechanism.epsilon_with_orders(delta, &self.orders));
            debug!(mechanism = %record.mechanism, "no privacy constraint, noise scale fixed to 0");
            return Ok(record);
        }

        if delta == 0.0 {
            return Err(PrivacyError::calibration(format!(
                "cannot reach epsilon = {target} with delta = 0 using Gaussian noise"
            )));
        }

        let mut epsilon_at = |scale: f64| -> f64 {
            mechanism.set_noise_scale(scale);
            mechanism.epsilon_with_orders(delta, &self.orders)
        };

        let eps_zero = epsilon_at(0.0);
        if eps_zero <= target {
            record.achieved_epsilon = finite(eps_zero);
            debug!(mechanism = %record.mechanism, epsilon = eps_zero, "budget met without noise");
            return Ok(record);
        }

        let mut lo = 0.0;
        let mut hi = self.initial_upper;
        let mut eps_hi = epsilon_at(hi);
        while eps_hi > target {
            if record.expansions >= self.max_expansions {
                return Err(PrivacyError::calibration(format!(
                    "no noise scale up to {hi:.3e} reaches epsilon = {target} at delta = {delta:.2e} \
                     for {}",
                    record.mechanism
                )));
            }
            lo = hi;
            hi *= self.growth;
            eps_hi = epsilon_at(hi);
            record.expansions += 1;
        }
        debug!(
            mechanism = %record.mechanism,
            lo,
            hi,
            expansions = record.expansions,
            "bracketed noise scale"
        );

        while record.iterations < self.max_iterations && hi - lo > self.relative_tolerance * hi {
            let mid = 0.5 * (lo + hi);
            let eps_mid = epsilon_at(mid);
            if eps_mid <= target {
                hi = mid;
                eps_hi = eps_mid;
            } else {
                lo = mid;
            }
            record.iterations += 1;
        }

        mechanism.set_noise_scale(hi);
        record.noise_scale = hi;
        record.achieved_epsilon = finite(eps_hi);
        debug!(
            mechanism = %record.mechanism,
            noise_scale = hi,
            achieved_epsilon = eps_hi,
            iterations = record.iterations,
            "calibrated noise scale"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composed::ComposedNoisyMechanism;
    use crate::mechanism::testing::RepeatedGaussian;
    use crate::mechanism::NoisyMechanism;
    use proptest::prelude::*;

    #[test]
    fn infinite_epsilon_gives_zero_noise() {
        let mut m = RepeatedGaussian::new(3.0).with_noise_scale(4.0);
        let scale = m.calibrate(f64::INFINITY, 1e-5).expect("calibrate");
        assert_eq!(scale, 0.0);
        assert_eq!(m.noise_scale(), 0.0);

        let scale = m.calibrate(f64::INFINITY, 0.0).expect("calibrate");
        assert_eq!(scale, 0.0);
    }

    #[test]
    fn zero_delta_with_finite_epsilon_fails() {
        let mut m = RepeatedGaussian::new(1.0).with_noise_scale(1.5);
        let err = m.calibrate(1.0, 0.0).expect_err("must fail");
        assert!(err.is_calibration());
        assert_eq!(m.noise_scale(), 1.5);
    }

    #[test]
    fn invalid_targets_are_configuration_errors() {
        let mut m = RepeatedGaussian::new(1.0);
        assert!(!m.calibrate(-1.0, 1e-5).expect_err("eps").is_calibration());
        assert!(!m.calibrate(f64::NAN, 1e-5).expect_err("eps").is_calibration());
        assert!(!m.calibrate(1.0, 1.5).expect_err("delta").is_calibration());
    }

    #[test]
    fn unreachable_target_fails_to_bracket() {
        let mut m = RepeatedGaussian::new(1.0);
        let calibrator = Calibrator::new().with_max_expansions(3);
        let err = calibrator
            .calibrate(&mut m, 1e-6, 1e-5)
            .expect_err("must fail");
        assert!(err.is_calibration());
    }

    #[test]
    fn zero_epsilon_is_infeasible() {
        let mut m = RepeatedGaussian::new(1.0);
        assert!(m.calibrate(0.0, 1e-5).expect_err("eps = 0").is_calibration());
    }

    #[test]
    fn mechanism_without_releases_needs_no_noise() {
        let mut m = RepeatedGaussian::new(0.0);
        assert_eq!(m.calibrate(1.0, 1e-5).expect("calibrate"), 0.0);
    }

    #[test]
    fn calibration_is_idempotent() {
        let mut m = RepeatedGaussian::new(5.0);
        let first = m.calibrate(2.0, 1e-5).expect("first");
        m.set_noise_scale(123.0);
        let second = m.calibrate(2.0, 1e-5).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn calibrating_composition_writes_every_member() {
        let mut c = ComposedNoisyMechanism::once(vec![
            RepeatedGaussian::new(1.0),
            RepeatedGaussian::new(2.0),
        ]);
        let scale = c.calibrate(1.0, 1e-5).expect("calibrate");
        assert!(scale > 0.0);
        assert!(c.mechanisms().all(|m| m.noise_scale() == scale));
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut m = RepeatedGaussian::new(2.0);
        let record = Calibrator::new()
            .calibrate_with_record(&mut m, 3.0, 1e-6)
            .expect("calibrate");
        assert_eq!(record.orders, default_orders());
        assert_eq!(record.mechanism, "repeated-gaussian");
        let parsed = CalibrationRecord::from_json(&record.to_json().expect("json")).expect("parse");
        assert_eq!(parsed, record);

        let unconstrained = Calibrator::new()
            .calibrate_with_record(&mut m, f64::INFINITY, 1e-6)
            .expect("calibrate");
        assert_eq!(unconstrained.target_epsilon, None);
        assert_eq!(unconstrained.achieved_epsilon, None);
        assert!(unconstrained.to_json().is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 16, .. ProptestConfig::default() })]

        #[test]
        fn calibration_is_tight(
            target in 0.1f64..10.0,
            count in 1.0f64..50.0,
            delta in 1e-8f64..1e-2,
        ) {
            let mut m = RepeatedGaussian::new(count);
            let scale = m.calibrate(target, delta).expect("calibrate");
            let achieved = m.epsilon(delta);
            prop_assert!(achieved <= target);
            prop_assert!(achieved > target - 1e-3 * target.max(1.0));

            let looser = m.clone().with_noise_scale(scale * (1.0 - 2e-4));
            prop_assert!(looser.epsilon(delta) > target);
        }
    }
}
