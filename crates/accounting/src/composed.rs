//! Sequential composition of mechanisms sharing one noise scale.

use gnn_privacy_core::{PrivacyError, Result};

use crate::mechanism::{clamp_noise_scale, NoisyMechanism};
use crate::rdp::scale_rdp;

/// Weighted sequential composition of mechanisms.
///
/// The composed curve is `Σ coeff_i · curve_i`, evaluated pointwise per order,
/// where a coefficient counts how many times that mechanism's loss accrues.
/// Setting the noise scale broadcasts it to every member, so all members share
/// one privacy dial. Mechanisms that need independent scales belong in
/// separate composed groups.
#[derive(Clone, Debug)]
pub struct ComposedNoisyMechanism<M> {
    noise_scale: f64,
    entries: Vec<(M, f64)>,
}

impl<M: NoisyMechanism> Default for ComposedNoisyMechanism<M> {
    fn default() -> Self {
        Self {
            noise_scale: 0.0,
            entries: Vec::new(),
        }
    }
}

impl<M: NoisyMechanism> ComposedNoisyMechanism<M> {
    /// Compose `mechanisms` with matching `coefficients`.
    ///
    /// Coefficients must be finite and non-negative. The group starts
    /// uncalibrated: every member's noise scale is reset to zero.
    pub fn new(mechanisms: Vec<M>, coefficients: Vec<f64>) -> Result<Self> {
        if mechanisms.len() != coefficients.len() {
            return Err(PrivacyError::config(format!(
                "{} mechanisms but {} coefficients",
                mechanisms.len(),
                coefficients.len()
            )));
        }
        let mut composed = Self::default();
        for (mechanism, coeff) in mechanisms.into_iter().zip(coefficients) {
            composed.push(mechanism, coeff)?;
        }
        Ok(composed)
    }

    /// Compose mechanisms that each accrue exactly once.
    pub fn once(mechanisms: Vec<M>) -> Self {
        let mut composed = Self::default();
        for mut mechanism in mechanisms {
            mechanism.set_noise_scale(0.0);
            composed.entries.push((mechanism, 1.0));
        }
        composed
    }

    /// Append a mechanism accruing `coefficient` times.
    pub fn push(&mut self, mut mechanism: M, coefficient: f64) -> Result<()> {
        if !coefficient.is_finite() || coefficient < 0.0 {
            return Err(PrivacyError::config(format!(
                "composition coefficient must be finite and >= 0, got {coefficient}"
            )));
        }
        mechanism.set_noise_scale(self.noise_scale);
        self.entries.push((mechanism, coefficient));
        Ok(())
    }

    /// Number of composed mechanisms.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the composition is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Member at `index`.
    pub fn get(&self, index: usize) -> Option<&M> {
        self.entries.get(index).map(|(m, _)| m)
    }

    /// Members in composition order.
    pub fn mechanisms(&self) -> impl Iterator<Item = &M> {
        self.entries.iter().map(|(m, _)| m)
    }

    /// Coefficients in composition order.
    pub fn coefficients(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, c)| *c).collect()
    }

    /// Take the members back, carrying their calibrated noise scale.
    pub fn into_mechanisms(self) -> Vec<M> {
        self.entries.into_iter().map(|(m, _)| m).collect()
    }
}

impl<M: NoisyMechanism> NoisyMechanism for ComposedNoisyMechanism<M> {
    fn name(&self) -> &str {
        "composed"
    }

    fn noise_scale(&self) -> f64 {
        self.noise_scale
    }

    fn set_noise_scale(&mut self, noise_scale: f64) {
        self.noise_scale = clamp_noise_scale(noise_scale);
        for (mechanism, _) in &mut self.entries {
            mechanism.set_noise_scale(self.noise_scale);
        }
    }

    fn rdp(&self, orders: &[f64]) -> Vec<f64> {
        let mut total = vec![0.0; orders.len()];
        for (mechanism, coeff) in &self.entries {
            if *coeff == 0.0 {
                continue;
            }
            let values = mechanism.rdp(orders);
            if values.len() != orders.len() {
                return vec![f64::INFINITY; orders.len()];
            }
            for (acc, v) in total.iter_mut().zip(values) {
                *acc += scale_rdp(v, *coeff);
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanism::testing::{RepeatedGaussian, ShortCurve};
    use crate::rdp::default_orders;
    use proptest::prelude::*;

    #[test]
    fn rejects_mismatched_and_negative_coefficients() {
        let ms = vec![RepeatedGaussian::new(1.0), RepeatedGaussian::new(2.0)];
        assert!(ComposedNoisyMechanism::new(ms.clone(), vec![1.0]).is_err());
        assert!(ComposedNoisyMechanism::new(ms, vec![1.0, -1.0]).is_err());
    }

    #[test]
    fn set_noise_scale_broadcasts() {
        let mut c = ComposedNoisyMechanism::once(vec![
            RepeatedGaussian::new(1.0),
            RepeatedGaussian::new(3.0),
        ]);
        c.set_noise_scale(2.5);
        assert!(c.mechanisms().all(|m| m.noise_scale() == 2.5));
        let members = c.into_mechanisms();
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].noise_scale(), 2.5);
    }

    #[test]
    fn zero_coefficient_ignores_infinite_member() {
        let c = ComposedNoisyMechanism::new(
            vec![RepeatedGaussian::new(1.0)],
            vec![0.0],
        )
        .expect("composed");
        assert_eq!(c.rdp(&[2.0, 8.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn short_member_curve_is_infinite() {
        let c = ComposedNoisyMechanism::new(vec![ShortCurve, ShortCurve], vec![1.0, 1.0])
            .expect("composed");
        assert_eq!(c.rdp(&[2.0, 4.0]), vec![f64::INFINITY; 2]);
        assert_eq!(c.epsilon(1e-5), f64::INFINITY);
    }

    #[test]
    fn coefficients_multiply_curves() {
        let mut c = ComposedNoisyMechanism::new(vec![RepeatedGaussian::new(1.0)], vec![4.0])
            .expect("composed");
        c.set_noise_scale(1.0);
        let single = RepeatedGaussian::new(4.0).with_noise_scale(1.0);
        assert_eq!(c.rdp(&[3.0]), single.rdp(&[3.0]));
    }

    #[test]
    fn nested_groups_compose() {
        let inner = ComposedNoisyMechanism::once(vec![RepeatedGaussian::new(1.0)]);
        let mut outer = ComposedNoisyMechanism::new(vec![inner.clone(), inner], vec![1.0, 2.0])
            .expect("composed");
        outer.set_noise_scale(1.0);
        let flat = RepeatedGaussian::new(3.0).with_noise_scale(1.0);
        let orders = default_orders();
        for (a, b) in outer.rdp(&orders).iter().zip(flat.rdp(&orders)) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    proptest! {
        #[test]
        fn composition_is_additive(
            count_a in 0.0f64..20.0,
            count_b in 0.0f64..20.0,
            noise in 0.1f64..10.0,
        ) {
            let a = RepeatedGaussian::new(count_a).with_noise_scale(noise);
            let b = RepeatedGaussian::new(count_b).with_noise_scale(noise);
            let mut c = ComposedNoisyMechanism::once(vec![a.clone(), b.clone()]);
            c.set_noise_scale(noise);

            let orders = default_orders();
            let (ra, rb) = (a.rdp(&orders), b.rdp(&orders));
            for (i, v) in c.rdp(&orders).into_iter().enumerate() {
                prop_assert!((v - (ra[i] + rb[i])).abs() <= 1e-9 * v.max(1.0));
            }
        }
    }
}
