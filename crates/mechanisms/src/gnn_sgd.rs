//! DP-SGD for message-passing models under node-level privacy.
//!
//! With in-degrees bounded by `max_degree`, one node's features reach at most
//! `K = Σ_{i=0}^{layers} max_degree^i` per-example gradients. Under Poisson
//! sampling the number of affected gradients in a batch is
//! `ρ ~ Binomial(K, q)`. Removing the node drops its own gradient and
//! replaces the others, each of which moves by up to `2 · max_grad_norm`
//! between two clipped values, so each step is bounded by the Gaussian
//! mixture with sensitivity `2ρ · max_grad_norm`.

use statrs::distribution::{Binomial, Discrete};
use tracing::debug;

use gnn_privacy_accounting::{clamp_noise_scale, log_mixture_gaussian_rdp, NoisyMechanism};
use gnn_privacy_core::{PoissonSampler, PrivacyError, Result};

use crate::noisy_sgd::{repeated_rdp, NoisySgd};
use crate::training::{DpOptimizer, GradSampleModule, Optimizer, PerExampleGradients};

/// Upper limit on the number of gradients one node may influence.
///
/// The mixture keeps one term per possible count, and every ε evaluation
/// walks all of them at every order.
const MAX_AFFECTED_TERMS: u64 = 1 << 14;

/// Node-level DP-SGD for a GNN with bounded in-degree.
#[derive(Clone, Debug, PartialEq)]
pub struct GnnBasedNoisySgd {
    sgd: NoisySgd,
    max_degree: usize,
    layers: usize,
    affected: u64,
    log_weights: Vec<(f64, f64)>,
}

impl GnnBasedNoisySgd {
    /// Create an uncalibrated node-level DP-SGD mechanism with one layer.
    pub fn new(
        dataset_size: usize,
        batch_size: usize,
        epochs: usize,
        max_grad_norm: f64,
        max_degree: usize,
    ) -> Result<Self> {
        let sgd = NoisySgd::new(dataset_size, batch_size, epochs, max_grad_norm)?;
        if max_degree == 0 {
            return Err(PrivacyError::config("max_degree must be positive"));
        }
        Self::build(sgd, max_degree, 1)
    }

    /// Same mechanism for a model with `layers` message-passing layers.
    pub fn with_layers(self, layers: usize) -> Result<Self> {
        Self::build(self.sgd, self.max_degree, layers)
    }

    fn build(sgd: NoisySgd, max_degree: usize, layers: usize) -> Result<Self> {
        let affected = affected_terms(max_degree as u64, layers).ok_or_else(|| {
            PrivacyError::config(format!(
                "max_degree {max_degree} with {layers} layers lets one node affect more than \
                 {MAX_AFFECTED_TERMS} gradients"
            ))
        })?;

        let binomial = Binomial::new(sgd.sampling_rate(), affected)
            .map_err(|e| PrivacyError::config(format!("invalid sampling distribution: {e}")))?;
        let log_weights: Vec<(f64, f64)> = (0..=affected)
            .map(|k| (binomial.ln_pmf(k), 2.0 * k as f64))
            .filter(|(log_p, _)| log_p.is_finite())
            .collect();
        debug!(
            max_degree,
            layers,
            affected,
            support = log_weights.len(),
            "gnn sensitivity mixture"
        );

        Ok(Self {
            sgd,
            max_degree,
            layers,
            affected,
            log_weights,
        })
    }

    /// Degree bound enforced by the neighbor sampler.
    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Number of message-passing layers.
    pub fn layers(&self) -> usize {
        self.layers
    }

    /// Maximum number of per-example gradients one node can influence.
    pub fn affected_terms(&self) -> u64 {
        self.affected
    }

    /// Underlying DP-SGD shape.
    pub fn sgd(&self) -> &NoisySgd {
        &self.sgd
    }

    /// See [`NoisySgd::prepare_optimizer`].
    pub fn prepare_optimizer<O: Optimizer>(&self, optimizer: O, seed: u64) -> DpOptimizer<O> {
        self.sgd.prepare_optimizer(optimizer, seed)
    }

    /// See [`NoisySgd::prepare_module`].
    pub fn prepare_module<M: PerExampleGradients>(&self, module: M) -> GradSampleModule<M> {
        self.sgd.prepare_module(module)
    }

    /// See [`NoisySgd::data_loader`].
    pub fn data_loader(&self, seed: u64) -> Result<PoissonSampler> {
        self.sgd.data_loader(seed)
    }
}

/// `Σ_{i=0}^{layers} d^i`, or `None` past [`MAX_AFFECTED_TERMS`].
fn affected_terms(max_degree: u64, layers: usize) -> Option<u64> {
    let mut total: u64 = 0;
    let mut power: u64 = 1;
    for i in 0..=layers {
        if i > 0 {
            power = power.checked_mul(max_degree)?;
        }
        total = total.checked_add(power)?;
        if total > MAX_AFFECTED_TERMS {
            return None;
        }
    }
    Some(total)
}

impl NoisyMechanism for GnnBasedNoisySgd {
    fn name(&self) -> &str {
        "gnn-noisy-sgd"
    }

    fn noise_scale(&self) -> f64 {
        self.sgd.noise_scale()
    }

    fn set_noise_scale(&mut self, noise_scale: f64) {
        self.sgd.set_noise_scale(clamp_noise_scale(noise_scale));
    }

    fn rdp(&self, orders: &[f64]) -> Vec<f64> {
        let sigma = self.sgd.noise_scale();
        repeated_rdp(orders, self.sgd.total_steps(), |alpha| {
            log_mixture_gaussian_rdp(alpha, sigma, &self.log_weights)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnn_privacy_accounting::{gaussian_rdp, sanitize_orders};
    use proptest::prelude::*;

    #[test]
    fn affected_terms_follow_the_degree_tree() {
        assert_eq!(affected_terms(10, 0), Some(1));
        assert_eq!(affected_terms(10, 1), Some(11));
        assert_eq!(affected_terms(3, 2), Some(13));
        assert_eq!(affected_terms(1_000, 3), None);
    }

    #[test]
    fn validates_degree() {
        assert!(GnnBasedNoisySgd::new(100, 10, 1, 1.0, 0).is_err());
        assert!(GnnBasedNoisySgd::new(100, 10, 1, 1.0, 5).is_ok());
    }

    #[test]
    fn affected_terms_are_capped() {
        assert_eq!(affected_terms(127, 2), Some(16_257));
        assert_eq!(affected_terms(128, 2), None);
        assert!(GnnBasedNoisySgd::new(100, 10, 1, 1.0, 128)
            .and_then(|g| g.with_layers(2))
            .is_err());
    }

    #[test]
    fn full_batch_charges_twice_the_affected_gradients() {
        // q = 1: every one of the K = 1 + 4 affected gradients is in the
        // batch, so one step is a Gaussian with sensitivity 2K.
        let gnn = GnnBasedNoisySgd::new(100, 100, 1, 1.0, 4)
            .expect("gnn")
            .with_noise_scale(3.0);
        assert_eq!(gnn.affected_terms(), 5);
        assert_eq!(gnn.sgd().total_steps(), 1);
        let rdp = gnn.rdp(&[8.0])[0];
        let expected = 8.0 * 10.0 * 10.0 / (2.0 * 9.0);
        assert!((rdp - expected).abs() < 1e-9 * expected, "rdp {rdp}");
        let single_sided = gaussian_rdp(8.0, 3.0 / 5.0);
        assert!((rdp / single_sided - 4.0).abs() < 1e-9);
    }

    #[test]
    fn costs_more_than_plain_sgd() {
        let gnn = GnnBasedNoisySgd::new(1000, 100, 1, 1.0, 5)
            .expect("gnn")
            .with_noise_scale(2.0);
        let plain = gnn.sgd().clone();
        assert!(gnn.epsilon(1e-5) > plain.epsilon(1e-5));
    }

    #[test]
    fn layers_grow_the_cost_and_keep_the_scale() {
        let one = GnnBasedNoisySgd::new(1000, 100, 1, 1.0, 3)
            .expect("gnn")
            .with_noise_scale(4.0);
        let two = one.clone().with_layers(2).expect("layers");
        assert_eq!(two.noise_scale(), 4.0);
        assert_eq!(two.affected_terms(), 13);
        assert!(two.epsilon(1e-5) > one.epsilon(1e-5));
    }

    #[test]
    fn calibrates_to_target() {
        let mut gnn = GnnBasedNoisySgd::new(2000, 200, 5, 1.0, 4).expect("gnn");
        let scale = gnn.calibrate(4.0, 1e-4).expect("calibrate");
        assert!(scale > 0.0);
        assert!(gnn.epsilon(1e-4) <= 4.0);
        let loader = gnn.data_loader(1).expect("loader");
        assert_eq!(loader.dataset_size(), 2000);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 24, .. ProptestConfig::default() })]

        #[test]
        fn rdp_non_decreasing_in_order(
            degree in 1usize..8,
            noise in 1.0f64..20.0,
            orders in proptest::collection::vec(1.01f64..256.0, 1..16),
        ) {
            let gnn = GnnBasedNoisySgd::new(500, 50, 1, 1.0, degree)
                .expect("gnn")
                .with_noise_scale(noise);
            let values = gnn.rdp(&sanitize_orders(&orders));
            for w in values.windows(2) {
                prop_assert!(w[1] >= w[0] || w[0] - w[1] <= 1e-9 * w[0].max(1.0));
            }
        }

        #[test]
        fn epsilon_non_increasing_in_noise(
            degree in 1usize..8,
            lo in 1.0f64..10.0,
            extra in 0.0f64..10.0,
        ) {
            let gnn = GnnBasedNoisySgd::new(500, 50, 2, 1.0, degree).expect("gnn");
            let a = gnn.clone().with_noise_scale(lo);
            let b = gnn.with_noise_scale(lo + extra);
            prop_assert!(b.epsilon(1e-5) <= a.epsilon(1e-5) + 1e-12);
        }
    }
}
