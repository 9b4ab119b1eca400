//! Private multi-hop aggregation (PMA).
//!
//! Each hop sums the normalized features of a node's in-neighbors and
//! perturbs the sum with Gaussian noise. Removing one edge changes one
//! aggregate by at most one unit-norm row, so the per-hop sensitivity is 1 at
//! edge level. At node level it is `sqrt(max_degree)` once in-degrees are
//! bounded by a neighbor sampler.

use rand::Rng;
use tracing::debug;

use gnn_privacy_accounting::{clamp_noise_scale, gaussian_rdp, NoisyMechanism};
use gnn_privacy_core::{add_gaussian_noise, normalize_rows, Graph, Matrix, PrivacyError, Result};

/// Multi-hop Gaussian aggregation perturbation.
#[derive(Clone, Debug, PartialEq)]
pub struct Pma {
    hops: usize,
    noise_scale: f64,
}

impl Pma {
    /// Aggregation over `hops` hops, uncalibrated.
    pub fn new(hops: usize) -> Self {
        Self {
            hops,
            noise_scale: 0.0,
        }
    }

    /// Number of noisy aggregation steps.
    pub fn hops(&self) -> usize {
        self.hops
    }

    /// Compute the normalized, noisy aggregations of `features` over `graph`.
    ///
    /// Returns `hops + 1` matrices: the row-normalized input followed by one
    /// matrix per hop. Noise is drawn once here; callers cache the result for
    /// every training epoch.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        features: &Matrix,
        graph: &Graph,
        sensitivity: f64,
        rng: &mut R,
    ) -> Result<Vec<Matrix>> {
        if features.nrows() != graph.num_nodes() {
            return Err(PrivacyError::config(format!(
                "feature matrix has {} rows but the graph has {} nodes",
                features.nrows(),
                graph.num_nodes()
            )));
        }
        if !sensitivity.is_finite() || sensitivity < 0.0 {
            return Err(PrivacyError::config(format!(
                "aggregation sensitivity must be finite and >= 0, got {sensitivity}"
            )));
        }

        let sigma = self.noise_scale * sensitivity;
        let mut x = features.clone();
        normalize_rows(&mut x);
        let mut outputs = Vec::with_capacity(self.hops + 1);
        outputs.push(x.clone());

        for _ in 0..self.hops {
            x = graph.aggregate(&x)?;
            add_gaussian_noise(&mut x, sigma, rng);
            normalize_rows(&mut x);
            outputs.push(x.clone());
        }

        debug!(hops = self.hops, sigma, nodes = graph.num_nodes(), "aggregated features");
        Ok(outputs)
    }
}

impl NoisyMechanism for Pma {
    fn name(&self) -> &str {
        "pma"
    }

    fn noise_scale(&self) -> f64 {
        self.noise_scale
    }

    fn set_noise_scale(&mut self, noise_scale: f64) {
        self.noise_scale = clamp_noise_scale(noise_scale);
    }

    fn rdp(&self, orders: &[f64]) -> Vec<f64> {
        if self.hops == 0 {
            return vec![0.0; orders.len()];
        }
        orders
            .iter()
            .map(|&alpha| gaussian_rdp(alpha, self.noise_scale) * self.hops as f64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnn_privacy_accounting::{default_orders, sanitize_orders};
    use ndarray::array;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn path_graph() -> Graph {
        Graph::from_undirected(3, [(0, 1), (1, 2)]).expect("graph")
    }

    #[test]
    fn returns_one_matrix_per_hop_plus_input() {
        let features = array![[3.0, 4.0], [1.0, 0.0], [0.0, 2.0]];
        let pma = Pma::new(2).with_noise_scale(1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = pma.apply(&features, &path_graph(), 1.0, &mut rng).expect("apply");
        assert_eq!(out.len(), 3);
        for m in &out {
            assert_eq!(m.dim(), (3, 2));
            for row in m.rows() {
                let norm = row.dot(&row).sqrt();
                assert!((norm - 1.0).abs() < 1e-9 || norm == 0.0);
            }
        }
        assert!((out[0][[0, 0]] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn zero_noise_is_plain_normalized_aggregation() {
        let features = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0]];
        let pma = Pma::new(1);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = pma.apply(&features, &path_graph(), 1.0, &mut rng).expect("apply");
        // node 1 receives rows 0 and 2
        assert_eq!(out[1].row(1).to_vec(), vec![1.0, 0.0]);
        assert_eq!(out[1].row(0).to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn rejects_mismatched_features() {
        let features = array![[1.0, 0.0]];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(Pma::new(1).apply(&features, &path_graph(), 1.0, &mut rng).is_err());
    }

    #[test]
    fn zero_hops_costs_nothing() {
        let mut pma = Pma::new(0);
        assert!(pma.rdp(&default_orders()).iter().all(|&v| v == 0.0));
        assert_eq!(pma.calibrate(1.0, 1e-5).expect("calibrate"), 0.0);
    }

    #[test]
    fn curve_is_hops_times_gaussian() {
        let pma = Pma::new(3).with_noise_scale(2.0);
        assert_eq!(pma.rdp(&[4.0]), vec![3.0 * 4.0 / 8.0]);
    }

    proptest! {
        #[test]
        fn epsilon_non_increasing_in_noise(hops in 1usize..6, lo in 0.05f64..5.0, extra in 0.0f64..5.0) {
            let a = Pma::new(hops).with_noise_scale(lo);
            let b = Pma::new(hops).with_noise_scale(lo + extra);
            prop_assert!(b.epsilon(1e-5) <= a.epsilon(1e-5));
        }

        #[test]
        fn rdp_non_decreasing_in_order(
            hops in 0usize..6,
            noise in 0.05f64..20.0,
            orders in proptest::collection::vec(1.01f64..2048.0, 1..16),
        ) {
            let values = Pma::new(hops).with_noise_scale(noise).rdp(&sanitize_orders(&orders));
            for w in values.windows(2) {
                prop_assert!(w[0] <= w[1]);
            }
        }
    }
}
