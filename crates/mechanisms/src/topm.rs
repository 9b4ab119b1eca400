//! Edge-level graph perturbation by noisy top-M selection.
//!
//! The filter releases a synthetic undirected graph. Two Gaussian releases
//! with sensitivity 1 under adding or removing one edge drive it: a noisy
//! edge count `M̃`, and a noisy score `1[edge] + N(0, σ²)` for every node
//! pair. Pairs scoring above the threshold at which `M̃` pairs are expected
//! to pass are kept. Non-edge scores are never drawn one by one: the number
//! passing is Binomial, and that many non-edges are placed uniformly.

use std::collections::{BTreeSet, HashSet};

use rand::seq::index;
use rand::Rng;
use rand_distr::{Binomial, Distribution, Normal};
use statrs::distribution::{ContinuousCDF, Normal as Gaussian};
use tracing::debug;

use gnn_privacy_accounting::{clamp_noise_scale, gaussian_rdp, NoisyMechanism};
use gnn_privacy_core::{gaussian_sample, Edge, Graph, PrivacyError, Result};

/// Bisection steps used to place the score threshold.
const THRESHOLD_ITERATIONS: usize = 200;

/// Noisy top-M edge filter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopMFilter {
    noise_scale: f64,
}

impl TopMFilter {
    /// Create an uncalibrated filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Release a perturbed copy of `graph`'s undirected simple view.
    ///
    /// Every pair `u < v` is treated alike: whether a pair can be selected
    /// does not depend on whether it is an edge. With a zero noise scale the
    /// undirected edge set is returned unchanged.
    pub fn apply<R: Rng + ?Sized>(&self, graph: &Graph, rng: &mut R) -> Result<Graph> {
        let n = graph.num_nodes();
        let existing = graph.undirected_edges();
        let m = existing.len();
        let sigma = self.noise_scale;

        if sigma == 0.0 {
            return Graph::from_undirected(n, existing);
        }

        let total_pairs = n.saturating_mul(n.saturating_sub(1)) / 2;
        let non_edges = total_pairs.saturating_sub(m);
        let noisy_count = (m as f64 + gaussian_sample(sigma, rng)).clamp(0.0, total_pairs as f64);
        let threshold = score_threshold(noisy_count, total_pairs as f64, sigma)?;

        let noise = Normal::new(0.0, sigma)
            .map_err(|e| PrivacyError::config(format!("invalid score noise: {e}")))?;
        let mut selected: Vec<Edge> = existing
            .iter()
            .copied()
            .filter(|_| 1.0 + noise.sample(rng) > threshold)
            .collect();
        let kept_true = selected.len();

        let pass_rate = standard_normal()?.sf(threshold / sigma);
        let passing = Binomial::new(non_edges as u64, pass_rate)
            .map_err(|e| PrivacyError::config(format!("invalid non-edge draw: {e}")))?
            .sample(rng);
        let passing = usize::try_from(passing).unwrap_or(non_edges).min(non_edges);
        selected.extend(sample_non_edges(n, &existing, passing, rng));
        selected.sort_unstable();

        debug!(
            nodes = n,
            edges_before = m,
            noisy_count,
            threshold,
            edges_after = selected.len(),
            kept_true,
            "perturbed graph structure"
        );

        Graph::from_undirected(n, selected)
    }
}

fn standard_normal() -> Result<Gaussian> {
    Gaussian::new(0.0, 1.0)
        .map_err(|e| PrivacyError::config(format!("invalid standard normal: {e}")))
}

/// Expected number of pairs scoring above `threshold` when `edges` of the
/// `total_pairs` pairs are edges.
fn expected_passing(
    threshold: f64,
    edges: f64,
    total_pairs: f64,
    sigma: f64,
    std: &Gaussian,
) -> f64 {
    edges * std.sf((threshold - 1.0) / sigma) + (total_pairs - edges) * std.sf(threshold / sigma)
}

/// Threshold at which `target` pairs pass in expectation, taking `target`
/// itself as the edge count. Depends only on released quantities.
fn score_threshold(target: f64, total_pairs: f64, sigma: f64) -> Result<f64> {
    if target <= 0.0 {
        return Ok(f64::INFINITY);
    }
    if target >= total_pairs {
        return Ok(f64::NEG_INFINITY);
    }
    let std = standard_normal()?;
    let passing = |t: f64| expected_passing(t, target, total_pairs, sigma, &std);

    let mut width = 1.0 + sigma;
    let mut lo = 0.5 - width;
    let mut hi = 0.5 + width;
    for _ in 0..THRESHOLD_ITERATIONS {
        if passing(lo) >= target && passing(hi) <= target {
            break;
        }
        width *= 2.0;
        lo = 0.5 - width;
        hi = 0.5 + width;
    }
    for _ in 0..THRESHOLD_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if passing(mid) > target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(hi)
}

/// Uniform sample of up to `want` node pairs `u < v` absent from `existing`.
fn sample_non_edges<R: Rng + ?Sized>(
    n: usize,
    existing: &BTreeSet<Edge>,
    want: usize,
    rng: &mut R,
) -> Vec<Edge> {
    let total_pairs = n.saturating_mul(n.saturating_sub(1)) / 2;
    let available = total_pairs.saturating_sub(existing.len());
    let want = want.min(available);
    if want == 0 {
        return Vec::new();
    }

    if available <= 2 * want {
        // Dense: enumerate the complement and sample from it.
        let pool: Vec<Edge> = (0..n)
            .flat_map(|u| (u + 1..n).map(move |v| (u, v)))
            .filter(|e| !existing.contains(e))
            .collect();
        return index::sample(rng, pool.len(), want)
            .into_iter()
            .map(|i| pool[i])
            .collect();
    }

    let mut seen = HashSet::with_capacity(want);
    let mut out = Vec::with_capacity(want);
    while out.len() < want {
        let u = rng.gen_range(0..n);
        let v = rng.gen_range(0..n);
        if u == v {
            continue;
        }
        let pair = (u.min(v), u.max(v));
        if !existing.contains(&pair) && seen.insert(pair) {
            out.push(pair);
        }
    }
    out
}

impl NoisyMechanism for TopMFilter {
    fn name(&self) -> &str {
        "topm-filter"
    }

    fn noise_scale(&self) -> f64 {
        self.noise_scale
    }

    fn set_noise_scale(&mut self, noise_scale: f64) {
        self.noise_scale = clamp_noise_scale(noise_scale);
    }

    fn rdp(&self, orders: &[f64]) -> Vec<f64> {
        orders
            .iter()
            .map(|&alpha| 2.0 * gaussian_rdp(alpha, self.noise_scale))
            .collect()
    }
}
